//! Readiness polling client for the gateway's `/health` endpoint.
//!
//! Used out of process by orchestrators and CI scripts to wait until the
//! server is accepting traffic. Every failure is retried until the attempt
//! budget runs out; only then does the probe report `false`.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "http://localhost";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What to do when the service answers with a non-success status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhealthyPolicy {
    /// Treat it like "not started yet" and keep polling
    #[default]
    Retry,
    /// The service is up but reports a problem; stop immediately
    FailFast,
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Timeout applied to each individual request
    pub request_timeout: Duration,
    pub max_attempts: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
    pub unhealthy_policy: UnhealthyPolicy,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            unhealthy_policy: UnhealthyPolicy::Retry,
        }
    }
}

/// Outcome of a single health request
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Success status with a JSON body
    Healthy(Value),
    /// Nothing is listening yet
    Refused(String),
    /// The service answered with this non-success status
    Unhealthy(u16),
    /// Timeout, malformed body or any other transport error
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub healthy: bool,
    pub attempts: u32,
    pub last_outcome: Option<ProbeOutcome>,
}

pub struct HealthProbe {
    client: Client,
    url: String,
    options: ProbeOptions,
}

impl HealthProbe {
    pub fn new(host: &str, port: u16, options: ProbeOptions) -> Result<Self, ProbeError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: format!("{}:{}/health", host.trim_end_matches('/'), port),
            options,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one health request
    pub async fn attempt(&self) -> ProbeOutcome {
        let timeout = self.options.request_timeout;
        let response = match self.client.get(&self.url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() => return ProbeOutcome::Refused(e.to_string()),
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::Error(format!("request timed out after {:?}", timeout));
            }
            Err(e) => return ProbeOutcome::Error(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::Unhealthy(status.as_u16());
        }

        match response.json::<Value>().await {
            Ok(body) => ProbeOutcome::Healthy(body),
            Err(e) => ProbeOutcome::Error(format!("invalid health response: {}", e)),
        }
    }

    /// Poll until healthy or the attempt budget is spent
    pub async fn run(&self) -> ProbeReport {
        let max_attempts = self.options.max_attempts;
        let mut report = ProbeReport {
            healthy: false,
            attempts: 0,
            last_outcome: None,
        };

        for attempt in 1..=max_attempts {
            report.attempts = attempt;
            let outcome = self.attempt().await;

            match &outcome {
                ProbeOutcome::Healthy(body) => {
                    info!("Marker service is healthy: {}", body);
                    report.healthy = true;
                    report.last_outcome = Some(outcome);
                    return report;
                }
                ProbeOutcome::Refused(_) => {
                    info!("Attempt {}/{}: Waiting for service to start...", attempt, max_attempts);
                }
                ProbeOutcome::Unhealthy(status) => {
                    warn!(
                        "Attempt {}/{}: service answered with status {}",
                        attempt, max_attempts, status
                    );
                    if self.options.unhealthy_policy == UnhealthyPolicy::FailFast {
                        report.last_outcome = Some(outcome);
                        return report;
                    }
                }
                ProbeOutcome::Error(e) => {
                    warn!("Attempt {}/{}: Error checking health: {}", attempt, max_attempts, e);
                }
            }
            report.last_outcome = Some(outcome);

            if attempt < max_attempts {
                sleep(self.options.retry_delay).await;
            }
        }

        warn!("Marker service is not healthy after {} attempts", max_attempts);
        report
    }
}

/// Poll `{host}:{port}/health` up to `max_attempts` times.
///
/// Returns `true` as soon as one attempt gets a success response.
pub async fn probe(host: &str, port: u16, per_attempt_timeout: Duration, max_attempts: u32) -> bool {
    let options = ProbeOptions {
        request_timeout: per_attempt_timeout,
        max_attempts,
        ..ProbeOptions::default()
    };

    match HealthProbe::new(host, port, options) {
        Ok(probe) => probe.run().await.healthy,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let probe = HealthProbe::new("http://localhost/", 8001, ProbeOptions::default()).unwrap();
        assert_eq!(probe.url(), "http://localhost:8001/health");
    }

    #[test]
    fn test_default_options() {
        let options = ProbeOptions::default();
        assert_eq!(options.max_attempts, 30);
        assert_eq!(options.request_timeout, Duration::from_secs(5));
        assert_eq!(options.retry_delay, Duration::from_secs(1));
        assert_eq!(options.unhealthy_policy, UnhealthyPolicy::Retry);
    }

    #[tokio::test]
    async fn test_zero_budget_never_contacts_service() {
        let options = ProbeOptions {
            max_attempts: 0,
            ..ProbeOptions::default()
        };
        let report = HealthProbe::new("http://127.0.0.1", 9, options).unwrap().run().await;
        assert!(!report.healthy);
        assert_eq!(report.attempts, 0);
        assert_eq!(report.last_outcome, None);
    }
}
