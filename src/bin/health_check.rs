use clap::Parser;
use dotenvy::dotenv;
use marker_gateway::probe::{
    DEFAULT_HOST, DEFAULT_MAX_ATTEMPTS, DEFAULT_PORT, HealthProbe, ProbeOptions, UnhealthyPolicy,
};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wait until the Marker API reports healthy", long_about = None)]
struct Args {
    /// Base URL of the service, without port
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of attempts
    #[arg(short, long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    timeout: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5)]
    request_timeout: u64,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 1)]
    retry_delay: u64,

    /// Stop at the first non-success status instead of retrying
    #[arg(long)]
    fail_fast_unhealthy: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "health_check=info,marker_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = ProbeOptions {
        request_timeout: Duration::from_secs(args.request_timeout),
        max_attempts: args.timeout,
        retry_delay: Duration::from_secs(args.retry_delay),
        unhealthy_policy: if args.fail_fast_unhealthy {
            UnhealthyPolicy::FailFast
        } else {
            UnhealthyPolicy::Retry
        },
    };

    let probe = HealthProbe::new(&args.host, args.port, options)?;

    info!("🩺 Checking {} ...", probe.url());
    let report = probe.run().await;

    if report.healthy {
        info!("✅ Service healthy after {} attempt(s)", report.attempts);
        return Ok(());
    }

    error!("❌ Service not healthy after {} attempt(s)", report.attempts);
    std::process::exit(1);
}
