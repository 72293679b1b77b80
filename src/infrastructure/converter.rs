use crate::config::GatewayConfig;
use crate::services::converter::DocumentConverter;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Upper bound on the startup engine check
pub const WARM_UP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the configured converter. The engine check runs in the background
/// and never delays the listener.
pub async fn setup_converter(config: &GatewayConfig) -> Arc<dyn DocumentConverter> {
    let converter: Arc<dyn DocumentConverter> = crate::services::converter::create_converter(
        &config.converter_type,
        &config.marker_command,
        &config.torch_device,
    )
    .into();

    if config.converter_type.eq_ignore_ascii_case("disabled")
        || config.converter_type.eq_ignore_ascii_case("none")
    {
        tracing::warn!("⚠️  Document conversion is disabled; /convert will answer 500");
    } else {
        tokio::spawn(warm_up(
            converter.clone(),
            config.marker_command.clone(),
            WARM_UP_TIMEOUT,
        ));
    }

    converter
}

/// Check the engine once and log the result. `None` means it did not answer in time.
pub async fn warm_up(
    converter: Arc<dyn DocumentConverter>,
    command: String,
    limit: Duration,
) -> Option<bool> {
    match tokio::time::timeout(limit, converter.health_check()).await {
        Ok(true) => {
            info!("📄 Conversion engine '{}' is available", command);
            Some(true)
        }
        Ok(false) => {
            tracing::warn!(
                "⚠️  Conversion engine '{}' did not respond! Conversions will fail until it is installed.",
                command
            );
            Some(false)
        }
        Err(_) => {
            tracing::warn!(
                "⚠️  Conversion engine '{}' did not answer within {:?}; continuing without the check",
                command,
                limit
            );
            None
        }
    }
}
