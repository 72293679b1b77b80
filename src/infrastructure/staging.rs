use crate::config::GatewayConfig;
use crate::services::temp_store::{StagingError, TempFileStore};
use std::sync::Arc;
use tracing::info;

pub async fn setup_staging(config: &GatewayConfig) -> Result<Arc<TempFileStore>, StagingError> {
    let store = TempFileStore::new(&config.temp_dir);
    store.ensure_dir().await?;
    info!("📂 Staging directory: {}", store.root().display());
    Ok(Arc::new(store))
}
