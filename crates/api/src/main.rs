use std::sync::Arc;

use anyhow::Context;

use stockflow_api::config::{self, ApiConfig};
use stockflow_reference::InMemoryReferenceData;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockflow_observability::init(config::log_format_from_env());

    let config = ApiConfig::from_env();

    let reference = match &config.reference_data {
        Some(path) => InMemoryReferenceData::from_path(path)
            .with_context(|| format!("failed to load reference data from {}", path.display()))?,
        None => {
            tracing::warn!("STOCKFLOW_REFERENCE_DATA not set; starting with empty reference data");
            InMemoryReferenceData::new()
        }
    };

    let services = stockflow_api::app::services::build_services(&config, Arc::new(reference));
    let app = stockflow_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
