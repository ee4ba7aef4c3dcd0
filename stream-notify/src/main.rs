use anyhow::Context;
use tracing::info;

use stream_notify::config::AppConfig;
use stream_notify::logging::{self, panic_hook};
use stream_notify::services::ServiceContainer;
use stream_notify::utils::http_client::install_rustls_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let (logging_config, _log_guard) = logging::init_logging(config.log_dir.as_deref())?;
    panic_hook::install(&logging_config);
    install_rustls_provider();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting stream-notify");

    let container = ServiceContainer::new(config)
        .await
        .context("failed to initialize services")?;
    let cancel = container.cancellation_token();
    logging_config.start_retention_cleanup(cancel.clone());

    let handles = container.start(Some(logging_config));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C");
        }
        _ = cancel.cancelled() => {
            info!("A core service stopped");
        }
    }

    container.shutdown(handles).await;
    info!("stream-notify stopped");
    Ok(())
}
