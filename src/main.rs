//! Reference binary: wires configuration, the source driver, and a
//! minimal poll/commit loop that stands in for "the external driver
//! framework" (§6) so this crate is runnable end to end. The framework
//! itself — scheduling, downstream delivery, retry policy — is out of
//! scope; this loop only proves the core's contract holds.

mod init;

use anyhow::{Context, Result};
use otlp_ingress_config::RuntimeConfig;
use otlp_ingress_driver::{FileOffsetStore, OffsetWriter, SourceDriver};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load().context("failed to load configuration")?;
    init::init_tracing(&config);

    info!(connector_name = %config.connector_name, "otlp-ingress starting");

    let offset_store = FileOffsetStore::open(&config.server.offset_store_path)
        .context("failed to open offset store")?;

    let driver = SourceDriver::start(config, &offset_store)
        .await
        .context("failed to start source driver")?;

    run_until_shutdown(&driver, &offset_store).await;

    driver.stop().await;
    info!("otlp-ingress stopped");
    Ok(())
}

/// The demo poll/commit loop: every record `poll` returns is immediately
/// "dispatched" (logged) and committed, with the committed offset
/// persisted back to the same file store `start` resumed from. A real
/// driver framework would dispatch to its own sink and control the
/// commit timing; this loop exists only to exercise the full contract.
async fn run_until_shutdown(driver: &SourceDriver, offset_store: &FileOffsetStore) {
    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutdown requested");
                break;
            }
            records = driver.poll() => {
                let Some(records) = records else { continue };
                for record in &records {
                    info!(
                        topic = %record.topic,
                        sequence = record.offset_key.sequence,
                        "dispatching record"
                    );
                    driver.commit(record);
                    offset_store.write(&record.partition_key, &record.offset_key);
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => warn!("received SIGTERM"),
    }
}
