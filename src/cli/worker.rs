use super::config::ShredConfig;
use super::setup::{build_eraser, config_error, open_ledger};
use blockshred::agents::Worker;
use blockshred::error::ShredError;
use tracing::info;

/// Run one bounded worker batch for this storage node
///
/// Intended to be started by an external scheduler during low-traffic
/// windows. Entries still in backoff are left for a later invocation.
pub async fn execute(
    config: &ShredConfig,
    node: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = config
        .worker_settings(node.as_deref())
        .map_err(config_error)?;
    let ledger = open_ledger(config).await?;
    let worker = Worker::new(ledger.clone(), build_eraser(config), settings);
    info!(run = %worker.run_id(), "worker starting");

    let result = worker.run_batch().await;
    ledger.close().await.map_err(ShredError::from)?;
    let report = result?;

    println!("🔥 Worker batch complete");
    println!("  Shredded: {}", report.shredded);
    println!("  Retrying: {}", report.retrying);
    println!("  Failed: {}", report.failed);
    println!("  Skipped (owned elsewhere): {}", report.skipped);
    println!("  Deferred (backoff): {}", report.deferred);
    if report.unrecorded > 0 {
        println!("  ⚠️  Failures not recorded: {}", report.unrecorded);
    }
    Ok(())
}
