use super::config::{parse_duration, ShredConfig};
use super::setup::{config_error, open_ledger};
use blockshred::error::ShredError;
use blockshred::ledger::unix_now;

/// Remove terminal entries older than the retention window
pub async fn execute(
    config: &ShredConfig,
    retention: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let retention = match retention {
        Some(value) => parse_duration("--retention", &value),
        None => config.retention(),
    }
    .map_err(config_error)?;

    let ledger = open_ledger(config).await?;
    let result = ledger.collect_garbage(retention, unix_now()).await;
    ledger.close().await.map_err(ShredError::from)?;
    let report = result.map_err(ShredError::from)?;

    println!("🧹 Garbage collection complete");
    println!("  Retention: {}", humantime::format_duration(retention));
    println!("  Removed: {}", report.removed);
    if report.skipped > 0 {
        println!("  Skipped (changed concurrently): {}", report.skipped);
    }
    Ok(())
}
