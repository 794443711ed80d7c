use super::config::ShredConfig;
use super::setup::{build_hdfs, open_ledger};
use blockshred::agents::Initiator;
use blockshred::error::ShredError;

/// Securely delete one file
///
/// Registers a ledger entry for every replica of every block, deletes the
/// file (bypassing trash), then hands the entries to the storage node
/// workers. Safe to re-run after an interruption.
pub async fn execute(config: &ShredConfig, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = open_ledger(config).await?;
    let hdfs = build_hdfs(config)?;
    let initiator = Initiator::new(ledger.clone(), hdfs.clone(), hdfs);

    let result = initiator.delete(path).await;
    ledger.close().await.map_err(ShredError::from)?;
    let request = result?;

    println!("🗑️  {}", request.file_path);
    if request.file_was_present {
        println!("  ✅ Deleted from HDFS");
    } else if request.entries.is_empty() {
        println!("  ⚠️  Not found and nothing tracked for it");
    } else {
        println!("  ✅ Already deleted (resumed)");
    }
    println!("  Replicas tracked: {}", request.entries.len());
    println!("  Newly registered: {}", request.registered);
    println!("  Queued for shredding: {}", request.marked_pending);
    Ok(())
}
