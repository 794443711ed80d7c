//! Operator actions on `FAILED` entries.

use super::config::ShredConfig;
use super::setup::open_ledger;
use blockshred::error::ShredError;
use blockshred::ledger::{BlockId, BlockReplicaEntry, EntryId, NodeIdentity};

/// Accepts `blk_<id>` or a bare numeric id.
pub fn parse_entry_id(node: &str, block: &str) -> Result<EntryId, ShredError> {
    let node = NodeIdentity::new(node).map_err(|e| ShredError::Configuration(e.to_string()))?;
    let block = match block.parse::<i64>() {
        Ok(n) => BlockId::new(n),
        Err(_) => block
            .parse::<BlockId>()
            .map_err(|e| ShredError::Configuration(e.to_string()))?,
    };
    Ok(EntryId::new(node, block))
}

/// Re-arm a failed entry for another round of attempts
pub async fn rearm(
    config: &ShredConfig,
    node: &str,
    block: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = parse_entry_id(node, block)?;
    let ledger = open_ledger(config).await?;
    let result = ledger.rearm(&id).await;
    ledger.close().await.map_err(ShredError::from)?;
    let entry = result.map_err(ShredError::from)?;

    println!("🔁 Re-armed {}", id);
    print_summary(&entry);
    Ok(())
}

/// Give up on a failed entry
pub async fn abandon(
    config: &ShredConfig,
    node: &str,
    block: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = parse_entry_id(node, block)?;
    let ledger = open_ledger(config).await?;
    let result = ledger.abandon(&id).await;
    ledger.close().await.map_err(ShredError::from)?;
    let entry = result.map_err(ShredError::from)?;

    println!("🛑 Abandoned {}", id);
    println!("  ⚠️  The replica at {} may still hold recoverable data", entry.local_path.display());
    print_summary(&entry);
    Ok(())
}

fn print_summary(entry: &BlockReplicaEntry) {
    println!("  File: {}", entry.file_path);
    println!("  State: {}", entry.state);
    println!("  Attempts: {} (re-armed {} times)", entry.attempt_count, entry.rearm_count);
}
