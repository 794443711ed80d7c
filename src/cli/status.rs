use super::config::{parse_duration, ShredConfig};
use super::setup::{config_error, open_ledger};
use blockshred::error::ShredError;
use blockshred::ledger::{
    query_activity, read_activity_log, unix_now, ActivityQuery, ActivityRecord,
    BlockReplicaEntry, NodeIdentity, ShredState,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Options for `blockshred status`.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub node: Option<String>,
    pub state: Option<ShredState>,
    pub orphaned: Option<String>,
    pub history: bool,
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
struct StatusReport {
    /// node -> state -> count
    counts: BTreeMap<String, BTreeMap<ShredState, usize>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entries: Vec<BlockReplicaEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    orphaned: Vec<BlockReplicaEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    history: Vec<ActivityRecord>,
}

fn count_by_node(entries: &[BlockReplicaEntry]) -> BTreeMap<String, BTreeMap<ShredState, usize>> {
    let mut counts: BTreeMap<String, BTreeMap<ShredState, usize>> = BTreeMap::new();
    for entry in entries {
        *counts
            .entry(entry.node_identity.to_string())
            .or_default()
            .entry(entry.state)
            .or_default() += 1;
    }
    counts
}

/// Show shred progress across the cluster
///
/// Prints per-node counts for every state. Optionally lists entries in one
/// state, entries stuck in a non-terminal state (`--orphaned`), and recent
/// activity (`--history`).
pub async fn execute(
    config: &ShredConfig,
    options: StatusOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let node = options
        .node
        .as_deref()
        .map(NodeIdentity::new)
        .transpose()?;
    let orphan_age = options
        .orphaned
        .as_deref()
        .map(|v| parse_duration("--orphaned", v))
        .transpose()
        .map_err(config_error)?;

    let ledger = open_ledger(config).await?;
    let result = async {
        let all: Vec<BlockReplicaEntry> = match &node {
            Some(n) => ledger
                .list_node(n)
                .await?
                .into_iter()
                .map(|v| v.value)
                .collect(),
            None => ledger.list_all().await?,
        };
        let orphaned: Vec<BlockReplicaEntry> = match orphan_age {
            Some(age) => ledger
                .list_orphaned(age, unix_now())
                .await?
                .into_iter()
                .filter(|e| node.as_ref().map_or(true, |n| &e.node_identity == n))
                .collect(),
            None => Vec::new(),
        };
        Ok::<_, blockshred::ledger::LedgerError>((all, orphaned))
    }
    .await;
    ledger.close().await.map_err(ShredError::from)?;
    let (all, orphaned) = result.map_err(ShredError::from)?;

    let mut report = StatusReport {
        counts: count_by_node(&all),
        orphaned,
        ..Default::default()
    };
    if let Some(state) = options.state {
        report.entries = all.into_iter().filter(|e| e.state == state).collect();
    }
    if options.history {
        let records = read_activity_log(&config.activity_path()).await?;
        let query = ActivityQuery {
            node: options.node.clone(),
            to_state: options.state,
            ..Default::default()
        };
        report.history = query_activity(&records, &query);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &options);
    }
    Ok(())
}

fn print_report(report: &StatusReport, options: &StatusOptions) {
    println!("📊 blockshred Status");
    println!();

    if report.counts.is_empty() {
        println!("  No ledger entries");
    }
    for (node, counts) in &report.counts {
        println!("  {}", node);
        for state in ShredState::ALL {
            if let Some(count) = counts.get(&state) {
                let marker = match state {
                    ShredState::Shredded => "✅",
                    ShredState::Failed => "❌",
                    ShredState::Abandoned => "🛑",
                    _ => "⏳",
                };
                println!("    {} {:<14} {}", marker, state.as_str(), count);
            }
        }
    }

    if let Some(state) = options.state {
        println!();
        println!("Entries in {}:", state);
        for entry in &report.entries {
            print_entry(entry);
        }
    }

    if options.orphaned.is_some() {
        println!();
        if report.orphaned.is_empty() {
            println!("✅ No orphaned entries");
        } else {
            println!("⚠️  Orphaned entries: {}", report.orphaned.len());
            for entry in &report.orphaned {
                print_entry(entry);
            }
        }
    }

    if options.history {
        println!();
        println!("Recent activity:");
        for record in &report.history {
            let from = record.from.map_or("-", |s| s.as_str());
            print!(
                "  {} {} {} -> {} ({})",
                record.timestamp, record.entry_id, from, record.to, record.actor
            );
            match &record.error {
                Some(error) => println!(": {}", error),
                None => println!(),
            }
        }
    }
}

fn print_entry(entry: &BlockReplicaEntry) {
    print!(
        "  {} {} [{}] attempts={}",
        entry.id(),
        entry.file_path,
        entry.state,
        entry.attempt_count
    );
    match &entry.last_error {
        Some(error) => println!(" {}: {}", error.class, error.message),
        None => println!(),
    }
}
