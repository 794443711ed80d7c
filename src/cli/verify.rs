use super::config::{EraserKind, ShredConfig};
use super::setup::{build_hdfs, config_path, open_ledger};
use blockshred::eraser::ShredCommand;
use blockshred::error::ShredError;
use blockshred::hdfs::is_compatible;
use std::path::Path;

/// Verify installation integrity
///
/// Checks, in order:
/// - Configuration file parses and validates
/// - The ledger store is reachable
/// - `hdfs version` reports a compatible release
/// - The configured eraser is usable
pub async fn execute(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Verifying blockshred installation...");
    println!();

    let mut all_ok = true;

    print!("  Version: ");
    println!("✅ {}", env!("CARGO_PKG_VERSION"));

    let path = config_path(config);
    print!("  Config: ");
    let config = match ShredConfig::load(&path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => {
            println!("✅ {}", path.display());
            config
        }
        Err(e) => {
            println!("❌ {}", e);
            return Err("Verification failed".into());
        }
    };

    print!("  Ledger: ");
    match open_ledger(&config).await {
        Ok(ledger) => match ledger.nodes().await {
            Ok(nodes) => {
                println!("✅ {} ({} nodes with entries)", config.ledger.endpoint, nodes.len());
                ledger.close().await.map_err(ShredError::from)?;
            }
            Err(e) => {
                println!("❌ {}", e);
                all_ok = false;
            }
        },
        Err(e) => {
            println!("❌ {}", e);
            all_ok = false;
        }
    }

    print!("  HDFS: ");
    let hdfs = build_hdfs(&config)?;
    match hdfs.version().await {
        Ok(version) if is_compatible(&version, &config.hdfs.compatible_versions) => {
            println!("✅ {}", version);
        }
        Ok(version) => {
            println!("❌ {} is not a known compatible release", version);
            all_ok = false;
        }
        Err(e) => {
            println!("❌ {}", e);
            all_ok = false;
        }
    }

    print!("  Node directory: ");
    if config.nodes.is_empty() {
        println!("⚠️  empty (delete cannot map replicas to nodes)");
    } else {
        println!("✅ {} nodes", config.nodes.len());
    }

    print!("  Eraser: ");
    match config.shred.eraser {
        EraserKind::Overwrite => println!("✅ in-process overwrite"),
        EraserKind::Shred => {
            let shred = ShredCommand::new(config.shred.shred_binary.clone());
            if shred.available().await {
                println!("✅ {}", config.shred.shred_binary.display());
            } else {
                println!("❌ {} not runnable", config.shred.shred_binary.display());
                all_ok = false;
            }
        }
    }

    println!();
    if all_ok {
        println!("✅ All checks passed");
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_verify_missing_config_fails() {
        let dir = TempDir::new().unwrap();
        let result = execute(Some(&dir.path().join("none.toml"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_verify_reports_missing_hdfs() {
        let dir = TempDir::new().unwrap();
        let mut config =
            ShredConfig::new(format!("sqlite://{}", dir.path().join("l.db").display()));
        config.hdfs.binary = dir.path().join("no-such-hdfs");
        config.shred.eraser = EraserKind::Overwrite;
        let path = dir.path().join("config.toml");
        config.save(&path).unwrap();

        // Ledger and eraser pass, HDFS does not
        assert!(execute(Some(&path)).await.is_err());
    }
}
