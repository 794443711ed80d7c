use super::config::{default_config_path, default_ledger_path, ShredConfig};
use std::path::PathBuf;

/// Write a commented default configuration file
pub fn execute(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = output.unwrap_or_else(default_config_path);
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    ShredConfig::create_default(&path, &default_ledger_path())?;
    println!("📝 Created {}", path.display());
    println!("   Add a [[nodes]] entry per storage node before running `delete`.");
    Ok(())
}
