use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod config;
pub mod delete;
pub mod gc;
pub mod init_config;
pub mod logging;
pub mod rearm;
pub mod setup;
pub mod status;
pub mod verify;
pub mod version;
pub mod worker;

use blockshred::ledger::ShredState;
use config::ShredConfig;

#[derive(Parser)]
#[command(name = "blockshred")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Secure physical shredding of deleted HDFS blocks", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/blockshred/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Securely delete a file: register its replicas, delete it, queue the shred
    Delete {
        /// HDFS path of the file
        path: String,
    },

    /// Run one bounded shred batch for this storage node
    Worker {
        /// Node identity (overrides [worker] node_identity)
        #[arg(long)]
        node: Option<String>,
    },

    /// Show shred progress
    Status {
        /// Only this node
        #[arg(long)]
        node: Option<String>,

        /// List entries in this state (e.g. failed, pending_shred)
        #[arg(long)]
        state: Option<ShredState>,

        /// List non-terminal entries older than this (e.g. 2h)
        #[arg(long)]
        orphaned: Option<String>,

        /// Show recent activity
        #[arg(long)]
        history: bool,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Give a FAILED entry another round of attempts
    Rearm {
        #[arg(long)]
        node: String,

        /// Block id (blk_<id> or <id>)
        #[arg(long)]
        block: String,
    },

    /// Stop tracking a FAILED entry
    Abandon {
        #[arg(long)]
        node: String,

        /// Block id (blk_<id> or <id>)
        #[arg(long)]
        block: String,
    },

    /// Remove terminal entries older than the retention window
    Gc {
        /// Overrides [shred] retention (e.g. 7d)
        #[arg(long)]
        retention: Option<String>,
    },

    /// Verify installation integrity
    Verify,

    /// Write a default configuration file
    InitConfig {
        /// Output path (default: the --config path or its default)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Load the config and start logging. Every command that touches the ledger
/// goes through here.
fn prepare(path: Option<&Path>) -> Result<ShredConfig, Box<dyn std::error::Error>> {
    let config = setup::load_config(path)?;
    logging::init(&config.logging)?;
    Ok(config)
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let path = cli.config.as_deref();
    match cli.command {
        Commands::Delete { path: file } => delete::execute(&prepare(path)?, &file).await,
        Commands::Worker { node } => worker::execute(&prepare(path)?, node).await,
        Commands::Status {
            node,
            state,
            orphaned,
            history,
            json,
        } => {
            let options = status::StatusOptions {
                node,
                state,
                orphaned,
                history,
                json,
            };
            status::execute(&prepare(path)?, options).await
        }
        Commands::Rearm { node, block } => rearm::rearm(&prepare(path)?, &node, &block).await,
        Commands::Abandon { node, block } => rearm::abandon(&prepare(path)?, &node, &block).await,
        Commands::Gc { retention } => gc::execute(&prepare(path)?, retention).await,
        Commands::Verify => verify::execute(path).await,
        Commands::InitConfig { output } => {
            init_config::execute(output.or_else(|| cli.config.clone()))
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
