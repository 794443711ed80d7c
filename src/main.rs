mod cli;

use blockshred::error::ShredError;
use clap::Parser;
use cli::Cli;

/// Exit code for failures a later run may clear (EX_TEMPFAIL).
const EXIT_TEMPFAIL: i32 = 75;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        eprintln!("Error: {}", e);
        let transient = e
            .downcast_ref::<ShredError>()
            .is_some_and(ShredError::is_transient);
        std::process::exit(if transient { EXIT_TEMPFAIL } else { 1 });
    }
}
