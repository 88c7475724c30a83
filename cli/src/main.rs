use std::process::ExitCode;

use clap::Parser;
use songuse_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    songuse_cli::init_logging(cli.verbose);

    match songuse_cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("command failed: {err:?}");
            eprintln!("songuse: {}", songuse_cli::error_message(&err));
            ExitCode::FAILURE
        }
    }
}
