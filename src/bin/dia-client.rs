//! Drives a scenario as the initiating peer, connecting out to a target
//! (spec.md §5 "CLI"; `original_source/fuzz.py`'s `mode == 'client'` branch).

use clap::Parser;
use diafuzzer::cli;
use diafuzzer::config::Cli;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli_args = Cli::parse();
    if let Err(e) = cli::run_as_client(&cli_args).await {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}
