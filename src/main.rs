//! ZenEdit CLI

use clap::Parser;

use zenedit::cli::{run_cli, Cli, EXIT_FAILURE};
use zenedit::config::ConfigManager;
use zenedit::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(EXIT_FAILURE);
        }
    };

    let mut logging_config = config.get_config().logging.clone();
    logging_config.json |= cli.json_logs;
    let guard = logging::init(&logging_config);
    tracing::debug!(config = ?config.get_config_path(), "configuration loaded");

    let code = run_cli(cli, config).await;
    drop(guard);
    std::process::exit(code);
}
