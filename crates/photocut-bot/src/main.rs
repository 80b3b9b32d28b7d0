//! photocut bot entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use photocut_bot::cli::Cli;
use photocut_bot::config::BotConfig;
use photocut_core::{LogSettings, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Values from .env never override the real environment.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match BotConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut log = LogSettings::new(cli.debug);
    if let Some(format) = config.log_format {
        log = log.with_format(format);
    }
    if let Err(e) = init_logging(log) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting photocut");

    match photocut_bot::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "photocut stopped");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
