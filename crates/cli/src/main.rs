use std::process::ExitCode;

use mailey_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use mailey_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn main() -> ExitCode {
    // Logging comes up before dispatch; a broken config falls back to the
    // defaults so the command itself can report the real failure.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config);
    mailey_cli::run()
}
