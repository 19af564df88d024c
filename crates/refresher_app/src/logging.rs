//! Logger initialization for the refresher binary.
//!
//! Always logs to the terminal; also appends to `LogFile` when configured.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::LevelFilter;
use refresher_core::GeneralConfig;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Installs the global logger according to the `Verbose`, `Quiet` and `LogFile` keys.
pub fn initialize(general: &GeneralConfig) {
    let level = refresher_logging::level_for(general.verbose, general.quiet);
    if level == LevelFilter::Off {
        return;
    }

    let config = build_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = general.log_file.as_deref() {
        if let Some(file_logger) = create_file_logger(path, level, config) {
            loggers.push(file_logger);
        }
    }

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(
    path: &Path,
    level: LevelFilter,
    config: Config,
) -> Option<Box<WriteLogger<File>>> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not open log file at {:?}: {}", path, err);
            None
        }
    }
}
