mod app;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

const CONFIG_FILE: &str = "config.toml";

fn main() -> ExitCode {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let config = match refresher_core::Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return ExitCode::FAILURE;
        }
    };

    logging::initialize(&config.general);

    match app::run(config) {
        Ok(_summary) => ExitCode::SUCCESS,
        Err(err) => {
            refresher_logging::refresh_error!("{:#}", err);
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}
