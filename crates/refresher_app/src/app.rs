//! Wires the real collaborators together for one batch pass.

use std::sync::Arc;

use anyhow::Context;
use refresher_core::{Config, RunSummary};
use refresher_engine::{
    CalibreCatalog, FanFicFareFetcher, ImapMailSource, PluginHost, PluginRegistry, Refresher,
    RetryLedger,
};
use refresher_logging::{refresh_debug, refresh_info};

const RETRY_FILE: &str = "retry.txt";

pub fn run(config: Config) -> anyhow::Result<RunSummary> {
    let config = Arc::new(config);
    if config.general.add_new_stories {
        refresh_debug!("AddNewStories is set but adding new stories is not supported yet.");
    }

    let scratch = tempfile::Builder::new()
        .prefix("fic-refresher-")
        .tempdir()
        .context("could not create a scratch directory")?;
    refresh_debug!("Using temporary directory: {:?}", scratch.path());

    let catalog = CalibreCatalog::new(
        config.general.calibre_command.clone(),
        config.general.library_path.clone(),
    );
    let fetcher = FanFicFareFetcher::new(config.general.fanficfare_command.clone());
    let ledger = RetryLedger::new(RETRY_FILE);
    let mut mail = ImapMailSource::new(config.imap.clone());
    let plugins = PluginHost::load(config.clone(), &PluginRegistry::with_builtins());

    let summary = Refresher::new(&catalog, &fetcher, &ledger, scratch.path())
        .with_plugins(plugins)
        .run(&mut mail);

    if summary.deferred > 0 {
        refresh_info!("{} stories queued for retry on the next run.", summary.deferred);
    }
    Ok(summary)
}
