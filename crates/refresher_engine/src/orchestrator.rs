use std::fs;
use std::path::{Path, PathBuf};

use refresher_core::{
    assemble_work_list, AttemptOutcome, CatalogId, MetadataPair, MetadataSnapshot, RunSummary,
};
use refresher_logging::{refresh_debug, refresh_error, refresh_info, refresh_warn};
use thiserror::Error;

use crate::attempt::UpdateAttempt;
use crate::catalog::{Catalog, CatalogError};
use crate::fetch::StoryFetcher;
use crate::mail::MailSource;
use crate::persist::RetryLedger;
use crate::plugin::PluginHost;

/// Why one story was dropped from the batch.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("catalog lookup failed: {0}")]
    Lookup(#[source] CatalogError),
    #[error("failed to read metadata: {0}")]
    Metadata(#[source] CatalogError),
    #[error("failed to export story: {0}")]
    Export(#[source] CatalogError),
    #[error("failed to write updated story back: {0}")]
    WriteBack(#[source] CatalogError),
}

/// What happened to one work-list entry.
#[derive(Debug)]
enum ItemResult {
    NotInCatalog,
    Attempted(AttemptOutcome),
    Updated(MetadataPair),
}

/// Drives one batch pass over the retry ledger and the mail source.
///
/// Stories are processed strictly one after another; the scratch directory
/// holds at most one exported file at a time.
pub struct Refresher<'a> {
    catalog: &'a dyn Catalog,
    fetcher: &'a dyn StoryFetcher,
    ledger: &'a RetryLedger,
    scratch_dir: PathBuf,
    plugins: PluginHost,
}

impl<'a> Refresher<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        fetcher: &'a dyn StoryFetcher,
        ledger: &'a RetryLedger,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            ledger,
            scratch_dir: scratch_dir.into(),
            plugins: PluginHost::new(),
        }
    }

    pub fn with_plugins(mut self, plugins: PluginHost) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn run(&mut self, mail: &mut dyn MailSource) -> RunSummary {
        let retry = match self.ledger.load_and_clear() {
            Ok(entries) => entries,
            Err(err) => {
                refresh_error!("Could not read the retry ledger: {}", err);
                Vec::new()
            }
        };

        refresh_info!("Searching email for updated stories...");
        let mailed = match mail.updated_story_urls() {
            Ok(urls) => urls,
            Err(err) => {
                refresh_error!(
                    "There was an error searching email. Please check your config. ({})",
                    err
                );
                Vec::new()
            }
        };

        let work = assemble_work_list(retry, mailed);
        refresh_info!("Found {} stories to update.", work.len());

        let mut summary = RunSummary {
            attempted: work.len(),
            ..RunSummary::default()
        };
        let mut updates: Vec<MetadataPair> = Vec::new();

        for (index, url) in work.iter().enumerate() {
            refresh_info!(
                "Searching for {} in catalog ({}/{})",
                url,
                index + 1,
                work.len()
            );
            match self.refresh_one(url) {
                Ok(ItemResult::NotInCatalog) => {}
                Ok(ItemResult::Attempted(outcome)) => {
                    if outcome.should_retry() {
                        summary.deferred += 1;
                    }
                }
                Ok(ItemResult::Updated(pair)) => {
                    summary.succeeded += 1;
                    updates.push(pair);
                }
                Err(err) => refresh_warn!("{} Skipping...", err),
            }
        }

        if !updates.is_empty() && !self.plugins.is_empty() {
            refresh_debug!(
                "Running {} plugin hooks for {} updates",
                self.plugins.len(),
                updates.len()
            );
            summary.hook_failures = self.plugins.run_post_add_hooks(&updates);
        }

        refresh_info!("Finished. {} story updates successful.", summary);
        summary
    }

    fn refresh_one(&self, url: &str) -> Result<ItemResult, RefreshError> {
        let id = match self.catalog.find_by_url(url) {
            Ok(Some(id)) => id,
            Ok(None) => {
                refresh_warn!("Story not found in catalog. Skipping...");
                return Ok(ItemResult::NotInCatalog);
            }
            Err(err) => return Err(RefreshError::Lookup(err)),
        };

        let old = self
            .catalog
            .metadata(id)
            .map_err(RefreshError::Metadata)?;
        refresh_debug!("{} found in catalog. Exporting story...", old.label());

        let content = self
            .catalog
            .export_content(id, &self.scratch_dir)
            .map_err(RefreshError::Export)?;
        refresh_info!(
            "Successfully found and exported {}. Updating story, this may take a while...",
            old.label()
        );

        let result = self.update_exported(id, url, &content, old);
        discard_scratch(&content);
        result
    }

    fn update_exported(
        &self,
        id: CatalogId,
        url: &str,
        content: &Path,
        old: MetadataSnapshot,
    ) -> Result<ItemResult, RefreshError> {
        let outcome = UpdateAttempt::new(self.fetcher, self.ledger).attempt(content, url);
        if !outcome.is_updated() {
            return Ok(ItemResult::Attempted(outcome));
        }

        refresh_debug!("Adding updated story to catalog...");
        self.catalog
            .replace_content(id, content)
            .map_err(RefreshError::WriteBack)?;

        let new = match self.catalog.metadata(id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                refresh_warn!("Story updated but refreshed metadata is unavailable: {}", err);
                old.clone()
            }
        };
        refresh_info!("Update for story {} successful.", new.label());
        Ok(ItemResult::Updated(MetadataPair::new(old, new)))
    }
}

fn discard_scratch(content: &Path) {
    if let Err(err) = fs::remove_file(content) {
        refresh_debug!("Could not remove scratch file {:?}: {}", content, err);
    }
}
