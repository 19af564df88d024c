//! Refresher core: pure, IO-free logic shared by the engine and the app.
mod config;
mod links;
mod mail_text;
mod metadata;
mod outcome;
mod summary;

pub use config::{
    Config, ConfigError, GeneralConfig, ImapConfig, PluginConfig, DEFAULT_IMAP_SERVER,
};
pub use links::{assemble_work_list, canonical_story_url, normalize_story_url};
pub use mail_text::{extract_message_links, extract_story_links};
pub use metadata::{MetadataPair, MetadataSnapshot};
pub use outcome::{classify_fetch_output, AttemptOutcome, OutcomeRule, OUTCOME_RULES};
pub use summary::RunSummary;

/// Internal catalog record id, owned by the catalog store.
pub type CatalogId = u64;
