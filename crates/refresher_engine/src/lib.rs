//! Refresher engine: collaborators with side effects and the batch driver.
mod attempt;
mod catalog;
mod command;
mod fetch;
mod mail;
mod orchestrator;
mod persist;
mod plugin;

pub use attempt::UpdateAttempt;
pub use catalog::{CalibreCatalog, Catalog, CatalogError};
pub use fetch::{FanFicFareFetcher, FetchError, FetchTranscript, StoryFetcher};
pub use mail::{ImapMailSource, MailError, MailSource};
pub use orchestrator::{RefreshError, Refresher};
pub use persist::{PersistError, RetryLedger};
pub use plugin::{
    discover_executables, ChangedFieldsPlugin, ExecPlugin, Plugin, PluginError, PluginFactory,
    PluginHost, PluginRegistry, LIBRARY_ENV,
};
