use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_IMAP_SERVER: &str = "imap.gmail.com";

const GENERAL_SECTION: &str = "Configuration";
const IMAP_SECTION: &str = "IMAP";
const PLUGINS_SECTION: &str = "Plugins";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration file is not valid TOML: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("Invalid general configuration: {0}")]
    General(String),
    #[error("Invalid IMAP configuration: {0}")]
    Imap(String),
    #[error("Invalid plugin configuration: {0}")]
    Plugins(String),
}

/// Settings for one run, parsed once and passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub general: GeneralConfig,
    pub imap: ImapConfig,
    pub plugins: PluginConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneralConfig {
    #[serde(rename = "Verbose", default)]
    pub verbose: bool,
    #[serde(rename = "LibraryPath")]
    pub library_path: PathBuf,
    /// Parsed but not acted on yet.
    #[serde(rename = "AddNewStories", default)]
    pub add_new_stories: bool,
    #[serde(rename = "Quiet", default)]
    pub quiet: bool,
    #[serde(rename = "LogFile", default)]
    pub log_file: Option<PathBuf>,
    #[serde(rename = "CalibreCommand", default = "default_calibre_command")]
    pub calibre_command: String,
    #[serde(rename = "FanFicFareCommand", default = "default_fanficfare_command")]
    pub fanficfare_command: String,
}

#[derive(Clone, PartialEq, Deserialize)]
pub struct ImapConfig {
    #[serde(rename = "Server", default = "default_imap_server")]
    pub server: String,
    #[serde(rename = "Port", default = "default_imap_port")]
    pub port: u16,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Folder", default = "default_imap_folder")]
    pub folder: String,
    #[serde(rename = "MarkUpdatesAsRead", default = "default_true")]
    pub mark_read: bool,
}

// Keeps the password out of debug logs.
impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("folder", &self.folder)
            .field("mark_read", &self.mark_read)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginConfig {
    /// Built-in plugins to construct, by registry name.
    #[serde(rename = "Enabled", default)]
    pub enabled: Vec<String>,
    /// Directory scanned for executable plugins.
    #[serde(rename = "Directory", default = "default_plugin_dir")]
    pub directory: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            directory: default_plugin_dir(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses a TOML document. Each required section fails with its own error.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = toml::from_str(text)?;

        let general = table
            .remove(GENERAL_SECTION)
            .ok_or_else(|| ConfigError::General(format!("missing [{GENERAL_SECTION}] section")))?
            .try_into::<GeneralConfig>()
            .map_err(|err| ConfigError::General(err.to_string()))?;

        let imap = table
            .remove(IMAP_SECTION)
            .ok_or_else(|| ConfigError::Imap(format!("missing [{IMAP_SECTION}] section")))?
            .try_into::<ImapConfig>()
            .map_err(|err| ConfigError::Imap(err.to_string()))?;

        let plugins = match table.remove(PLUGINS_SECTION) {
            Some(value) => value
                .try_into::<PluginConfig>()
                .map_err(|err| ConfigError::Plugins(err.to_string()))?,
            None => PluginConfig::default(),
        };

        Ok(Self {
            general,
            imap,
            plugins,
        })
    }
}

fn default_calibre_command() -> String {
    "calibredb".to_string()
}

fn default_fanficfare_command() -> String {
    "fanficfare".to_string()
}

fn default_imap_server() -> String {
    DEFAULT_IMAP_SERVER.to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_imap_folder() -> String {
    "INBOX".to_string()
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_true() -> bool {
    true
}
