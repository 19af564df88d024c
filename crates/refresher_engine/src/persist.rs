use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use refresher_logging::{refresh_debug, refresh_warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("retry ledger directory missing or not writable: {0}")]
    LedgerDir(String),
    #[error("io error on retry ledger {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Newline-delimited list of story links waiting for another attempt.
///
/// The file is drained once at the start of a run and appended to while the
/// run defers stories. Every append is synced before it returns.
#[derive(Debug, Clone)]
pub struct RetryLedger {
    path: PathBuf,
}

impl RetryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every entry, then deletes the file.
    ///
    /// A missing file yields an empty list. Blank lines are skipped; repeated
    /// entries are kept. Lines that are not valid UTF-8 (a torn append) are
    /// dropped with a warning so they never block draining. The file is only
    /// removed after a successful read.
    pub fn load_and_clear(&self) -> Result<Vec<String>, PersistError> {
        let content = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                refresh_debug!("No retry ledger at {:?}", self.path);
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let mut entries = Vec::new();
        for raw in content.split(|byte| *byte == b'\n') {
            match std::str::from_utf8(raw) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        entries.push(line.to_owned());
                    }
                }
                Err(_) => refresh_warn!(
                    "Dropping undecodable retry entry {:?} from {:?}",
                    String::from_utf8_lossy(raw),
                    self.path
                ),
            }
        }

        fs::remove_file(&self.path).map_err(|err| self.io_error(err))?;
        refresh_debug!(
            "Loaded {} retry entries from {:?}",
            entries.len(),
            self.path
        );
        Ok(entries)
    }

    /// Appends one entry and syncs it to disk.
    pub fn append(&self, url: &str) -> Result<(), PersistError> {
        let url = url.trim();
        if url.is_empty() || url.contains('\n') {
            refresh_warn!("Refusing to queue malformed retry entry {:?}", url);
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            ensure_ledger_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.io_error(err))?;
        writeln!(file, "{url}").map_err(|err| self.io_error(err))?;
        file.flush().map_err(|err| self.io_error(err))?;
        file.sync_data().map_err(|err| self.io_error(err))?;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Ensure the ledger's directory exists; create if missing.
fn ensure_ledger_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::LedgerDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::LedgerDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::LedgerDir(e.to_string()))?;
    }
    Ok(())
}
