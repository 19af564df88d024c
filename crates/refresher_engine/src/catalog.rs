use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use refresher_core::{CatalogId, MetadataSnapshot};
use refresher_logging::refresh_debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::command::{run_captured, CapturedOutput};

const CONTENT_FORMAT: &str = "epub";
const NO_MATCH_MARKER: &str = "No books matching";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("catalog {action} failed: {message}")]
    Command {
        action: &'static str,
        message: String,
    },
    #[error("format {format} not present for record {id}")]
    FormatMissing { id: CatalogId, format: &'static str },
    #[error("no catalog record with id {0}")]
    NoSuchRecord(CatalogId),
    #[error("unreadable catalog metadata: {0}")]
    Metadata(String),
    #[error("scratch io error: {0}")]
    Io(#[from] io::Error),
}

/// The personal library the stories live in.
pub trait Catalog {
    /// Looks up the record whose source-link identifier matches `url`.
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogId>, CatalogError>;

    fn metadata(&self, id: CatalogId) -> Result<MetadataSnapshot, CatalogError>;

    /// Copies the stored content into `scratch_dir` and returns the file path.
    fn export_content(&self, id: CatalogId, scratch_dir: &Path) -> Result<PathBuf, CatalogError>;

    /// Replaces the stored content with the file at `content`.
    fn replace_content(&self, id: CatalogId, content: &Path) -> Result<(), CatalogError>;
}

/// Calibre library driven through the `calibredb` command line tool.
#[derive(Debug, Clone)]
pub struct CalibreCatalog {
    program: String,
    library: PathBuf,
}

impl CalibreCatalog {
    pub fn new(program: impl Into<String>, library: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            library: library.into(),
        }
    }

    fn calibredb(&self, action: &str, args: Vec<OsString>) -> Result<CapturedOutput, CatalogError> {
        let mut full: Vec<OsString> = vec![
            action.into(),
            "--with-library".into(),
            self.library.clone().into_os_string(),
        ];
        full.extend(args);
        run_captured(&self.program, full).map_err(|source| CatalogError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

impl Catalog for CalibreCatalog {
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogId>, CatalogError> {
        // A leading `=` makes calibre compare the whole identifier, not a substring.
        let expression = format!("identifiers:url:\"={}\"", url.replace('"', "\\\""));
        let output = self.calibredb("search", vec![expression.into()])?;
        if !output.success {
            if output.combined().contains(NO_MATCH_MARKER) {
                return Ok(None);
            }
            return Err(CatalogError::Command {
                action: "search",
                message: output.combined().trim().to_string(),
            });
        }
        Ok(parse_search_ids(&output.stdout).into_iter().next())
    }

    fn metadata(&self, id: CatalogId) -> Result<MetadataSnapshot, CatalogError> {
        let output = self.calibredb(
            "list",
            vec![
                "--for-machine".into(),
                "--fields".into(),
                "all".into(),
                "--search".into(),
                format!("id:{id}").into(),
            ],
        )?;
        if !output.success {
            return Err(CatalogError::Command {
                action: "list",
                message: output.combined().trim().to_string(),
            });
        }
        parse_list_output(&output.stdout, id)
    }

    fn export_content(&self, id: CatalogId, scratch_dir: &Path) -> Result<PathBuf, CatalogError> {
        let target = scratch_dir.join(format!("{id}.{CONTENT_FORMAT}"));
        if target.exists() {
            fs::remove_file(&target)?;
        }

        let output = self.calibredb(
            "export",
            vec![
                "--dont-save-cover".into(),
                "--dont-write-opf".into(),
                "--single-dir".into(),
                "--formats".into(),
                CONTENT_FORMAT.into(),
                "--template".into(),
                "{id}".into(),
                "--to-dir".into(),
                scratch_dir.as_os_str().to_owned(),
                id.to_string().into(),
            ],
        )?;
        if !output.success {
            return Err(CatalogError::Command {
                action: "export",
                message: output.combined().trim().to_string(),
            });
        }
        if !target.is_file() {
            return Err(CatalogError::FormatMissing {
                id,
                format: CONTENT_FORMAT,
            });
        }
        refresh_debug!("Exported record {} to {:?}", id, target);
        Ok(target)
    }

    fn replace_content(&self, id: CatalogId, content: &Path) -> Result<(), CatalogError> {
        let output = self.calibredb(
            "add_format",
            vec![id.to_string().into(), content.as_os_str().to_owned()],
        )?;
        if !output.success {
            return Err(CatalogError::Command {
                action: "add_format",
                message: output.combined().trim().to_string(),
            });
        }
        Ok(())
    }
}

/// `calibredb search` prints matching ids separated by commas.
fn parse_search_ids(stdout: &str) -> Vec<CatalogId> {
    stdout
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|part| part.parse::<CatalogId>().ok())
        .collect()
}

/// `calibredb list --for-machine` prints a JSON array of field objects.
fn parse_list_output(stdout: &str, id: CatalogId) -> Result<MetadataSnapshot, CatalogError> {
    let records: Vec<Map<String, Value>> =
        serde_json::from_str(stdout).map_err(|err| CatalogError::Metadata(err.to_string()))?;
    let record = records
        .into_iter()
        .find(|record| record.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or(CatalogError::NoSuchRecord(id))?;
    Ok(MetadataSnapshot::from_fields(record))
}
