use std::ffi::OsStr;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::command::run_captured;

const UPDATE_ARGS: &[&str] = &["--update-epub", "--non-interactive"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to run fetch step {program}: {source}")]
    Spawn { program: String, source: io::Error },
}

/// Everything the fetch step said while updating one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchTranscript {
    pub text: String,
    pub exit_ok: bool,
}

/// Merges new chapters into an existing content file, in place.
///
/// The file carries its own source link, so only the path is passed.
pub trait StoryFetcher {
    fn update_in_place(&self, content: &Path) -> Result<FetchTranscript, FetchError>;
}

/// Runs the FanFicFare command line tool in update mode.
#[derive(Debug, Clone)]
pub struct FanFicFareFetcher {
    program: String,
}

impl FanFicFareFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StoryFetcher for FanFicFareFetcher {
    fn update_in_place(&self, content: &Path) -> Result<FetchTranscript, FetchError> {
        let args = UPDATE_ARGS
            .iter()
            .map(OsStr::new)
            .chain(std::iter::once(content.as_os_str()));
        let output = run_captured(&self.program, args).map_err(|source| FetchError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        Ok(FetchTranscript {
            text: output.combined(),
            exit_ok: output.success,
        })
    }
}
