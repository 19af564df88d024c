use std::ffi::OsStr;
use std::io;
use std::process::{Command, Stdio};

use refresher_logging::refresh_trace;

/// Output of one external program run, decoded lossily as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CapturedOutput {
    /// stdout followed by stderr, as one diagnostic stream.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

/// Runs `program` to completion with stdin closed and both output streams captured.
pub(crate) fn run_captured<I, S>(program: &str, args: I) -> io::Result<CapturedOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    refresh_trace!("Running {:?}", command);

    let output = command.output()?;
    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}
