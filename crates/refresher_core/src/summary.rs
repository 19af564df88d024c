use std::fmt;

/// Counters reported at the end of one batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Work-list entries processed, whatever their fate.
    pub attempted: usize,
    /// Entries whose refreshed content was written back to the catalog.
    pub succeeded: usize,
    /// Entries appended to the retry ledger during this run.
    pub deferred: usize,
    /// Plugin hook invocations that returned an error or panicked.
    pub hook_failures: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.attempted)
    }
}
