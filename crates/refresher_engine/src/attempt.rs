use std::path::Path;

use refresher_core::{classify_fetch_output, AttemptOutcome};
use refresher_logging::{refresh_debug, refresh_error, refresh_info, refresh_warn};

use crate::fetch::StoryFetcher;
use crate::persist::RetryLedger;

/// Runs the fetch step for one story and turns its chatter into an outcome.
///
/// Transient outcomes are queued in the retry ledger before returning, so the
/// caller only has to decide whether to write the content back.
pub struct UpdateAttempt<'a> {
    fetcher: &'a dyn StoryFetcher,
    ledger: &'a RetryLedger,
}

impl<'a> UpdateAttempt<'a> {
    pub fn new(fetcher: &'a dyn StoryFetcher, ledger: &'a RetryLedger) -> Self {
        Self { fetcher, ledger }
    }

    /// `source_url` is only used for retry bookkeeping; the fetch step reads
    /// the source link embedded in the content file.
    pub fn attempt(&self, content_path: &Path, source_url: &str) -> AttemptOutcome {
        let outcome = match self.fetcher.update_in_place(content_path) {
            Ok(transcript) => {
                refresh_debug!(
                    "Fetch step finished (exit ok: {}) with {} bytes of output",
                    transcript.exit_ok,
                    transcript.text.len()
                );
                classify_fetch_output(&transcript.text)
            }
            Err(err) => {
                refresh_error!("Could not run the fetch step for {}: {}", source_url, err);
                AttemptOutcome::Unrecognized
            }
        };

        match outcome {
            AttemptOutcome::Updated => {}
            AttemptOutcome::MoreChaptersLocally => {
                refresh_warn!("More chapters found in local version.");
            }
            AttemptOutcome::NoNewChapters => {
                refresh_info!(
                    "No new chapters found - update may not yet have processed through site. Queuing for retry on next run."
                );
            }
            AttemptOutcome::ChallengeBlocked => {
                refresh_warn!("Source site served an unsolved challenge. Queuing for retry on next run.");
            }
            AttemptOutcome::NoSourceURL => {
                refresh_warn!("No URL in EPUB to update from.");
            }
            AttemptOutcome::Unrecognized => {}
        }

        if outcome.should_retry() {
            if let Err(err) = self.ledger.append(source_url) {
                refresh_error!("Failed to queue {} for retry: {}", source_url, err);
            }
        }
        outcome
    }
}
