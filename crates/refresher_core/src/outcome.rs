use std::fmt;

/// Result category of one update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The fetch step finished without a known failure marker.
    Updated,
    /// The source has nothing new yet.
    NoNewChapters,
    /// The source site served an anti-bot challenge.
    ChallengeBlocked,
    /// The stored file carries no source link to update from.
    NoSourceURL,
    /// The stored copy is ahead of the source.
    MoreChaptersLocally,
    /// The fetch step could not be run, so there is no text to classify.
    Unrecognized,
}

impl AttemptOutcome {
    /// Transient outcomes go back into the retry ledger.
    pub fn should_retry(self) -> bool {
        matches!(
            self,
            AttemptOutcome::NoNewChapters | AttemptOutcome::ChallengeBlocked
        )
    }

    pub fn is_updated(self) -> bool {
        self == AttemptOutcome::Updated
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Updated => write!(f, "updated"),
            AttemptOutcome::NoNewChapters => write!(f, "no new chapters"),
            AttemptOutcome::ChallengeBlocked => write!(f, "blocked by challenge"),
            AttemptOutcome::NoSourceURL => write!(f, "no source url"),
            AttemptOutcome::MoreChaptersLocally => write!(f, "more chapters locally"),
            AttemptOutcome::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// One substring marker and the outcome it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeRule {
    /// Lowercase when `ignore_case` is set.
    pub marker: &'static str,
    pub outcome: AttemptOutcome,
    pub ignore_case: bool,
}

impl OutcomeRule {
    fn matches(&self, text: &str, lowered: &str) -> bool {
        if self.ignore_case {
            lowered.contains(self.marker)
        } else {
            text.contains(self.marker)
        }
    }
}

/// Priority-ordered marker table. The first rule whose marker appears wins.
pub const OUTCOME_RULES: &[OutcomeRule] = &[
    OutcomeRule {
        marker: "chapters, more than source",
        outcome: AttemptOutcome::MoreChaptersLocally,
        ignore_case: false,
    },
    OutcomeRule {
        marker: "already contains",
        outcome: AttemptOutcome::NoNewChapters,
        ignore_case: false,
    },
    OutcomeRule {
        marker: "No story url found in epub to update",
        outcome: AttemptOutcome::NoSourceURL,
        ignore_case: false,
    },
    OutcomeRule {
        marker: "cloudflare",
        outcome: AttemptOutcome::ChallengeBlocked,
        ignore_case: true,
    },
    OutcomeRule {
        marker: "captcha",
        outcome: AttemptOutcome::ChallengeBlocked,
        ignore_case: true,
    },
];

/// Classifies the fetch step's diagnostic text.
///
/// Text without any known marker counts as [`AttemptOutcome::Updated`]. A
/// reworded diagnostic upstream therefore reads as success.
pub fn classify_fetch_output(text: &str) -> AttemptOutcome {
    let lowered = text.to_lowercase();
    OUTCOME_RULES
        .iter()
        .find(|rule| rule.matches(text, &lowered))
        .map(|rule| rule.outcome)
        .unwrap_or(AttemptOutcome::Updated)
}
