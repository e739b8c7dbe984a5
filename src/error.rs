use std::time::Duration;

use crate::duration::format_duration;

/// Errors that end a snapshot run.
///
/// None of these are retried: the run that produced one is abandoned and the
/// caller decides how to surface it (exit code or JSON payload).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed credentials, environment, or configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A bounded wait expired before the expected page or element showed up.
    #[error("timed out after {} waiting for {what}", display_timeout(.timeout))]
    NavigationTimeout { what: String, timeout: Duration },

    /// The portfolio page did not have the expected structure.
    #[error("could not extract portfolio data: {0}")]
    Extraction(String),

    #[error("could not match any provided security questions with the one on screen")]
    UnmatchedSecurityQuestion,

    /// The spreadsheet append failed. Details are logged, not carried.
    #[error("failed to append data to the spreadsheet")]
    SheetAppend,

    #[error("browser automation failed: {0:#}")]
    Browser(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn display_timeout(timeout: &Duration) -> String {
    format_duration(*timeout)
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::NavigationTimeout {
            what: what.into(),
            timeout,
        }
    }

    /// True for errors caused by the caller's input rather than the run itself.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}
