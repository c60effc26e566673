//! Runtime errors of the timer primitive.

use std::fmt;

/// Errors of [`Timer`](crate::Timer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The OS refused to start the timer thread.
    SpawnFailed(String),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(reason) => write!(f, "could not spawn the timer thread ({reason})"),
        }
    }
}

impl std::error::Error for TimerError {}
