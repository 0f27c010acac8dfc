//! Framework lifecycle states

use serde::Serialize;
use std::fmt;

/// Where a framework run is in its lifecycle
///
/// Runs move `Ready -> Preparing -> Crawling -> Auditing -> Cleanup -> Done`.
/// `Paused` is entered from `Crawling` or `Auditing` and left back into the
/// phase that was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkStatus {
    #[default]
    Ready,
    Preparing,
    Crawling,
    Auditing,
    Paused,
    Cleanup,
    Done,
}

impl FrameworkStatus {
    /// Returns true for the phases a pause can interrupt
    pub fn is_pausable(&self) -> bool {
        matches!(self, Self::Crawling | Self::Auditing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Preparing => "preparing",
            Self::Crawling => "crawling",
            Self::Auditing => "auditing",
            Self::Paused => "paused",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for FrameworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
