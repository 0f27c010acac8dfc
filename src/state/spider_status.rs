//! Spider lifecycle states

use std::fmt;

/// Where a spider is in its lifecycle
///
/// `Idle` is initial. `Running` and `Paused` alternate through
/// `pause`/`resume`. `Done` is reached once the frontier is empty and every
/// in-flight fetch has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiderStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Done,
}

impl SpiderStatus {
    /// Returns true once the crawl has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true while a crawl is in progress, paused or not
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SpiderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
