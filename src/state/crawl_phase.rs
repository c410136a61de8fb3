/// Crawl phase definitions for tracking coordinator progress
///
/// A crawl moves strictly forward through its phases; the coordinator
/// rejects any other transition.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Configuration is held, nothing has been dispatched
    Idle,

    /// Page addresses are being built and queued for the workers
    Dispatching,

    /// Waiting for every dispatched page task to finish
    Awaiting,

    /// Aggregating outcomes and flushing the category writer
    Finalizing,

    /// The report is final
    Done,
}

impl CrawlPhase {
    /// Returns the phase that follows this one, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Awaiting),
            Self::Awaiting => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Returns true if moving from this phase to `to` is allowed
    pub fn can_transition_to(&self, to: Self) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Awaiting => "awaiting",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
