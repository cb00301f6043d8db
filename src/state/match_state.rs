/// Match state definitions for tracking ingestion progress
///
/// This module defines the states a candidate match moves through while it is
/// fetched, filtered and either ingested or skipped.
use std::fmt;

/// Represents the current state of a match in the ingestion process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    // ===== Active States =====
    /// Match ID passed the threshold filter and is absent from the store
    Candidate,

    /// Full match payload has been retrieved
    Fetched,

    /// Payload has been checked against the match filters
    Filtered,

    // ===== Terminal States =====
    /// Match, participants and participant ranks were committed
    Ingested,

    /// Match was irrelevant for analysis; nothing was written
    Skipped,
}

impl MatchState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ingested | Self::Skipped)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: MatchState) -> bool {
        matches!(
            (self, next),
            (Self::Candidate, Self::Fetched)
                | (Self::Fetched, Self::Filtered)
                | (Self::Filtered, Self::Ingested)
                | (Self::Filtered, Self::Skipped)
        )
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Candidate => "candidate",
            Self::Fetched => "fetched",
            Self::Filtered => "filtered",
            Self::Ingested => "ingested",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", name)
    }
}

/// Why a fetched match was discarded without persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Game has not finished normally (in progress, remake, ...)
    Incomplete,

    /// Game was played in a queue other than the target queue
    WrongQueue,

    /// Game ended at or below the minimum duration (early surrender)
    TooShort,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Incomplete => "game not complete",
            Self::WrongQueue => "wrong queue",
            Self::TooShort => "below minimum duration",
        };
        write!(f, "{}", reason)
    }
}
