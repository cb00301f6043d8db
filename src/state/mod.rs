//! State module for tracking ingestion progress
//!
//! # Components
//!
//! - `MatchState`: Tracks a candidate match through fetch, filter and commit
//! - `SkipReason`: Why a fetched match was discarded

mod match_state;

pub use match_state::{MatchState, SkipReason};
