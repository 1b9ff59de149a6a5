//! MonadBFT consensus phase tracking.
//!
//! The gateway does not participate in consensus; it observes block arrival
//! and labels each recent block with its lifecycle phase. Under MonadBFT's
//! 2-block finality, the arrival of block `N` implies `N - 1` has been voted
//! on and `N - 2` is finalized, so the tracker infers transitions from
//! arrival order and accepts explicit signals when the upstream provides
//! them.

#![deny(missing_docs)]

mod tracker;

pub use tracker::{
    BlockConsensusState, ConsensusStateSummary, ConsensusTracker, TrackerMetrics,
    DEFAULT_MAX_HISTORY,
};
