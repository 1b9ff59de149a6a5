//! MonadBFT consensus phase of a tracked block.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus phase of a single block.
///
/// Phases only advance (`Proposed` → `Voted` → `Finalized`); the tracker
/// enforces that no block ever re-enters an earlier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusPhase {
    /// Block proposed by the leader; not yet voted on.
    Proposed,
    /// Quorum of votes observed (inferred after one successor block).
    Voted,
    /// Finalized under 2-block finality. Terminal.
    Finalized,
}

impl ConsensusPhase {
    /// Progress through the lifecycle as a percentage (33 / 66 / 100).
    pub fn progress_percent(&self) -> u8 {
        match self {
            ConsensusPhase::Proposed => 33,
            ConsensusPhase::Voted => 66,
            ConsensusPhase::Finalized => 100,
        }
    }
}

impl fmt::Display for ConsensusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusPhase::Proposed => write!(f, "proposed"),
            ConsensusPhase::Voted => write!(f, "voted"),
            ConsensusPhase::Finalized => write!(f, "finalized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_is_monotonic() {
        assert!(ConsensusPhase::Proposed < ConsensusPhase::Voted);
        assert!(ConsensusPhase::Voted < ConsensusPhase::Finalized);
    }

    #[test]
    fn test_phase_progress() {
        assert_eq!(ConsensusPhase::Proposed.progress_percent(), 33);
        assert_eq!(ConsensusPhase::Voted.progress_percent(), 66);
        assert_eq!(ConsensusPhase::Finalized.progress_percent(), 100);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConsensusPhase::Finalized).unwrap(),
            "\"finalized\""
        );
    }
}
