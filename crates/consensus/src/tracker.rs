//! Per-block consensus phase state machine with bounded history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use monpulse_types::ConsensusPhase;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default number of blocks kept in the tracker.
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Number of recent blocks embedded in a [`ConsensusStateSummary`].
const SUMMARY_RECENT_BLOCKS: usize = 10;

/// Lifecycle record for a single tracked block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConsensusState {
    /// Block number.
    pub block_number: u64,
    /// Hex block hash as observed on the subscription.
    pub block_hash: String,
    /// Current phase. Transitions are monotonic.
    pub phase: ConsensusPhase,
    /// When the block was first observed.
    pub proposed_at: DateTime<Utc>,
    /// When the block transitioned to `Voted`, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
    /// When the block transitioned to `Finalized`, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    /// Transaction count at propose time.
    pub tx_count: u64,
}

/// Snapshot summary of the tracker, embedded in waterfall metadata and
/// served at `/api/v1/consensus`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusStateSummary {
    /// Highest observed block number.
    pub current_block: u64,
    /// Highest finalized block number.
    pub finalized_block: u64,
    /// `current_block - finalized_block`; non-negative by construction.
    pub blocks_behind: u64,
    /// Tracked blocks currently in `Proposed`.
    pub proposed_blocks: usize,
    /// Tracked blocks currently in `Voted`.
    pub voted_blocks: usize,
    /// Tracked blocks currently in `Finalized`.
    pub finalized_blocks: usize,
    /// The most recent tracked blocks, descending by number.
    pub recent_blocks: Vec<BlockConsensusState>,
}

/// Aggregate timing metrics over the tracked window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerMetrics {
    /// Highest observed block number.
    pub current_block: u64,
    /// Highest finalized block number.
    pub finalized_block: u64,
    /// `current_block - finalized_block`.
    pub finality_lag: u64,
    /// Mean proposed-to-finalized duration in seconds over finalized blocks.
    pub avg_finalization_time: f64,
    /// Number of blocks currently tracked.
    pub tracked_blocks: usize,
}

#[derive(Debug, Default)]
struct TrackerInner {
    blocks: HashMap<u64, BlockConsensusState>,
    current_block: u64,
    finalized_block: u64,
}

/// Tracks the consensus phase of recently observed blocks.
///
/// All transitions for one observation happen under a single write lock, so
/// concurrent observers see the upsert, the phase propagation and the
/// cleanup as one step.
#[derive(Debug)]
pub struct ConsensusTracker {
    inner: RwLock<TrackerInner>,
    max_history: usize,
}

impl ConsensusTracker {
    /// Create a tracker retaining at most `max_history` blocks.
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: RwLock::new(TrackerInner::default()),
            max_history,
        }
    }

    /// Record the observation of block `number`.
    ///
    /// Upserts the block at `Proposed` (idempotent for repeat observations),
    /// advances `number - 1` to `Voted` and `number - 2` to `Finalized` per
    /// the 2-block finality rule, then evicts entries older than the history
    /// window.
    pub fn on_block_proposed(&self, number: u64, hash: &str, tx_count: u64) {
        let now = Utc::now();
        let mut inner = self.inner.write();

        if number > inner.current_block {
            inner.current_block = number;
        }

        inner
            .blocks
            .entry(number)
            .or_insert_with(|| BlockConsensusState {
                block_number: number,
                block_hash: hash.to_string(),
                phase: ConsensusPhase::Proposed,
                proposed_at: now,
                voted_at: None,
                finalized_at: None,
                tx_count,
            });

        // 2-block finality: everything at least two behind the newest block
        // is final, the immediate predecessor has been voted on. Applied to
        // every tracked block so number gaps do not strand old entries.
        let current = inner.current_block;
        let mut highest_finalized = inner.finalized_block;
        for block in inner.blocks.values_mut() {
            if current >= 2 && block.block_number <= current - 2 {
                if block.phase != ConsensusPhase::Finalized {
                    block.phase = ConsensusPhase::Finalized;
                    block.finalized_at = Some(now);
                }
                if block.block_number > highest_finalized {
                    highest_finalized = block.block_number;
                }
            } else if current >= 1
                && block.block_number == current - 1
                && block.phase == ConsensusPhase::Proposed
            {
                block.phase = ConsensusPhase::Voted;
                block.voted_at = Some(now);
            }
        }
        inner.finalized_block = highest_finalized;

        self.evict_old(&mut inner);
    }

    /// Explicitly mark a block as voted, if tracked and not already further
    /// along.
    pub fn on_block_voted(&self, number: u64) {
        let mut inner = self.inner.write();
        if let Some(block) = inner.blocks.get_mut(&number) {
            if block.phase == ConsensusPhase::Proposed {
                block.phase = ConsensusPhase::Voted;
                block.voted_at = Some(Utc::now());
            } else {
                debug!(number, phase = %block.phase, "ignoring vote signal for advanced block");
            }
        }
    }

    /// Explicitly mark a block as finalized, if tracked.
    pub fn on_block_finalized(&self, number: u64) {
        let mut inner = self.inner.write();
        if let Some(block) = inner.blocks.get_mut(&number) {
            if block.phase != ConsensusPhase::Finalized {
                block.phase = ConsensusPhase::Finalized;
                block.finalized_at = Some(Utc::now());
            }
            if number > inner.finalized_block {
                inner.finalized_block = number;
            }
        }
    }

    /// The `count` most recent tracked blocks, descending by number.
    pub fn recent_blocks(&self, count: usize) -> Vec<BlockConsensusState> {
        let inner = self.inner.read();
        let mut blocks: Vec<BlockConsensusState> = inner.blocks.values().cloned().collect();
        blocks.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        blocks.truncate(count);
        blocks
    }

    /// Current summary: heights, lag, per-phase counts, recent blocks.
    pub fn consensus_state(&self) -> ConsensusStateSummary {
        let (current_block, finalized_block, proposed, voted, finalized) = {
            let inner = self.inner.read();
            let mut proposed = 0;
            let mut voted = 0;
            let mut finalized = 0;
            for block in inner.blocks.values() {
                match block.phase {
                    ConsensusPhase::Proposed => proposed += 1,
                    ConsensusPhase::Voted => voted += 1,
                    ConsensusPhase::Finalized => finalized += 1,
                }
            }
            (
                inner.current_block,
                inner.finalized_block,
                proposed,
                voted,
                finalized,
            )
        };

        ConsensusStateSummary {
            current_block,
            finalized_block,
            blocks_behind: current_block.saturating_sub(finalized_block),
            proposed_blocks: proposed,
            voted_blocks: voted,
            finalized_blocks: finalized,
            recent_blocks: self.recent_blocks(SUMMARY_RECENT_BLOCKS),
        }
    }

    /// Phase of a specific block, `None` if not tracked.
    pub fn block_phase(&self, number: u64) -> Option<ConsensusPhase> {
        self.inner.read().blocks.get(&number).map(|b| b.phase)
    }

    /// Lifecycle progress of a block as a percentage; 0 when unknown.
    pub fn phase_progress(&self, number: u64) -> u8 {
        self.block_phase(number)
            .map(|p| p.progress_percent())
            .unwrap_or(0)
    }

    /// Aggregate timing metrics over the tracked window.
    pub fn tracker_metrics(&self) -> TrackerMetrics {
        let inner = self.inner.read();

        let mut total_secs = 0.0;
        let mut finalized_count = 0u32;
        for block in inner.blocks.values() {
            if let Some(finalized_at) = block.finalized_at {
                let duration = finalized_at - block.proposed_at;
                total_secs += duration.num_milliseconds() as f64 / 1000.0;
                finalized_count += 1;
            }
        }

        TrackerMetrics {
            current_block: inner.current_block,
            finalized_block: inner.finalized_block,
            finality_lag: inner.current_block.saturating_sub(inner.finalized_block),
            avg_finalization_time: if finalized_count > 0 {
                total_secs / finalized_count as f64
            } else {
                0.0
            },
            tracked_blocks: inner.blocks.len(),
        }
    }

    fn evict_old(&self, inner: &mut TrackerInner) {
        if inner.blocks.len() <= self.max_history {
            return;
        }
        let threshold = inner.current_block.saturating_sub(self.max_history as u64);
        inner.blocks.retain(|&number, _| number >= threshold);
    }
}

impl Default for ConsensusTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(tracker: &ConsensusTracker, number: u64, tx_count: u64) {
        tracker.on_block_proposed(number, &format!("0x{number:x}"), tx_count);
    }

    #[test]
    fn test_phase_progression_over_three_blocks() {
        let tracker = ConsensusTracker::default();
        observe(&tracker, 100, 10);
        observe(&tracker, 101, 12);
        observe(&tracker, 102, 11);

        assert_eq!(tracker.block_phase(100), Some(ConsensusPhase::Finalized));
        assert_eq!(tracker.block_phase(101), Some(ConsensusPhase::Voted));
        assert_eq!(tracker.block_phase(102), Some(ConsensusPhase::Proposed));

        let state = tracker.consensus_state();
        assert_eq!(state.current_block, 102);
        assert_eq!(state.finalized_block, 100);
        assert_eq!(state.blocks_behind, 2);

        let recent: Vec<u64> = tracker
            .recent_blocks(3)
            .iter()
            .map(|b| b.block_number)
            .collect();
        assert_eq!(recent, vec![102, 101, 100]);
    }

    #[test]
    fn test_repeat_observation_is_idempotent() {
        let tracker = ConsensusTracker::default();
        observe(&tracker, 50, 7);
        let first = tracker.recent_blocks(1);
        observe(&tracker, 50, 7);
        let second = tracker.recent_blocks(1);

        assert_eq!(first, second);
        assert_eq!(tracker.consensus_state().proposed_blocks, 1);
    }

    #[test]
    fn test_block_number_gap_finalizes_old_without_fabricating() {
        let tracker = ConsensusTracker::default();
        observe(&tracker, 10, 5);
        observe(&tracker, 13, 5);

        // 11 and 12 were never observed; nothing is invented for them.
        assert_eq!(tracker.block_phase(11), None);
        assert_eq!(tracker.block_phase(12), None);
        // 10 <= 13 - 2, so it is final despite the gap.
        assert_eq!(tracker.block_phase(10), Some(ConsensusPhase::Finalized));
        assert_eq!(tracker.consensus_state().finalized_block, 10);
    }

    #[test]
    fn test_history_is_bounded() {
        let tracker = ConsensusTracker::new(5);
        for number in 0..50 {
            observe(&tracker, number, 1);
        }
        let state = tracker.consensus_state();
        assert!(tracker.tracker_metrics().tracked_blocks <= 6);
        assert_eq!(state.current_block, 49);
        assert_eq!(tracker.block_phase(0), None);
    }

    #[test]
    fn test_explicit_finalize_does_not_regress() {
        let tracker = ConsensusTracker::default();
        observe(&tracker, 7, 1);
        tracker.on_block_finalized(7);
        assert_eq!(tracker.block_phase(7), Some(ConsensusPhase::Finalized));

        // A late vote signal must not pull the block back.
        tracker.on_block_voted(7);
        assert_eq!(tracker.block_phase(7), Some(ConsensusPhase::Finalized));
        assert_eq!(tracker.consensus_state().finalized_block, 7);
    }

    #[test]
    fn test_phase_progress_for_unknown_block() {
        let tracker = ConsensusTracker::default();
        assert_eq!(tracker.phase_progress(99), 0);
        observe(&tracker, 99, 0);
        assert_eq!(tracker.phase_progress(99), 33);
    }

    #[test]
    fn test_average_finalization_time_counts_finalized_only() {
        let tracker = ConsensusTracker::default();
        observe(&tracker, 1, 0);
        observe(&tracker, 2, 0);
        assert_eq!(tracker.tracker_metrics().avg_finalization_time, 0.0);

        observe(&tracker, 3, 0);
        let metrics = tracker.tracker_metrics();
        assert_eq!(metrics.finality_lag, 2);
        assert!(metrics.avg_finalization_time >= 0.0);
    }
}
