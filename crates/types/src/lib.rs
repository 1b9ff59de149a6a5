//! Core types for the monpulse telemetry gateway.
//!
//! This crate provides the data structures shared by the collectors, the
//! consensus tracker, the waterfall generator and the gateway: block headers
//! as observed on the upstream subscription, transaction log events, the
//! per-block consensus phase, and the fused metrics snapshot the gateway
//! broadcasts from.

#![deny(missing_docs)]

pub mod block;
pub mod hex;
pub mod phase;
pub mod snapshot;

pub use block::{BlockHeader, BlockTxInfo, TransactionLog};
pub use hex::{parse_hex_u64, HexParseError};
pub use phase::ConsensusPhase;
pub use snapshot::{
    ConsensusStats, ExecutionStats, FusedSnapshot, NetworkStats, NodeInfo, WaterfallStageTotals,
};
