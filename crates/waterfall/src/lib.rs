//! Transaction-lifecycle waterfall generation.
//!
//! Fuses the collectors' latest snapshots into a node/link graph of the
//! transaction pipeline (submission → mempool → block building → consensus
//! → execution → state update → finality, with an explicit dropped sink).
//! The generator picks the highest-fidelity source available and records it
//! in the output's metadata, so consumers can always tell which upstream
//! produced the numbers.

#![deny(missing_docs)]

mod generator;
mod graph;
mod legacy;

pub use generator::{generate, WaterfallInputs, INTERVAL_SECONDS};
pub use graph::{
    WaterfallDrops, WaterfallGraph, WaterfallLink, WaterfallMetadata, WaterfallNode,
    WaterfallSource,
};
pub use legacy::{generate_legacy, LegacyIn, LegacyOut, LegacyWaterfall};
