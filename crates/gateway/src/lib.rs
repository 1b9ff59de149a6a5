//! The monpulse gateway: HTTP API, WebSocket wire protocol, client registry
//! and per-client broadcast loop.
//!
//! Collectors feed state in; this crate fans the fused view out. Every
//! connected browser gets its own broadcast task driven by a 200 ms ticker,
//! with new-block transitions and a 1 s TPS cadence keying which messages go
//! out on a given tick. A slow or dead client only ever takes down its own
//! task.

#![deny(missing_docs)]

pub mod broadcast;
pub mod fused;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
mod state;

pub use registry::RegistryHandle;
pub use state::AppState;
