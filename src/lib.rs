//! Hierarchical host/path HTTP request multiplexer: IP-filter composition,
//! atomic snapshot reload, and a lookup cache tied to the snapshot that
//! produced it.

pub mod config;
pub mod error;
pub mod logging;
pub mod mux;

#[cfg(feature = "pingora-adapter")]
pub use mux::pingora_adapter;
