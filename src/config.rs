//! Configuration types and ambient process settings.
//!
//! `MuxSpec` is the declarative configuration the mux engine compiles into a
//! `Snapshot` on every reload (spec §3 "Snapshot... spec"). It is plain
//! `serde` data, not `mini-config`-backed, because `mini-config`'s
//! `Configure` derive gives every key process-global `RwLock` storage —
//! exactly the shape the routing table's atomic-swap invariant (I2) forbids
//! (see the REDESIGN FLAGS entry in `DESIGN.md`). `mini-config` is instead
//! kept, as the teacher uses it, for small ambient process settings that
//! really are global singletons: the server's own name and the configured
//! log level, grounded on `router-core/src/config.rs`'s `RoutingData`
//! pattern.

use mini_config::Configure;
use serde::{Deserialize, Serialize};

use crate::mux::ipfilter::IpFilterSpec;
use crate::mux::rule::RuleSpec;
use crate::mux::tracer::TracingConfig;

/// The full declarative configuration for one reload (spec §3, §4.3).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MuxSpec {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub global_ip_filter: Option<IpFilterSpec>,
    #[serde(default)]
    pub global_filter_name: Option<String>,
    #[serde(default)]
    pub x_forwarded_for: bool,
    #[serde(default)]
    pub cache_size: usize,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Ambient process-level settings, keyed the way the teacher keys
/// `RoutingData` — small global values that are not the routing table.
#[derive(Debug, Clone, Configure)]
pub enum ProcessSettings {
    /// The name this gateway instance reports as `Context::server_name`.
    ServerName,
    /// The `RUST_LOG`-style filter passed to `env_logger` at startup.
    LogLevel,
}

/// Sets the ambient defaults used before the first real configuration load.
/// Mirrors `router-core/src/config.rs::init`.
pub fn init() {
    ProcessSettings::ServerName.set("mux-gateway");
    ProcessSettings::LogLevel.set("info");
}
