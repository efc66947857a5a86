//! Internal error type for the mux's handful of fallible helpers (regex
//! compilation, tracer construction). None of these are user-facing — every
//! call site logs and falls back rather than propagating (spec §7) — but
//! the teacher never gives a fallible helper a stringly-typed error, so
//! neither do we.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("failed to compile regexp '{pattern}': {source}")]
    InvalidRegexp {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to construct tracer: {0}")]
    TracerConstruction(String),

    #[error("failed to close tracer: {0}")]
    TracerClose(String),

    #[error("invalid ip filter entry '{entry}': {reason}")]
    InvalidIpFilterEntry { entry: String, reason: String },
}
