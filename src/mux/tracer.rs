//! Distributed tracing collaborator (spec §6 "Tracer factory", §4.3 "Tracer
//! handling", §4.6). The mux only opens and closes spans; transport,
//! sampling, and export belong entirely to whatever implements these traits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MuxError;

/// The portion of a spec's configuration the tracer factory is keyed on.
/// Reload reuses the existing tracer when this is structurally equal to the
/// previous snapshot's configuration (spec §4.3), mirroring the Go
/// original's `reflect.DeepEqual(oldSpec.Tracing, newSpec.Tracing)` check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// One in-flight trace span, finished exactly once by `Context`'s `Drop`.
pub trait Span: Send {
    fn finish(&mut self);
}

/// A constructed tracer, owned by a [`crate::mux::snapshot::Snapshot`].
pub trait Tracer: Send + Sync {
    fn start_span(&self, operation: &str) -> Box<dyn Span>;
    fn close(&self) -> Result<(), MuxError>;
}

/// Builds a [`Tracer`] from a [`TracingConfig`]. A construction failure is
/// logged by the caller and falls back to [`NoopTracer`] (spec §7).
pub trait TracerFactory: Send + Sync {
    fn new_tracer(&self, config: &TracingConfig) -> Result<Arc<dyn Tracer>, MuxError>;
}

/// A span that does nothing. Used wherever no real tracer is configured.
pub struct NoopSpan;

impl Span for NoopSpan {
    fn finish(&mut self) {}
}

/// The always-available fallback tracer (spec §7 "falls back to a no-op
/// tracer; reload never fails").
#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_span(&self, _operation: &str) -> Box<dyn Span> {
        Box::new(NoopSpan)
    }

    fn close(&self) -> Result<(), MuxError> {
        Ok(())
    }
}
