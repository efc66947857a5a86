//! The rule table / snapshot (spec §3 "Snapshot (rule table)", §4.3 "Rule
//! table construction and atomic reload").
//!
//! A `Snapshot` is built once, in full, and never mutated afterward (I2).
//! `Engine` holds an `ArcSwap<Snapshot<R, S>>` and publishes a freshly built
//! one on every `reload()` — see `mux::engine` for the publication step and
//! why this replaces the teacher's `LazyLock<RwLock<HashMap<...>>>` globals.

use std::sync::Arc;

use crate::config::MuxSpec;

use super::backend::BackendMapper;
use super::cache::RouteCache;
use super::ipfilter::{IpFilter, IpFilterChain};
use super::request::{Request, Response};
use super::rule::RuleDescriptor;
use super::tracer::{NoopTracer, Tracer, TracerFactory};

/// The immutable, atomically-swappable routing table.
pub struct Snapshot<R: Request, S: Response> {
    pub spec: MuxSpec,
    pub backend_mapper: Arc<dyn BackendMapper<R, S>>,
    pub global_ip_filter: Option<IpFilter>,
    pub global_ip_filter_chain: Option<IpFilterChain>,
    pub tracer: Arc<dyn Tracer>,
    pub cache: Option<RouteCache>,
    pub rules: Vec<RuleDescriptor>,
}

impl<R: Request, S: Response> Snapshot<R, S> {
    /// The always-valid starting point: no rules, no cache, a no-op tracer
    /// (spec §7 "initial snapshot has an empty rule list and a no-op
    /// tracer").
    pub fn empty(backend_mapper: Arc<dyn BackendMapper<R, S>>) -> Self {
        Self {
            spec: MuxSpec::default(),
            backend_mapper,
            global_ip_filter: None,
            global_ip_filter_chain: None,
            tracer: Arc::new(NoopTracer),
            cache: None,
            rules: Vec::new(),
        }
    }
}

/// Builds a new snapshot from `spec`, reusing `previous`'s tracer when the
/// tracing configuration is structurally unchanged (spec §4.3). Returns the
/// new snapshot plus, when a new tracer was constructed, the old tracer that
/// the caller should close asynchronously (never on the publishing path).
pub fn build_snapshot<R: Request, S: Response>(
    spec: MuxSpec,
    backend_mapper: Arc<dyn BackendMapper<R, S>>,
    tracer_factory: &dyn TracerFactory,
    previous: Option<&Snapshot<R, S>>,
) -> (Snapshot<R, S>, Option<Arc<dyn Tracer>>) {
    let (tracer, stale_tracer) = match previous {
        Some(prev) if prev.spec.tracing == spec.tracing => (prev.tracer.clone(), None),
        Some(prev) => {
            let new_tracer = construct_tracer(tracer_factory, &spec);
            (new_tracer, Some(prev.tracer.clone()))
        }
        None => (construct_tracer(tracer_factory, &spec), None),
    };

    let global_ip_filter = spec.global_ip_filter.as_ref().map(IpFilter::new);
    let global_ip_filter_chain = IpFilterChain::compose(None, global_ip_filter.as_ref());

    let rules = spec
        .rules
        .iter()
        .map(|rule_spec| RuleDescriptor::new(rule_spec, global_ip_filter_chain.as_ref()))
        .collect();

    let cache = if spec.cache_size > 0 {
        Some(RouteCache::new(spec.cache_size))
    } else {
        None
    };

    let snapshot = Snapshot {
        spec,
        backend_mapper,
        global_ip_filter,
        global_ip_filter_chain,
        tracer,
        cache,
        rules,
    };

    (snapshot, stale_tracer)
}

fn construct_tracer(tracer_factory: &dyn TracerFactory, spec: &MuxSpec) -> Arc<dyn Tracer> {
    match tracer_factory.new_tracer(&spec.tracing) {
        Ok(tracer) => tracer,
        Err(e) => {
            log::error!("tracer construction failed, falling back to no-op: {e}");
            Arc::new(NoopTracer)
        }
    }
}
