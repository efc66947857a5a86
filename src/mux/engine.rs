//! The mux engine: the request entry point (spec §2 item 5, §4.2 "Matching
//! algorithm", §4.3 "Rule table construction and atomic reload", §4.4 ACME
//! handoff, §4.5 cache branch).
//!
//! `Engine::route` is a direct, literal port of `original_source/mux.go`'s
//! `ServeHTTP`: cache probe, global IP check, rule scan, path scan,
//! fallthrough — in that precedence, short-circuiting on first match.

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::MuxSpec;

use super::autocert::{is_acme_challenge, AutocertHandler};
use super::backend::BackendMapper;
use super::cache::{CacheEntry, CacheKind, RouteCache};
use super::globalfilter::GlobalFilterRegistry;
use super::path::PathDescriptor;
use super::request::{Context, Request, Response};
use super::snapshot::{build_snapshot, Snapshot};
use super::stats::TopNStats;
use super::tracer::TracerFactory;

/// Appends `ip` to the request's `X-Forwarded-For` header (spec §4.5 step
/// (ii), §8 P6). The substring check — not a parsed, comma-split list check
/// — is deliberate (spec §9): it tolerates whatever upstream proxies already
/// wrote into the header and makes a second application of this function a
/// no-op.
fn append_x_forwarded_for<R: Request>(request: &mut R, ip: IpAddr) {
    let ip_str = ip.to_string();
    match request.header_get("X-Forwarded-For") {
        None | Some("") => request.header_set("X-Forwarded-For", &ip_str),
        Some(existing) if !existing.contains(ip_str.as_str()) => {
            let appended = format!("{existing},{ip_str}");
            request.header_set("X-Forwarded-For", &appended);
        }
        Some(_) => {}
    }
}

/// Holds the current snapshot and the collaborators that do not change
/// across reloads. Cheap to clone (everything behind `Arc`); typically
/// wrapped in one `Arc<Engine<R, S>>` shared across request tasks.
pub struct Engine<R: Request, S: Response> {
    snapshot: ArcSwap<Snapshot<R, S>>,
    tracer_factory: Arc<dyn TracerFactory>,
    autocert: Arc<dyn AutocertHandler<R, S>>,
    global_filter_registry: Option<Arc<dyn GlobalFilterRegistry<R, S>>>,
    stats: Arc<dyn TopNStats>,
    server_name: Arc<str>,
}

impl<R: Request, S: Response> Engine<R, S> {
    pub fn new(
        backend_mapper: Arc<dyn BackendMapper<R, S>>,
        tracer_factory: Arc<dyn TracerFactory>,
        autocert: Arc<dyn AutocertHandler<R, S>>,
        global_filter_registry: Option<Arc<dyn GlobalFilterRegistry<R, S>>>,
        stats: Arc<dyn TopNStats>,
        server_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty(backend_mapper)),
            tracer_factory,
            autocert,
            global_filter_registry,
            stats,
            server_name: server_name.into(),
        }
    }

    /// Builds a new snapshot and atomically publishes it (spec §4.3). Never
    /// fails (spec §7 "Reloads are never fatal"); a stale tracer, if any, is
    /// closed on a detached `tokio` task so publication is never delayed by
    /// it (spec §5 "Suspension and blocking").
    pub fn reload(&self, spec: MuxSpec, backend_mapper: Arc<dyn BackendMapper<R, S>>) {
        let previous = self.snapshot.load_full();
        let (snapshot, stale_tracer) =
            build_snapshot(spec, backend_mapper, self.tracer_factory.as_ref(), Some(previous.as_ref()));
        self.snapshot.store(Arc::new(snapshot));
        log::info!("mux snapshot reloaded");

        if let Some(tracer) = stale_tracer {
            tokio::spawn(async move {
                if let Err(e) = tracer.close() {
                    log::warn!("stale tracer close failed: {e}");
                }
            });
        }
    }

    /// The request entry point (spec §4.2–§4.6).
    pub fn route(&self, request: &mut R, response: &mut S) {
        if is_acme_challenge(request.path()) {
            self.autocert.handle_http01(response, request);
            return;
        }

        let snapshot = self.snapshot.load_full();
        let mut ctx = Context::new(request, response, &snapshot.tracer, self.server_name.clone(), self.stats.clone());

        let host = ctx.request.host().to_string();
        let method = ctx.request.method().to_string();
        let path = ctx.request.path().to_string();
        let ip = ctx.request.real_ip();
        let key = RouteCache::key(&host, &method, &path);

        if let Some(cache) = &snapshot.cache {
            if let Some(entry) = cache.get(&key) {
                self.serve_outcome(&snapshot, &mut ctx, ip, &entry);
                return;
            }
        }

        if !snapshot.global_ip_filter.as_ref().map_or(true, |f| f.allow(ip)) {
            ctx.respond(403);
            return;
        }

        let mut headers_consulted = false;

        for rule in snapshot.rules.iter() {
            if !rule.matches_host(&host) {
                continue;
            }
            if !rule.pass(ip) {
                ctx.respond(403);
                return;
            }

            for path_descriptor in rule.paths.iter() {
                if !path_descriptor.matches_path(&path) {
                    continue;
                }

                if !path_descriptor.matches_method(&method) {
                    let entry = Arc::new(CacheEntry::new(
                        CacheKind::MethodNotAllowed,
                        Some(path_descriptor.clone()),
                        path_descriptor.ip_filter_chain.clone(),
                    ));
                    self.maybe_cache(&snapshot, &key, entry.clone(), !headers_consulted);
                    self.serve_outcome(&snapshot, &mut ctx, ip, &entry);
                    return;
                }

                if !path_descriptor.pass(ip) {
                    ctx.respond(403);
                    return;
                }

                if !path_descriptor.has_headers() {
                    let entry = Arc::new(CacheEntry::new(
                        CacheKind::Match,
                        Some(path_descriptor.clone()),
                        path_descriptor.ip_filter_chain.clone(),
                    ));
                    self.maybe_cache(&snapshot, &key, entry.clone(), !headers_consulted);
                    self.serve_outcome(&snapshot, &mut ctx, ip, &entry);
                    return;
                }

                headers_consulted = true;
                let matched = path_descriptor.matches_headers(|k| ctx.request.header_get(k));
                if matched {
                    // Header-dependent MATCH: never cached (I4), served immediately.
                    self.dispatch_match(&snapshot, &mut ctx, ip, path_descriptor);
                    return;
                }
                // Headers declared but none matched: fall through to the next path.
            }
        }

        let entry = Arc::new(CacheEntry::new(CacheKind::NotFound, None, snapshot.global_ip_filter_chain.clone()));
        self.maybe_cache(&snapshot, &key, entry.clone(), !headers_consulted);
        self.serve_outcome(&snapshot, &mut ctx, ip, &entry);
    }

    fn maybe_cache(&self, snapshot: &Snapshot<R, S>, key: &str, entry: Arc<CacheEntry>, should_cache: bool) {
        if !should_cache {
            return;
        }
        if let Some(cache) = &snapshot.cache {
            if entry.mark_cached() {
                cache.put(key.to_string(), entry);
            }
        }
    }

    /// Serves a cache entry, whether it came from a cache hit or was just
    /// freshly computed (spec §4.5).
    fn serve_outcome(&self, snapshot: &Snapshot<R, S>, ctx: &mut Context<R, S>, ip: IpAddr, entry: &CacheEntry) {
        if let Some(chain) = &entry.ip_filter_chain {
            if !chain.allow(ip) {
                ctx.respond(403);
                return;
            }
        }

        match entry.kind {
            CacheKind::NotFound => ctx.respond(404),
            CacheKind::MethodNotAllowed => ctx.respond(405),
            CacheKind::Match => {
                let path = entry.path.as_ref().expect("MATCH entries always carry a path");
                self.dispatch_match(snapshot, ctx, ip, path);
            }
        }
    }

    fn dispatch_match(&self, snapshot: &Snapshot<R, S>, ctx: &mut Context<R, S>, ip: IpAddr, path: &Arc<PathDescriptor>) {
        let handler = match snapshot.backend_mapper.get_handler(&path.backend) {
            Some(handler) => handler,
            None => {
                ctx.tag("backend-unresolved");
                ctx.respond(503);
                return;
            }
        };

        if snapshot.spec.x_forwarded_for {
            append_x_forwarded_for(ctx.request, ip);
        }

        if let Some(rewritten) = path.rewrite(ctx.request.path()) {
            ctx.request.set_path(rewritten);
        }

        let global_filter = snapshot
            .spec
            .global_filter_name
            .as_deref()
            .and_then(|name| self.global_filter_registry.as_deref().and_then(|r| r.resolve(name)));

        match global_filter {
            Some(filter) => filter.handle(ctx, handler.as_ref()),
            None => handler.handle(ctx),
        }
    }
}
