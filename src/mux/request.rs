//! Request/Response collaborator traits (spec §6) and the per-request
//! [`Context`] (spec §4.6).
//!
//! Both traits are intentionally minimal — exactly the surface the matching
//! algorithm and the cache branch touch — so that unit tests can implement
//! them over a plain struct while `mux::pingora_adapter` implements them
//! over `pingora::http::RequestHeader` / `pingora::proxy::Session` for the
//! real listener.

use std::net::IpAddr;
use std::sync::Arc;

use super::stats::{RequestRecord, TopNStats};
use super::tracer::{Span, Tracer};

pub trait Request {
    fn host(&self) -> &str;
    fn real_ip(&self) -> IpAddr;
    fn method(&self) -> &str;
    fn path(&self) -> &str;
    fn set_path(&mut self, path: String);
    fn header_get(&self, key: &str) -> Option<&str>;
    fn header_add(&mut self, key: &str, value: &str);
    fn header_set(&mut self, key: &str, value: &str);
}

pub trait Response {
    fn set_status_code(&mut self, code: u16);
}

/// Wraps the request/response pair for the duration of one match-and-serve
/// call. A span is opened at construction and finished exactly once, on
/// every exit path, by `Drop` — the Rust realization of the Go original's
/// `defer ctx.Finish()` (spec §4.6).
pub struct Context<'r, R: Request, S: Response> {
    pub request: &'r mut R,
    pub response: &'r mut S,
    span: Box<dyn Span>,
    tracer_operation: &'static str,
    server_name: Arc<str>,
    stats: Arc<dyn TopNStats>,
    status_code: u16,
    tag: Option<&'static str>,
    finished: bool,
}

impl<'r, R: Request, S: Response> Context<'r, R, S> {
    pub fn new(
        request: &'r mut R,
        response: &'r mut S,
        tracer: &Arc<dyn Tracer>,
        server_name: Arc<str>,
        stats: Arc<dyn TopNStats>,
    ) -> Self {
        let span = tracer.start_span("mux.route");
        Self {
            request,
            response,
            span,
            tracer_operation: "mux.route",
            server_name,
            stats,
            status_code: 0,
            tag: None,
            finished: false,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Sets the response status and records it for the eventual stats
    /// report; does not finish the context.
    pub fn respond(&mut self, code: u16) {
        self.status_code = code;
        self.response.set_status_code(code);
    }

    /// Tags the context for observability (spec §7 "Backend unresolved:
    /// tag the request context"). Does not affect matching or caching.
    pub fn tag(&mut self, tag: &'static str) {
        self.tag = Some(tag);
    }

    fn finish_once(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.span.finish();
        self.stats.stat(&RequestRecord {
            host: self.request.host().to_string(),
            method: self.request.method().to_string(),
            path: self.request.path().to_string(),
            status_code: self.status_code,
            tag: self.tag.map(str::to_string),
        });
    }
}

impl<'r, R: Request, S: Response> Drop for Context<'r, R, S> {
    fn drop(&mut self) {
        self.finish_once();
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeRequest, FakeResponse};
    use super::*;
    use crate::mux::stats::NoopStats;
    use crate::mux::tracer::NoopTracer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStats(AtomicUsize);

    impl TopNStats for CountingStats {
        fn stat(&self, _record: &RequestRecord) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn context_finishes_exactly_once_on_drop() {
        let stats = Arc::new(CountingStats(AtomicUsize::new(0)));
        let tracer: Arc<dyn Tracer> = Arc::new(NoopTracer);
        let mut req = FakeRequest {
            host: "a.example".into(),
            method: "GET".into(),
            path: "/x".into(),
            ..Default::default()
        };
        let mut resp = FakeResponse::default();
        {
            let mut ctx = Context::new(&mut req, &mut resp, &tracer, Arc::from("srv"), stats.clone());
            ctx.respond(200);
        }
        assert_eq!(stats.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_finish_then_drop_reports_once() {
        let stats = Arc::new(CountingStats(AtomicUsize::new(0)));
        let tracer: Arc<dyn Tracer> = Arc::new(NoopTracer);
        let mut req = FakeRequest::default();
        let mut resp = FakeResponse::default();
        {
            let mut ctx = Context::new(&mut req, &mut resp, &tracer, Arc::from("srv"), stats.clone());
            ctx.finish_once();
            ctx.finish_once();
        }
        assert_eq!(stats.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_stats_never_panics_on_empty_context() {
        let tracer: Arc<dyn Tracer> = Arc::new(NoopTracer);
        let mut req = FakeRequest::default();
        let mut resp = FakeResponse::default();
        let _ctx = Context::new(&mut req, &mut resp, &tracer, Arc::from("srv"), Arc::new(NoopStats));
    }
}
