//! Demonstration entry point wiring `mux::engine::Engine` into a real
//! `pingora::proxy::http_proxy_service`, grounded on the teacher's
//! `main.rs` + `system::server::init` bootstrap sequence. A production
//! deployment would load `MuxSpec` from a file or control plane and call
//! `Engine::reload` on change; this binary loads one static spec at startup.

use std::sync::Arc;

use mux_core::config::{self, MuxSpec};
use mux_core::mux::autocert::AutocertHandler;
use mux_core::mux::backend::{Handler, StaticBackendMapper};
use mux_core::mux::engine::Engine;
use mux_core::mux::pingora_adapter::{MuxGateway, PingoraRequest, PingoraResponse, StaticUpstreamHandler};
use mux_core::mux::stats::NoopStats;
use mux_core::mux::tracer::{NoopTracer, Tracer, TracerFactory, TracingConfig};
use mux_core::error::MuxError;

use pingora::prelude::*;
use pingora::server::{RunArgs, Server};

/// No ACME collaborator is wired up in the demo; a real deployment would
/// forward to its own ACME HTTP-01 responder here (spec §4.4).
struct UnconfiguredAutocert;

impl AutocertHandler<PingoraRequest, PingoraResponse> for UnconfiguredAutocert {
    fn handle_http01(&self, response: &mut PingoraResponse, _request: &mut PingoraRequest) {
        use mux_core::mux::request::Response;
        response.set_status_code(404);
    }
}

/// Always produces a no-op tracer; a real deployment supplies a factory
/// backed by whatever tracing transport it uses (spec §6 "Tracer factory").
struct NoopTracerFactory;

impl TracerFactory for NoopTracerFactory {
    fn new_tracer(&self, _config: &TracingConfig) -> Result<Arc<dyn Tracer>, MuxError> {
        Ok(Arc::new(NoopTracer))
    }
}

/// One rule, one path, proxying everything to a local backend — just enough
/// to show the engine wired end to end.
fn demo_spec() -> MuxSpec {
    use mux_core::mux::path::PathSpec;
    use mux_core::mux::rule::RuleSpec;

    MuxSpec {
        rules: vec![RuleSpec {
            host: None,
            host_regexp: None,
            ip_filter: None,
            paths: vec![PathSpec {
                backend: "default".into(),
                ..Default::default()
            }],
        }],
        cache_size: 10_000,
        x_forwarded_for: true,
        global_filter_name: None,
        global_ip_filter: None,
        tracing: TracingConfig::default(),
    }
}

fn demo_backend_mapper() -> Arc<StaticBackendMapper<PingoraRequest, PingoraResponse>> {
    let mut mapper = StaticBackendMapper::new();
    let handler: Arc<dyn Handler<PingoraRequest, PingoraResponse>> =
        Arc::new(StaticUpstreamHandler::new("127.0.0.1:8080"));
    mapper.insert("default", handler);
    Arc::new(mapper)
}

fn main() {
    config::init();
    mux_core::logging::init();

    eprintln!("[mux-gateway] starting");

    let backend_mapper = demo_backend_mapper();
    let engine = Arc::new(Engine::new(
        backend_mapper.clone(),
        Arc::new(NoopTracerFactory),
        Arc::new(UnconfiguredAutocert),
        None,
        Arc::new(NoopStats),
        "mux-gateway",
    ));
    engine.reload(demo_spec(), backend_mapper);

    let opt = Some(Opt::default());
    let mut server = Server::new(opt).expect("failed to create pingora server");
    server.bootstrap();

    let mut service = pingora::proxy::http_proxy_service(&server.configuration, MuxGateway::new(engine));
    service.add_tcp("0.0.0.0:8088");

    let services: Vec<Box<dyn pingora::services::Service>> = vec![Box::new(service)];
    server.add_services(services);

    server.run(RunArgs::default());
}
