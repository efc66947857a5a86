//! Wires `mux::engine::Engine` to a real `pingora::proxy::Session`, the way
//! the teacher's `GatewayApp` wraps `Session` directly in
//! `app/gateway_fast.rs`. Gated behind the `pingora-adapter` feature so the
//! mux core can be unit tested without the `pingora` dependency at all.
//!
//! `PingoraRequest`/`PingoraResponse` are owned snapshots of the parts of a
//! `Session` the mux touches, copied out before `route()` runs and copied
//! back afterward. This keeps `Engine<R, S>` free of any lifetime parameter
//! (`Session` itself is borrowed for the whole request, which a generic
//! `Engine` instantiated once per `MuxGateway` cannot also borrow from).

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use pingora::http::ResponseHeader;
use pingora::prelude::*;
use pingora::proxy::{ProxyHttp, Session};

use crate::mux::backend::Handler;
use crate::mux::engine::Engine;
use crate::mux::request::{Context, Request, Response};

/// `Request` realized as an owned copy of a `pingora::http::RequestHeader`,
/// reconciled back onto the real header after routing.
pub struct PingoraRequest {
    host: String,
    ip: IpAddr,
    method: String,
    path: String,
    headers: HashMap<String, String>,
    touched_headers: HashSet<String>,
    upstream: Option<String>,
}

impl PingoraRequest {
    /// Copies the fields the mux needs out of a live request header.
    pub fn capture(header: &pingora::http::RequestHeader, ip: IpAddr) -> Self {
        let host = header
            .headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| header.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
            .to_string();

        let headers = header
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            host,
            ip,
            method: header.method.as_str().to_string(),
            path: header.uri.path().to_string(),
            headers,
            touched_headers: HashSet::new(),
            upstream: None,
        }
    }

    /// Records the upstream address a [`Handler`] resolved for this
    /// request. Not part of the `Request` trait — handlers written against
    /// this adapter reach it as an inherent method on the concrete type.
    pub fn set_upstream(&mut self, addr: impl Into<String>) {
        self.upstream = Some(addr.into());
    }

    pub fn into_upstream(self) -> Option<String> {
        self.upstream
    }

    pub fn path_was_rewritten(&self, original_path: &str) -> Option<&str> {
        (self.path != original_path).then_some(self.path.as_str())
    }

    /// Headers that a backend handler or the mux itself (e.g. the
    /// X-Forwarded-For append) changed during routing, to be reconciled
    /// onto the live `Session` header.
    pub fn touched_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.touched_headers
            .iter()
            .filter_map(|key| self.headers.get(key).map(|v| (key.as_str(), v.as_str())))
    }
}

impl Request for PingoraRequest {
    fn host(&self) -> &str {
        &self.host
    }

    fn real_ip(&self) -> IpAddr {
        self.ip
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn set_path(&mut self, path: String) {
        self.path = path;
    }

    fn header_get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    fn header_add(&mut self, key: &str, value: &str) {
        match self.headers.get_mut(key) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => {
                self.headers.insert(key.to_string(), value.to_string());
            }
        }
        self.touched_headers.insert(key.to_string());
    }

    fn header_set(&mut self, key: &str, value: &str) {
        self.headers.insert(key.to_string(), value.to_string());
        self.touched_headers.insert(key.to_string());
    }
}

/// `Response` realized as a pending status code; the adapter turns a
/// non-zero code into a real `ResponseHeader` written to the session once
/// the mux has finished routing.
#[derive(Default)]
pub struct PingoraResponse {
    status_code: u16,
}

impl PingoraResponse {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl Response for PingoraResponse {
    fn set_status_code(&mut self, code: u16) {
        self.status_code = code;
    }
}

/// A `Handler` that proxies to a fixed upstream address, resolved once at
/// construction. Sufficient for the demo binary; real deployments supply a
/// richer `BackendMapper`.
pub struct StaticUpstreamHandler {
    addr: String,
}

impl StaticUpstreamHandler {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Handler<PingoraRequest, PingoraResponse> for StaticUpstreamHandler {
    fn handle(&self, ctx: &mut Context<PingoraRequest, PingoraResponse>) {
        ctx.request.set_upstream(self.addr.clone());
    }
}

/// Per-request pingora context: the upstream address the mux resolved
/// (`None` means the mux already produced a terminal response).
#[derive(Default)]
pub struct GatewayCtx {
    upstream: Option<String>,
}

/// The `pingora::proxy::ProxyHttp` implementation that drives the mux,
/// grounded on the teacher's `GatewayApp` in `app/gateway_fast.rs`.
pub struct MuxGateway {
    engine: Arc<Engine<PingoraRequest, PingoraResponse>>,
}

impl MuxGateway {
    pub fn new(engine: Arc<Engine<PingoraRequest, PingoraResponse>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ProxyHttp for MuxGateway {
    type CTX = GatewayCtx;

    fn new_ctx(&self) -> Self::CTX {
        GatewayCtx::default()
    }

    async fn proxy_upstream_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool>
    where
        Self::CTX: Send + Sync,
    {
        let client_ip = session
            .client_addr()
            .and_then(|a| a.as_inet())
            .map(SocketAddr::ip)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let original_path = session.req_header().uri.path().to_string();
        let mut request = PingoraRequest::capture(session.req_header(), client_ip);
        let mut response = PingoraResponse::default();
        self.engine.route(&mut request, &mut response);

        let touched: Vec<(String, String)> = request
            .touched_headers()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rewritten_path = request.path_was_rewritten(&original_path).map(str::to_string);

        if let Some(rewritten) = rewritten_path {
            let header = session.req_header_mut();
            let mut parts = header.uri.clone().into_parts();
            let query = header.uri.query().map(|q| format!("?{q}")).unwrap_or_default();
            if let Ok(path_and_query) = format!("{rewritten}{query}").parse() {
                parts.path_and_query = Some(path_and_query);
                if let Ok(new_uri) = http::Uri::from_parts(parts) {
                    header.set_uri(new_uri);
                }
            }
        }

        for (key, value) in touched {
            let _ = session.req_header_mut().insert_header(key, value);
        }

        if response.status_code() != 0 {
            let mut header = ResponseHeader::build(response.status_code(), None)?;
            header.insert_header("Content-Length", "0")?;
            session.write_response_header(Box::new(header), true).await?;
            return Ok(true);
        }

        ctx.upstream = request.into_upstream();
        Ok(false)
    }

    async fn upstream_peer(&self, _session: &mut Session, ctx: &mut Self::CTX) -> Result<Box<HttpPeer>> {
        let addr = ctx
            .upstream
            .clone()
            .ok_or_else(|| Error::explain(ErrorType::HTTPStatus(503), "mux produced no upstream"))?;
        Ok(Box::new(HttpPeer::new(addr, false, String::new())))
    }
}
