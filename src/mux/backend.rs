//! The backend mapper collaborator (spec §6 "Backend mapper"): a
//! name→handler registry the mux consults but never implements.

use std::collections::HashMap;
use std::sync::Arc;

use super::request::{Context, Request, Response};

/// An invocable backend. Implemented by whatever actually proxies the
/// request upstream — entirely outside the mux's concern.
pub trait Handler<R: Request, S: Response>: Send + Sync {
    fn handle(&self, ctx: &mut Context<R, S>);
}

/// Name → [`Handler`] lookup, owned by a [`super::snapshot::Snapshot`].
/// "Not a dynamic-dispatch inheritance relationship" (spec §9) — just a map.
pub trait BackendMapper<R: Request, S: Response>: Send + Sync {
    fn get_handler(&self, name: &str) -> Option<Arc<dyn Handler<R, S>>>;
}

/// A mapper backed by a plain `HashMap`, sufficient for the demo binary and
/// for tests; real deployments may supply a mapper backed by whatever
/// registry the host application already has.
pub struct StaticBackendMapper<R: Request, S: Response> {
    handlers: HashMap<String, Arc<dyn Handler<R, S>>>,
}

impl<R: Request, S: Response> Default for StaticBackendMapper<R, S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<R: Request, S: Response> StaticBackendMapper<R, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn Handler<R, S>>) {
        self.handlers.insert(name.into(), handler);
    }
}

impl<R: Request, S: Response> BackendMapper<R, S> for StaticBackendMapper<R, S> {
    fn get_handler(&self, name: &str) -> Option<Arc<dyn Handler<R, S>>> {
        self.handlers.get(name).cloned()
    }
}
