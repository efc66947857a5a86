//! Global filter collaborator (spec §6 "Global filter registry", §4.5
//! step (iv)): an optional middleware wrapped around every matched handler
//! invocation, resolved by name from the snapshot's spec.

use super::backend::Handler;
use super::request::{Context, Request, Response};

/// Middleware invoked around a matched handler, e.g. auth or rate limiting
/// applied uniformly regardless of which backend was selected.
pub trait GlobalFilter<R: Request, S: Response>: Send + Sync {
    fn handle(&self, ctx: &mut Context<R, S>, inner: &dyn Handler<R, S>);
}

/// Resolves a named global filter. Mirrors the Go original's two-step
/// `get_business_controller(name) -> controller`, `controller.instance() ->
/// GlobalFilter?` (a controller can exist but carry no filter instance).
pub trait GlobalFilterRegistry<R: Request, S: Response>: Send + Sync {
    fn resolve(&self, name: &str) -> Option<&dyn GlobalFilter<R, S>>;
}
