//! ACME HTTP-01 handoff collaborator (spec §4.4, §6 "Autocert handler").
//!
//! Checked by [`super::engine::Engine::route`] before any snapshot is loaded
//! or request context constructed — the port-80 listener may be shared
//! across virtual hosts, and only this collaborator knows which host owns a
//! given challenge token.

use super::request::{Request, Response};

pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

pub trait AutocertHandler<R: Request, S: Response>: Send + Sync {
    fn handle_http01(&self, response: &mut S, request: &mut R);
}

/// True if `path` should be handed to the autocert collaborator instead of
/// being routed (spec §4.4).
pub fn is_acme_challenge(path: &str) -> bool {
    path.starts_with(ACME_CHALLENGE_PREFIX)
}
