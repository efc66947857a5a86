//! Rule descriptor: a host-scoped, ordered list of path descriptors (spec
//! §3 "Rule descriptor", §4.2 "Host match"/"Rule IP check").

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ipfilter::{IpFilter, IpFilterChain, IpFilterSpec};
use super::path::{PathDescriptor, PathSpec};

/// Declarative form of a rule, as it appears in configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub host_regexp: Option<String>,
    #[serde(default)]
    pub ip_filter: Option<IpFilterSpec>,
    pub paths: Vec<PathSpec>,
}

/// Compiled, immutable rule descriptor.
pub struct RuleDescriptor {
    pub host: Option<String>,
    pub host_regexp: Option<Regex>,
    pub ip_filter: Option<IpFilter>,
    pub ip_filter_chain: Option<IpFilterChain>,
    /// `Arc`-wrapped so a matched path can be attached to a `CacheEntry`
    /// without cloning the whole descriptor (spec §3 "Cache entry... path_ref").
    pub paths: Vec<Arc<PathDescriptor>>,
}

impl RuleDescriptor {
    /// Builds a rule, composing `parent_chain` (the global chain) with this
    /// rule's own filter, and that composed chain is what each contained
    /// path is built against (spec §4.3 "Given the parent ipFilters not its
    /// own").
    pub fn new(spec: &RuleSpec, parent_chain: Option<&IpFilterChain>) -> Self {
        let host_regexp = spec.host_regexp.as_deref().and_then(|pattern| {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::error!("BUG: compile host regexp '{}' failed: {}", pattern, e);
                    None
                }
            }
        });

        let ip_filter = spec.ip_filter.as_ref().map(IpFilter::new);
        let ip_filter_chain = IpFilterChain::compose(parent_chain, ip_filter.as_ref());

        let paths = spec
            .paths
            .iter()
            .map(|p| Arc::new(PathDescriptor::new(p, ip_filter_chain.as_ref())))
            .collect();

        Self {
            host: spec.host.clone(),
            host_regexp,
            ip_filter,
            ip_filter_chain,
            paths,
        }
    }

    /// Own-filter check used during first-pass matching (spec §4.2 "Rule IP
    /// check").
    pub fn pass(&self, ip: std::net::IpAddr) -> bool {
        self.ip_filter.as_ref().map_or(true, |f| f.allow(ip))
    }

    /// Host match: wildcard (no host/host_regexp), exact match on the
    /// port-stripped host, or regexp match (spec §4.2 "Host match").
    pub fn matches_host(&self, host: &str) -> bool {
        if self.host.is_none() && self.host_regexp.is_none() {
            return true;
        }
        let host = strip_port(host);
        if let Some(h) = &self.host {
            if h == host {
                return true;
            }
        }
        if let Some(re) = &self.host_regexp {
            return re.is_match(host);
        }
        false
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(idx) = host.rfind(':') {
        // Guard against bare IPv6 literals like "::1" with no port.
        if !host[idx + 1..].is_empty() && host[idx + 1..].chars().all(|c| c.is_ascii_digit()) {
            return &host[..idx];
        }
    }
    host
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(spec: RuleSpec) -> RuleDescriptor {
        RuleDescriptor::new(&spec, None)
    }

    #[test]
    fn wildcard_rule_matches_any_host() {
        let r = rule(RuleSpec {
            paths: vec![],
            ..Default::default()
        });
        assert!(r.matches_host("a.example:8080"));
    }

    #[test]
    fn exact_host_match_strips_port() {
        let r = rule(RuleSpec {
            host: Some("a.example".into()),
            paths: vec![],
            ..Default::default()
        });
        assert!(r.matches_host("a.example:8080"));
        assert!(r.matches_host("a.example"));
        assert!(!r.matches_host("b.example:8080"));
    }

    #[test]
    fn host_regexp_match() {
        let r = rule(RuleSpec {
            host_regexp: Some("^.*\\.example$".into()),
            paths: vec![],
            ..Default::default()
        });
        assert!(r.matches_host("sub.example"));
        assert!(!r.matches_host("sub.other"));
    }

    #[test]
    fn strip_port_leaves_ipv6_literal_untouched() {
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
