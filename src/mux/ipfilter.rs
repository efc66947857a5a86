//! IP-based access control: own filters and the composed chains attached to
//! every scope of the routing table (spec §3 invariant I1, §4.1).
//!
//! A [`IpFilter`] is the policy declared directly at one scope (global, rule
//! or path). A [`IpFilterChain`] is the AND-composition of every enclosing
//! scope's own filter plus the scope's own filter, attached to cache entries
//! so a cache hit can re-authorize a request without walking the rule tree
//! again. Two separate filters of one CIDR each do not merge into a single
//! list; the chain keeps each ancestor's own filter distinct, matching
//! `newIPFilterChain` in the Go original this spec was distilled from.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// Declarative form of an IP filter, as it appears in configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IpFilterSpec {
    /// Networks explicitly allowed. Empty means "allow unless denied".
    #[serde(default)]
    pub allow: Vec<String>,
    /// Networks explicitly denied. Checked before `allow`.
    #[serde(default)]
    pub deny: Vec<String>,
}

/// A compiled access-control policy for one scope.
#[derive(Debug, Clone)]
pub struct IpFilter {
    allow: Vec<IpNet>,
    deny: Vec<IpNet>,
}

impl IpFilter {
    /// Compiles a filter from its spec. Unparseable entries are logged and
    /// dropped rather than failing the whole filter (spec I5's "non-fatal,
    /// log and continue" policy applied to access control too).
    pub fn new(spec: &IpFilterSpec) -> Self {
        let allow = compile_nets(&spec.allow, "allow");
        let deny = compile_nets(&spec.deny, "deny");
        Self { allow, deny }
    }

    /// True if `ip` is allowed by this filter alone (own filter semantics,
    /// §4.2 "Global/Rule/Path IP check").
    pub fn allow(&self, ip: IpAddr) -> bool {
        if self.deny.iter().any(|net| net.contains(&ip)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|net| net.contains(&ip))
    }
}

fn compile_nets(entries: &[String], kind: &str) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| match parse_net(entry) {
            Ok(net) => Some(net),
            Err(e) => {
                log::warn!("ip filter: invalid {kind} entry '{entry}': {e}, skipping");
                None
            }
        })
        .collect()
}

fn parse_net(entry: &str) -> Result<IpNet, String> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|e| e.to_string())
}

/// The composition of every ancestor's own filter plus a scope's own filter
/// (spec §4.1). `None` represents the empty chain (allow-all, short-circuit).
#[derive(Debug, Clone, Default)]
pub struct IpFilterChain {
    filters: Arc<Vec<IpFilter>>,
}

impl IpFilterChain {
    /// `chain(scope) = concat(chain(parent), [own(scope) if present])`.
    /// Returns `None` when the resulting chain would have zero members.
    pub fn compose(parent: Option<&IpFilterChain>, own: Option<&IpFilter>) -> Option<IpFilterChain> {
        let mut filters: Vec<IpFilter> = parent
            .map(|p| p.filters.as_ref().clone())
            .unwrap_or_default();
        if let Some(f) = own {
            filters.push(f.clone());
        }
        if filters.is_empty() {
            None
        } else {
            Some(IpFilterChain {
                filters: Arc::new(filters),
            })
        }
    }

    /// A chain allows `ip` iff every member filter allows it.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.filters.iter().all(|f| f.allow(ip))
    }
}
