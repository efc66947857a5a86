//! Path descriptor: one `(path, method, headers, rewrite, backend)` matching
//! specification (spec §3 "Path descriptor", §4.2 steps "Path match" through
//! "Header match").

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::header::{HeaderMatcher, HeaderMatcherSpec};
use super::ipfilter::{IpFilter, IpFilterChain, IpFilterSpec};

/// Declarative form of a path descriptor, as it appears in configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathSpec {
    #[serde(default)]
    pub exact_path: Option<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub path_regexp: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: Vec<HeaderMatcherSpec>,
    #[serde(default)]
    pub rewrite_target: Option<String>,
    pub backend: String,
    #[serde(default)]
    pub ip_filter: Option<IpFilterSpec>,
}

/// Compiled, immutable path descriptor. Lives as long as the snapshot that
/// contains it.
#[derive(Debug)]
pub struct PathDescriptor {
    pub exact_path: Option<String>,
    pub path_prefix: Option<String>,
    pub path_regexp: Option<Regex>,
    pub methods: HashSet<String>,
    pub headers: Vec<HeaderMatcher>,
    pub rewrite_target: Option<String>,
    pub backend: String,
    pub ip_filter: Option<IpFilter>,
    pub ip_filter_chain: Option<IpFilterChain>,
}

impl PathDescriptor {
    /// Builds a descriptor, composing `parent_chain` (the enclosing rule's
    /// chain) with this path's own filter (spec I1).
    pub fn new(spec: &PathSpec, parent_chain: Option<&IpFilterChain>) -> Self {
        let path_regexp = spec.path_regexp.as_deref().and_then(|pattern| {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::error!("BUG: compile path regexp '{}' failed: {}", pattern, e);
                    None
                }
            }
        });

        let ip_filter = spec.ip_filter.as_ref().map(IpFilter::new);
        let ip_filter_chain = IpFilterChain::compose(parent_chain, ip_filter.as_ref());

        Self {
            exact_path: spec.exact_path.clone(),
            path_prefix: spec.path_prefix.clone(),
            path_regexp,
            methods: spec.methods.iter().cloned().collect(),
            headers: spec.headers.iter().map(HeaderMatcher::new).collect(),
            rewrite_target: spec.rewrite_target.clone(),
            backend: spec.backend.clone(),
            ip_filter,
            ip_filter_chain,
        }
    }

    /// Own-filter check used during first-pass matching (spec §4.2 "Path IP
    /// check"). A path with no own filter always passes.
    pub fn pass(&self, ip: std::net::IpAddr) -> bool {
        self.ip_filter.as_ref().map_or(true, |f| f.allow(ip))
    }

    /// Path match: no predicates (wildcard), or exact, or prefix, or
    /// regexp, tried in that order; first success wins (spec §4.2).
    pub fn matches_path(&self, path: &str) -> bool {
        if self.exact_path.is_none() && self.path_prefix.is_none() && self.path_regexp.is_none() {
            return true;
        }
        if let Some(exact) = &self.exact_path {
            if exact == path {
                return true;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if path.starts_with(prefix.as_str()) {
                return true;
            }
        }
        if let Some(re) = &self.path_regexp {
            return re.is_match(path);
        }
        false
    }

    /// Method check: an empty method set matches any method (spec §3).
    pub fn matches_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn has_headers(&self) -> bool {
        !self.headers.is_empty()
    }

    /// OR across all declared header matchers (spec §9).
    pub fn matches_headers<'a>(&self, header_get: impl Fn(&str) -> Option<&'a str>) -> bool {
        self.headers
            .iter()
            .any(|m| matches_one(m, header_get(m.key())))
    }

    /// If `path_regexp` is set and `rewrite_target` is non-empty, returns the
    /// rewritten path (spec P5), replacing every non-overlapping match and
    /// leaving the rest of the path untouched — matching the Go original's
    /// `regexp.ReplaceAllString` semantics; otherwise `None`.
    pub fn rewrite(&self, original_path: &str) -> Option<String> {
        let re = self.path_regexp.as_ref()?;
        let target = self.rewrite_target.as_deref().filter(|t| !t.is_empty())?;
        if !re.is_match(original_path) {
            return None;
        }
        Some(re.replace_all(original_path, target).into_owned())
    }
}

fn matches_one(m: &HeaderMatcher, value: Option<&str>) -> bool {
    m.matches(value.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(spec: PathSpec) -> PathDescriptor {
        PathDescriptor::new(&spec, None)
    }

    #[test]
    fn wildcard_path_matches_everything() {
        let p = descriptor(PathSpec {
            backend: "b".into(),
            ..Default::default()
        });
        assert!(p.matches_path("/anything"));
    }

    #[test]
    fn exact_path_takes_precedence_order() {
        let p = descriptor(PathSpec {
            exact_path: Some("/x".into()),
            path_prefix: Some("/".into()),
            backend: "b".into(),
            ..Default::default()
        });
        assert!(p.matches_path("/x"));
        assert!(p.matches_path("/y")); // falls through to prefix "/"
        assert!(!descriptor(PathSpec {
            exact_path: Some("/x".into()),
            backend: "b".into(),
            ..Default::default()
        })
        .matches_path("/y"));
    }

    #[test]
    fn empty_methods_means_any() {
        let p = descriptor(PathSpec {
            backend: "b".into(),
            ..Default::default()
        });
        assert!(p.matches_method("GET"));
        assert!(p.matches_method("DELETE"));
    }

    #[test]
    fn declared_methods_are_exclusive() {
        let p = descriptor(PathSpec {
            methods: vec!["GET".into()],
            backend: "b".into(),
            ..Default::default()
        });
        assert!(p.matches_method("GET"));
        assert!(!p.matches_method("POST"));
    }

    #[test]
    fn rewrite_uses_captures_and_template() {
        let p = descriptor(PathSpec {
            path_regexp: Some("^/api/(.*)$".into()),
            rewrite_target: Some("/v2/api/$1".into()),
            backend: "b".into(),
            ..Default::default()
        });
        assert_eq!(p.rewrite("/api/users").as_deref(), Some("/v2/api/users"));
    }

    #[test]
    fn rewrite_with_unanchored_pattern_preserves_surrounding_text() {
        let p = descriptor(PathSpec {
            path_regexp: Some("users".into()),
            rewrite_target: Some("userz".into()),
            backend: "b".into(),
            ..Default::default()
        });
        assert_eq!(p.rewrite("/api/users/1").as_deref(), Some("/api/userz/1"));
    }

    #[test]
    fn no_rewrite_without_regexp_or_target() {
        let p = descriptor(PathSpec {
            exact_path: Some("/x".into()),
            backend: "b".into(),
            ..Default::default()
        });
        assert!(p.rewrite("/x").is_none());
    }

    #[test]
    fn header_matchers_are_ored() {
        let p = descriptor(PathSpec {
            exact_path: Some("/x".into()),
            backend: "b".into(),
            headers: vec![HeaderMatcherSpec {
                key: "X-A".into(),
                values: vec!["v1".into()],
                regexp: None,
            }],
            ..Default::default()
        });
        assert!(p.has_headers());
        assert!(p.matches_headers(|k| if k == "X-A" { Some("v1") } else { None }));
        assert!(!p.matches_headers(|_| None));
    }
}
