//! Header matchers attached to a [`super::path::PathDescriptor`] (spec §3,
//! §9 "Header matching semantics"): a matcher fires if the header value is
//! among the enumerated `values` OR matches `regexp`; the matcher list is
//! OR-ed across matchers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declarative form, as it appears in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderMatcherSpec {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub regexp: Option<String>,
}

/// Compiled header matcher.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    key: String,
    values: HashSet<String>,
    regexp: Option<Regex>,
}

impl HeaderMatcher {
    /// Compiles a matcher from its spec. A bad regexp is logged and the
    /// field left `None` (spec I5); matching then falls back to `values`.
    pub fn new(spec: &HeaderMatcherSpec) -> Self {
        let regexp = spec.regexp.as_deref().and_then(|pattern| {
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::error!(
                        "BUG: compile header regexp '{}' for key '{}' failed: {}",
                        pattern,
                        spec.key,
                        e
                    );
                    None
                }
            }
        });

        Self {
            key: spec.key.clone(),
            values: spec.values.iter().cloned().collect(),
            regexp,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True if `value` (the request's header value for `self.key`, or the
    /// empty string if the header is absent) satisfies this matcher.
    pub fn matches(&self, value: &str) -> bool {
        if self.values.contains(value) {
            return true;
        }
        if let Some(re) = &self.regexp {
            return re.is_match(value);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_enumerated_value() {
        let m = HeaderMatcher::new(&HeaderMatcherSpec {
            key: "X-A".into(),
            values: vec!["v1".into(), "v2".into()],
            regexp: None,
        });
        assert!(m.matches("v1"));
        assert!(!m.matches("v3"));
    }

    #[test]
    fn matches_regexp() {
        let m = HeaderMatcher::new(&HeaderMatcherSpec {
            key: "X-A".into(),
            values: vec![],
            regexp: Some("^v[0-9]+$".into()),
        });
        assert!(m.matches("v42"));
        assert!(!m.matches("vX"));
    }

    #[test]
    fn bad_regexp_is_not_fatal_and_disables_regexp_branch() {
        let m = HeaderMatcher::new(&HeaderMatcherSpec {
            key: "X-A".into(),
            values: vec!["ok".into()],
            regexp: Some("(".into()),
        });
        assert!(m.matches("ok"));
        assert!(!m.matches("anything-else"));
    }
}
