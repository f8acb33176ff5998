//! Per-endpoint rate-limit policies and path-pattern matching.
//!
//! Patterns support exact paths, `:param` placeholders, single-segment
//! `*` and multi-segment `**`. The first matching rule wins; unmatched
//! requests fall back to the default policy. Method lists are
//! case-insensitive and an empty list matches every method. Trailing
//! slashes are tolerated on both sides.

use serde::{Deserialize, Serialize};

/// One endpoint rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Methods the rule applies to; empty means all.
    pub methods: Vec<String>,
    /// Path pattern (`/api/v1/bookings`, `/api/v1/events/:id`,
    /// `/api/v1/bookings/*/confirm`, `/api/v1/**`).
    pub pattern: String,
    /// Steady-state requests per second.
    pub rate_per_sec: f64,
    /// Burst capacity.
    pub burst: f64,
}

/// Ordered rule table with a default policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Rules, evaluated in order.
    pub rules: Vec<RatePolicy>,
    /// Fallback requests per second.
    pub default_rate_per_sec: f64,
    /// Fallback burst capacity.
    pub default_burst: f64,
}

impl PolicyTable {
    /// Index of the first rule matching `(method, path)`, or `None` for
    /// the default policy.
    #[must_use]
    pub fn find(&self, method: &str, path: &str) -> Option<usize> {
        self.rules.iter().position(|rule| {
            contains_method(&rule.methods, method) && match_path(&rule.pattern, path)
        })
    }

    /// Rate and burst effective for `(method, path)`.
    #[must_use]
    pub fn effective(&self, method: &str, path: &str) -> (f64, f64) {
        match self.find(method, path) {
            Some(index) => (self.rules[index].rate_per_sec, self.rules[index].burst),
            None => (self.default_rate_per_sec, self.default_burst),
        }
    }

    /// The table shipped by default: the booking write path is far
    /// stricter than catalogue reads.
    #[must_use]
    pub fn booking_defaults(default_rate_per_sec: f64, default_burst: f64) -> Self {
        Self {
            rules: vec![
                RatePolicy {
                    methods: vec!["POST".into()],
                    pattern: "/api/v1/bookings".into(),
                    rate_per_sec: 100.0,
                    burst: 20.0,
                },
                RatePolicy {
                    methods: vec!["POST".into()],
                    pattern: "/api/v1/bookings/*/confirm".into(),
                    rate_per_sec: 200.0,
                    burst: 50.0,
                },
                RatePolicy {
                    methods: vec!["POST".into()],
                    pattern: "/api/v1/bookings/*/cancel".into(),
                    rate_per_sec: 200.0,
                    burst: 50.0,
                },
                RatePolicy {
                    methods: vec!["POST".into()],
                    pattern: "/api/v1/queue/**".into(),
                    rate_per_sec: 500.0,
                    burst: 100.0,
                },
                RatePolicy {
                    methods: vec![],
                    pattern: "/api/v1/events/**".into(),
                    rate_per_sec: 2_000.0,
                    burst: 200.0,
                },
            ],
            default_rate_per_sec,
            default_burst,
        }
    }
}

/// Case-insensitive method match; an empty list matches everything.
#[must_use]
pub fn contains_method(methods: &[String], method: &str) -> bool {
    methods.is_empty() || methods.iter().any(|m| m.eq_ignore_ascii_case(method))
}

/// Match `path` against `pattern` per the rules above.
#[must_use]
pub fn match_path(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut p = 0;
    for segment in &pattern_segments {
        if *segment == "**" {
            return true;
        }
        let Some(actual) = path_segments.get(p) else {
            return false;
        };
        if *segment == "*" || segment.starts_with(':') {
            p += 1;
            continue;
        }
        if segment != actual {
            return false;
        }
        p += 1;
    }
    p == path_segments.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_tolerates_trailing_slash() {
        assert!(match_path("/api/v1/events", "/api/v1/events"));
        assert!(match_path("/api/v1/events", "/api/v1/events/"));
        assert!(match_path("/api/v1/events/", "/api/v1/events"));
        assert!(!match_path("/api/v1/events", "/api/v1/bookings"));
        assert!(!match_path("/api/v2/events", "/api/v1/events"));
    }

    #[test]
    fn single_segment_wildcard() {
        assert!(match_path("/api/v1/events/*", "/api/v1/events/123"));
        assert!(match_path("/api/v1/events/*", "/api/v1/events/test-event"));
        assert!(!match_path("/api/v1/events/*", "/api/v1/events"));
        assert!(!match_path("/api/v1/events/*", "/api/v1/events/123/zones"));
    }

    #[test]
    fn multi_segment_wildcard() {
        assert!(match_path("/api/v1/**", "/api/v1/events"));
        assert!(match_path("/api/v1/**", "/api/v1/events/123"));
        assert!(match_path("/api/v1/**", "/api/v1/events/123/zones"));
        assert!(!match_path("/api/v1/**", "/api/v2/events"));
    }

    #[test]
    fn param_placeholder() {
        assert!(match_path("/api/v1/events/:id", "/api/v1/events/123"));
        assert!(match_path("/api/v1/events/:id", "/api/v1/events/test-event"));
        assert!(match_path("/api/v1/events/:id/zones", "/api/v1/events/123/zones"));
        assert!(!match_path("/api/v1/events/:id", "/api/v1/events"));
    }

    #[test]
    fn mixed_patterns() {
        assert!(match_path("/api/v1/bookings/*/confirm", "/api/v1/bookings/123/confirm"));
        assert!(match_path("/api/v1/bookings/*/confirm", "/api/v1/bookings/abc-def/confirm"));
        assert!(!match_path("/api/v1/bookings/*/confirm", "/api/v1/bookings/123/cancel"));
    }

    #[test]
    fn method_list_semantics() {
        assert!(contains_method(&[], "GET"));
        assert!(contains_method(&[], "POST"));
        assert!(contains_method(&["get".into()], "GET"));
        assert!(contains_method(&["GET".into()], "get"));
        assert!(contains_method(&["GET".into(), "POST".into()], "POST"));
        assert!(!contains_method(&["GET".into()], "POST"));
        assert!(!contains_method(&["GET".into(), "PUT".into()], "POST"));
    }

    #[test]
    fn first_matching_rule_wins_with_default_fallback() {
        let table = PolicyTable {
            rules: vec![
                RatePolicy {
                    methods: vec!["POST".into()],
                    pattern: "/api/v1/bookings".into(),
                    rate_per_sec: 100.0,
                    burst: 20.0,
                },
                RatePolicy {
                    methods: vec!["GET".into()],
                    pattern: "/api/v1/events/*".into(),
                    rate_per_sec: 2_000.0,
                    burst: 200.0,
                },
                RatePolicy {
                    methods: vec![],
                    pattern: "/api/v1/auth/*".into(),
                    rate_per_sec: 20.0,
                    burst: 5.0,
                },
            ],
            default_rate_per_sec: 1_000.0,
            default_burst: 100.0,
        };

        assert_eq!(table.effective("POST", "/api/v1/bookings").0, 100.0);
        assert_eq!(table.effective("GET", "/api/v1/events/123").0, 2_000.0);
        assert_eq!(table.effective("POST", "/api/v1/auth/login").0, 20.0);
        assert_eq!(table.effective("GET", "/api/v1/auth/refresh").0, 20.0);
        // Method mismatch falls through to the default.
        assert_eq!(table.effective("GET", "/api/v1/bookings").0, 1_000.0);
        assert_eq!(table.effective("GET", "/api/v1/users").0, 1_000.0);
        assert_eq!(table.effective("POST", "/api/v1/unknown").0, 1_000.0);
    }
}
