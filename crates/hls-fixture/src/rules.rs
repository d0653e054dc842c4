//! Per-route response rules.
//!
//! Rule options are plain data ([`SuccessRules`], [`RedirectRules`],
//! [`FailRules`]). Storing them in a [`RuleStore`] validates and compiles
//! them into a [`Rule`], so a bad header or status code is reported when the
//! test configures it instead of when a client requests the route.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{FixtureError, Result};
use crate::paths::route_from_path;
use crate::throttle::ThrottleRate;

/// Options for a route that serves its file, optionally throttled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessRules {
    pub headers: BTreeMap<String, String>,
    /// Spread the body over this many milliseconds. Wins over
    /// `response_bits_per_sec` when both are set.
    pub response_time_ms: Option<u64>,
    pub response_bits_per_sec: Option<u64>,
}

/// Options for a route that redirects instead of serving its file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectRules {
    /// Redirect status, 302 when unset.
    pub code: Option<u16>,
    pub headers: BTreeMap<String, String>,
    /// An absolute URL, a route, or a path relative to the base directory.
    pub location: String,
}

/// Options for a route that fails instead of serving its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailRules {
    pub status_code: u16,
    pub status_message: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub error_body: Option<Bytes>,
}

impl Default for FailRules {
    fn default() -> Self {
        Self {
            status_code: 500,
            status_message: None,
            headers: BTreeMap::new(),
            error_body: None,
        }
    }
}

/// Validated rule attached to a route.
#[derive(Debug, Clone)]
pub enum Rule {
    Succeed(SuccessRule),
    Redirect(RedirectRule),
    Fail(FailRule),
}

#[derive(Debug, Clone)]
pub struct SuccessRule {
    pub headers: HeaderMap,
    pub throttle: Option<ThrottleRate>,
}

impl SuccessRule {
    /// Whether the headers already pin a `Content-Type`.
    pub fn has_content_type(&self) -> bool {
        self.headers.contains_key(CONTENT_TYPE)
    }
}

#[derive(Debug, Clone)]
pub struct RedirectRule {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub location: HeaderValue,
}

#[derive(Debug, Clone)]
pub struct FailRule {
    pub status: StatusCode,
    pub reason: Option<ReasonPhrase>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// What to do with a request for a route.
#[derive(Debug, Clone)]
pub enum RouteBehavior {
    /// No rule configured: serve the file as is.
    ServeFile,
    Rule(Rule),
}

impl SuccessRules {
    fn compile(self, route: &str) -> Result<SuccessRule> {
        if self.response_time_ms == Some(0) {
            return Err(FixtureError::configuration(
                route,
                "response_time_ms must be greater than zero",
            ));
        }
        if self.response_bits_per_sec == Some(0) {
            return Err(FixtureError::configuration(
                route,
                "response_bits_per_sec must be greater than zero",
            ));
        }
        let throttle = match (self.response_time_ms, self.response_bits_per_sec) {
            (Some(ms), _) => Some(ThrottleRate::ResponseTime(Duration::from_millis(ms))),
            (None, Some(bits)) => Some(ThrottleRate::BitsPerSecond(bits)),
            (None, None) => None,
        };
        Ok(SuccessRule {
            headers: header_map(route, &self.headers)?,
            throttle,
        })
    }
}

impl RedirectRules {
    fn compile(self, route: &str) -> Result<RedirectRule> {
        let status = status_code(route, self.code.unwrap_or(302))?;
        if !status.is_redirection() {
            return Err(FixtureError::configuration(
                route,
                format!("redirect code {status} is not a 3xx status"),
            ));
        }
        let location = redirect_location(&self.location);
        let location = HeaderValue::from_str(&location).map_err(|_| {
            FixtureError::configuration(route, format!("invalid redirect location `{location}`"))
        })?;
        Ok(RedirectRule {
            status,
            headers: header_map(route, &self.headers)?,
            location,
        })
    }
}

impl FailRules {
    fn compile(self, route: &str) -> Result<FailRule> {
        let status = status_code(route, self.status_code)?;
        let reason = self
            .status_message
            .filter(|message| !message.is_empty())
            .map(|message| {
                ReasonPhrase::try_from(message.clone()).map_err(|_| {
                    FixtureError::configuration(route, format!("invalid status message `{message}`"))
                })
            })
            .transpose()?;
        Ok(FailRule {
            status,
            reason,
            headers: header_map(route, &self.headers)?,
            body: self.error_body,
        })
    }
}

/// `Location` value for a redirect: absolute URLs and rooted paths verbatim,
/// anything else prefixed with `/`.
pub fn redirect_location(location: &str) -> String {
    if url::Url::parse(location).is_ok() || location.starts_with('/') {
        location.to_string()
    } else {
        format!("/{location}")
    }
}

fn status_code(route: &str, code: u16) -> Result<StatusCode> {
    StatusCode::from_u16(code)
        .map_err(|_| FixtureError::configuration(route, format!("invalid status code {code}")))
}

fn header_map(route: &str, headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            FixtureError::configuration(route, format!("invalid header name `{name}`"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            FixtureError::configuration(route, format!("invalid value for header `{name}`"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Route → rule table. Setting a rule replaces whatever the route had.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<HashMap<String, Rule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&self, route: &str, rules: SuccessRules) -> Result<String> {
        let route = route_from_path(route);
        let rule = Rule::Succeed(rules.compile(&route)?);
        Ok(self.insert(route, rule))
    }

    pub fn redirect(&self, route: &str, rules: RedirectRules) -> Result<String> {
        let route = route_from_path(route);
        let rule = Rule::Redirect(rules.compile(&route)?);
        Ok(self.insert(route, rule))
    }

    pub fn fail(&self, route: &str, rules: FailRules) -> Result<String> {
        let route = route_from_path(route);
        let rule = Rule::Fail(rules.compile(&route)?);
        Ok(self.insert(route, rule))
    }

    /// Drops the rule for `route`, returning whether one was set.
    pub fn remove(&self, route: &str) -> bool {
        let route = route_from_path(route);
        let removed = self.rules.write().remove(&route).is_some();
        if removed {
            debug!(route = %route, "Removed rule");
        }
        removed
    }

    pub fn clear(&self) {
        self.rules.write().clear();
    }

    /// Snapshot of the behavior for `route` at this moment.
    pub fn resolve(&self, route: &str) -> RouteBehavior {
        match self.rules.read().get(route) {
            Some(rule) => RouteBehavior::Rule(rule.clone()),
            None => RouteBehavior::ServeFile,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    fn insert(&self, route: String, rule: Rule) -> String {
        debug!(route = %route, rule = ?rule, "Set rule");
        self.rules.write().insert(route.clone(), rule);
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unknown_route_serves_the_file() {
        let store = RuleStore::new();
        assert!(matches!(store.resolve("/a.ts"), RouteBehavior::ServeFile));
    }

    #[test]
    fn last_rule_wins() {
        let store = RuleStore::new();
        store
            .fail("/a.ts", FailRules { status_code: 503, ..Default::default() })
            .unwrap();
        store
            .redirect(
                "/a.ts",
                RedirectRules {
                    location: "b.ts".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(store.len(), 1);
        match store.resolve("/a.ts") {
            RouteBehavior::Rule(Rule::Redirect(rule)) => {
                assert_eq!(rule.status, StatusCode::FOUND);
                assert_eq!(rule.location, "/b.ts");
            }
            other => panic!("unexpected behavior: {other:?}"),
        }

        assert!(store.remove("a.ts"));
        assert!(matches!(store.resolve("/a.ts"), RouteBehavior::ServeFile));
        assert!(!store.remove("/a.ts"));
    }

    #[test]
    fn routes_are_normalized() {
        let store = RuleStore::new();
        let route = store.succeed("live/0.ts", SuccessRules::default()).unwrap();
        assert_eq!(route, "/live/0.ts");
        assert!(matches!(
            store.resolve("/live/0.ts"),
            RouteBehavior::Rule(Rule::Succeed(_))
        ));
    }

    #[test]
    fn response_time_takes_precedence_over_bitrate() {
        let store = RuleStore::new();
        store
            .succeed(
                "/a.ts",
                SuccessRules {
                    response_time_ms: Some(1500),
                    response_bits_per_sec: Some(8000),
                    ..Default::default()
                },
            )
            .unwrap();
        let RouteBehavior::Rule(Rule::Succeed(rule)) = store.resolve("/a.ts") else {
            panic!("expected a success rule");
        };
        assert_eq!(
            rule.throttle,
            Some(ThrottleRate::ResponseTime(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn success_headers_detect_content_type_override() {
        let store = RuleStore::new();
        store
            .succeed(
                "/a.ts",
                SuccessRules {
                    headers: headers(&[("content-TYPE", "text/plain"), ("X-CDN", "edge")]),
                    ..Default::default()
                },
            )
            .unwrap();
        let RouteBehavior::Rule(Rule::Succeed(rule)) = store.resolve("/a.ts") else {
            panic!("expected a success rule");
        };
        assert!(rule.has_content_type());
        assert_eq!(rule.headers.get("x-cdn").unwrap(), "edge");
        assert!(rule.throttle.is_none());
    }

    #[test]
    fn nonsensical_rules_are_rejected_up_front() {
        let store = RuleStore::new();

        let zero_time = SuccessRules {
            response_time_ms: Some(0),
            ..Default::default()
        };
        assert!(store.succeed("/a.ts", zero_time).unwrap_err().is_configuration());

        let zero_rate = SuccessRules {
            response_bits_per_sec: Some(0),
            ..Default::default()
        };
        assert!(store.succeed("/a.ts", zero_rate).is_err());

        let bad_header = SuccessRules {
            headers: headers(&[("bad header", "x")]),
            ..Default::default()
        };
        assert!(store.succeed("/a.ts", bad_header).is_err());

        let not_a_redirect = RedirectRules {
            code: Some(200),
            location: "/b.ts".into(),
            ..Default::default()
        };
        assert!(store.redirect("/a.ts", not_a_redirect).is_err());

        let bad_status = FailRules {
            status_code: 42,
            ..Default::default()
        };
        assert!(store.fail("/a.ts", bad_status).is_err());

        let bad_reason = FailRules {
            status_message: Some("line\nbreak".into()),
            ..Default::default()
        };
        assert!(store.fail("/a.ts", bad_reason).is_err());

        assert!(store.is_empty());
    }

    #[test]
    fn fail_rule_keeps_reason_and_body() {
        let store = RuleStore::new();
        store
            .fail(
                "/a.ts",
                FailRules {
                    status_code: 404,
                    status_message: Some("Gone Fishing".into()),
                    error_body: Some(Bytes::from_static(b"nope")),
                    ..Default::default()
                },
            )
            .unwrap();
        let RouteBehavior::Rule(Rule::Fail(rule)) = store.resolve("/a.ts") else {
            panic!("expected a fail rule");
        };
        assert_eq!(rule.status, StatusCode::NOT_FOUND);
        assert_eq!(rule.reason.unwrap().as_bytes(), b"Gone Fishing");
        assert_eq!(rule.body.unwrap(), Bytes::from_static(b"nope"));
    }

    #[test]
    fn redirect_locations() {
        assert_eq!(
            redirect_location("https://cdn.example.com/a.ts"),
            "https://cdn.example.com/a.ts"
        );
        assert_eq!(redirect_location("b.ts"), "/b.ts");
        assert_eq!(redirect_location("/live/b.ts"), "/live/b.ts");
        // scheme-relative locations keep pointing at the other host
        assert_eq!(
            redirect_location("//cdn.example.com/a.ts"),
            "//cdn.example.com/a.ts"
        );
        assert_eq!(redirect_location("/a//b"), "/a//b");
    }
}
