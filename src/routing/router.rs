//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store static routes by normalized path and dynamic routes in order
//! - Resolve `(path, method, ajax)` to a route or an error route
//! - Create the per-request message bus
//!
//! # Design Decisions
//! - Static lookup first, O(1); dynamic patterns scanned in declaration order
//! - Resolution never fails: every failure maps to an `/error_XXX` route
//! - Each pattern match is timed; a slow match counts as a miss
//! - Tables are read-only while serving; the last resolution is mirrored in a
//!   lock-free slot for diagnostics

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use axum::http::Method;
use serde::Serialize;
use thiserror::Error;

use crate::bus::MessageBus;
use crate::config::RouteConfig;
use crate::http::request::RequestInfo;
use crate::observability::metrics;
use crate::routing::pattern::{self, CompiledPattern, PatternError, MAX_PATH_SEGMENTS};
use crate::routing::route::{ErrorRoute, HandlerRef, Route};

pub const MAX_URI_LENGTH: usize = 2048;

/// Default per-pattern time budget; a match taking at least this long is
/// treated as a potential ReDoS and skipped.
pub const MATCH_BUDGET: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteRegistrationError {
    #[error("route `{path}`: unsupported http method `{method}`")]
    Method { path: String, method: String },

    #[error("route `{path}`: {source}")]
    Pattern {
        path: String,
        #[source]
        source: PatternError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub static_routes: usize,
    pub dynamic_routes: usize,
    pub rejected_routes: usize,
}

/// Route tables built from configuration.
pub struct Router {
    static_routes: HashMap<String, Route>,
    dynamic_routes: Vec<(CompiledPattern, Route)>,
    rejected: usize,
    match_budget: Duration,
    current: ArcSwapOption<Route>,
}

impl Router {
    /// Build the tables from the ordered route list.
    ///
    /// Invalid entries are logged and skipped; any error route the list does
    /// not declare is installed afterwards.
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut router = Self {
            static_routes: HashMap::new(),
            dynamic_routes: Vec::new(),
            rejected: 0,
            match_budget: MATCH_BUDGET,
            current: ArcSwapOption::empty(),
        };

        for entry in routes {
            if let Err(e) = router.register(entry) {
                tracing::warn!(error = %e, "Skipping route");
                router.rejected += 1;
            }
        }

        for kind in ErrorRoute::ALL {
            router
                .static_routes
                .entry(kind.path().to_string())
                .or_insert_with(|| Route::builtin_error(kind));
        }

        tracing::debug!(
            static_routes = router.static_routes.len(),
            dynamic_routes = router.dynamic_routes.len(),
            rejected = router.rejected,
            "Router built"
        );
        router
    }

    pub fn with_match_budget(mut self, budget: Duration) -> Self {
        self.match_budget = budget;
        self
    }

    pub fn match_budget(&self) -> Duration {
        self.match_budget
    }

    /// Add one route. A later entry for the same path replaces the earlier one.
    pub fn register(&mut self, entry: &RouteConfig) -> Result<(), RouteRegistrationError> {
        let method = parse_method(&entry.http_method).ok_or_else(|| RouteRegistrationError::Method {
            path: entry.path.clone(),
            method: entry.http_method.clone(),
        })?;
        let handler = HandlerRef::new(&entry.controller, &entry.controller_method);

        if entry.path.contains('{') {
            let compiled =
                CompiledPattern::compile(&entry.path).map_err(|source| RouteRegistrationError::Pattern {
                    path: entry.path.clone(),
                    source,
                })?;
            let route = Route::new(&entry.path, method, handler);

            match self
                .dynamic_routes
                .iter_mut()
                .find(|(p, _)| pattern::normalize(p.source()) == pattern::normalize(&entry.path))
            {
                Some(slot) => *slot = (compiled, route),
                None => self.dynamic_routes.push((compiled, route)),
            }
        } else {
            let key = format!("/{}", pattern::normalize(&entry.path));
            let route = Route::new(&key, method, handler);
            self.static_routes.insert(key, route);
        }

        Ok(())
    }

    /// Resolve a request target. Never fails.
    pub fn resolve(&self, path: &str, method: &Method, is_ajax: bool) -> Route {
        let route = self.lookup(path, method, is_ajax);
        self.current.store(Some(Arc::new(route.clone())));
        route
    }

    fn lookup(&self, path: &str, method: &Method, is_ajax: bool) -> Route {
        if !path.starts_with('/') || path.bytes().any(|b| b.is_ascii_control()) {
            return self.error_route(ErrorRoute::BadRequest);
        }

        let raw = path.split('?').next().unwrap_or_default();
        if raw.len() > MAX_URI_LENGTH {
            tracing::debug!(length = raw.len(), "Request path too long");
            return self.error_route(ErrorRoute::UriTooLong);
        }

        let trimmed = raw.trim_matches('/');
        if pattern::separator_count(trimmed) > MAX_PATH_SEGMENTS {
            return self.error_route(ErrorRoute::UriTooLong);
        }

        if let Some(route) = self.static_routes.get(&format!("/{trimmed}")) {
            metrics::record_route_resolution("static");
            return self.check_method(route.clone(), method, is_ajax);
        }

        for (compiled, route) in &self.dynamic_routes {
            let started = Instant::now();
            let captures = compiled.captures(trimmed);
            let elapsed = started.elapsed();

            if elapsed >= self.match_budget {
                tracing::warn!(
                    pattern = %compiled.source(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Route pattern match exceeded time budget, possible ReDoS"
                );
                continue;
            }

            if let Some(params) = captures {
                metrics::record_route_resolution("dynamic");
                return self.check_method(route.clone().with_parameters(params), method, is_ajax);
            }
        }

        self.error_route(ErrorRoute::NotFound)
    }

    fn check_method(&self, route: Route, method: &Method, is_ajax: bool) -> Route {
        if route.method() == method {
            return route;
        }
        if is_ajax {
            self.error_route(ErrorRoute::NotAcceptable)
        } else {
            self.error_route(ErrorRoute::MethodNotAllowed)
        }
    }

    fn error_route(&self, kind: ErrorRoute) -> Route {
        metrics::record_route_resolution(kind.path());
        self.static_routes
            .get(kind.path())
            .cloned()
            .unwrap_or_else(|| Route::builtin_error(kind))
    }

    /// Resolve the request and wrap it in a fresh bus.
    pub fn init_message_bus(&self, request: RequestInfo) -> MessageBus {
        let route = self.resolve(request.path(), request.method(), request.is_ajax());
        tracing::debug!(
            request_id = %request.request_id(),
            method = %request.method(),
            path = %request.path(),
            route = %route.pattern(),
            handler = %route.handler(),
            "Route resolved"
        );
        MessageBus::new(request, route)
    }

    /// Route produced by the most recent resolution.
    pub fn current_route(&self) -> Option<Arc<Route>> {
        self.current.load_full()
    }

    /// Every table entry: static routes sorted by path, then dynamic routes in order.
    pub fn routes(&self) -> Vec<&Route> {
        let mut statics: Vec<&Route> = self.static_routes.values().collect();
        statics.sort_by(|a, b| a.pattern().cmp(b.pattern()));
        statics
            .into_iter()
            .chain(self.dynamic_routes.iter().map(|(_, r)| r))
            .collect()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            static_routes: self.static_routes.len(),
            dynamic_routes: self.dynamic_routes.len(),
            rejected_routes: self.rejected,
        }
    }
}

fn parse_method(raw: &str) -> Option<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        "HEAD" => Some(Method::HEAD),
        "OPTIONS" => Some(Method::OPTIONS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str, method: &str, controller: &str, action: &str) -> RouteConfig {
        RouteConfig {
            path: path.to_string(),
            http_method: method.to_string(),
            controller: controller.to_string(),
            controller_method: action.to_string(),
        }
    }

    fn router() -> Router {
        Router::from_config(&[
            route("/", "GET", "Home", "index"),
            route("/login", "GET", "Auth", "form"),
            route("/login", "GET", "Auth", "form"),
            route("/api/public/contact_form/{id}/get", "GET", "ContactForm", "get"),
            route("/api/{section}/{id}", "POST", "Api", "update"),
        ])
    }

    #[test]
    fn test_static_resolution_ignores_slashes_and_query() {
        let r = router();
        for path in ["/login", "/login/", "//login//", "/login?next=/x"] {
            let route = r.resolve(path, &Method::GET, false);
            assert_eq!(route.handler().to_string(), "Auth::form", "path {path}");
        }
        assert_eq!(r.resolve("/", &Method::GET, false).handler().to_string(), "Home::index");
    }

    #[test]
    fn test_dynamic_binding() {
        let r = router();
        let route = r.resolve("/api/public/contact_form/42/get", &Method::GET, false);
        assert_eq!(route.handler().to_string(), "ContactForm::get");
        assert_eq!(route.parameter("id"), Some("42"));
        assert_eq!(route.parameters().len(), 1);

        let route = r.resolve("/api/users/9", &Method::POST, false);
        assert_eq!(route.parameter("section"), Some("users"));
        assert_eq!(route.parameter("id"), Some("9"));
    }

    #[test]
    fn test_unknown_path_is_404() {
        let route = router().resolve("/nowhere", &Method::GET, false);
        assert_eq!(route.pattern(), "/error_404");
        assert_eq!(route.error_kind(), Some(ErrorRoute::NotFound));
    }

    #[test]
    fn test_method_mismatch() {
        let r = router();
        assert_eq!(r.resolve("/login", &Method::POST, false).pattern(), "/error_405");
        assert_eq!(r.resolve("/login", &Method::POST, true).pattern(), "/error_406");
        assert_eq!(
            r.resolve("/api/public/contact_form/1/get", &Method::DELETE, false).pattern(),
            "/error_405"
        );
    }

    #[test]
    fn test_uri_guards() {
        let r = router();
        let long = format!("/{}", "a".repeat(MAX_URI_LENGTH));
        assert_eq!(r.resolve(&long, &Method::GET, false).pattern(), "/error_414");

        let deep = "/a".repeat(MAX_PATH_SEGMENTS + 2);
        assert_eq!(r.resolve(&deep, &Method::GET, false).pattern(), "/error_414");

        // 33 segments is exactly 32 separators
        let limit = "/a".repeat(MAX_PATH_SEGMENTS + 1);
        assert_eq!(r.resolve(&limit, &Method::GET, false).pattern(), "/error_404");
    }

    #[test]
    fn test_malformed_path_is_400() {
        let r = router();
        assert_eq!(r.resolve("login", &Method::GET, false).pattern(), "/error_400");
        assert_eq!(r.resolve("/lo\x07gin", &Method::GET, false).pattern(), "/error_400");
    }

    #[test]
    fn test_error_routes_installed_and_overridable() {
        let r = Router::from_config(&[route("/error_404", "GET", "Pages", "missing")]);
        assert_eq!(r.stats().static_routes, ErrorRoute::ALL.len());

        let not_found = r.resolve("/x", &Method::GET, false);
        assert_eq!(not_found.handler().to_string(), "Pages::missing");

        let too_long = r.resolve(&"/a".repeat(40), &Method::GET, false);
        assert_eq!(too_long.handler(), &ErrorRoute::builtin_handler());
    }

    #[test]
    fn test_rejected_routes_are_counted() {
        let r = Router::from_config(&[
            route("/a/{b{c}}", "GET", "A", "b"),
            route("/ok", "FETCH", "A", "b"),
            route("/fine/{id}", "GET", "A", "b"),
        ]);
        let stats = r.stats();
        assert_eq!(stats.rejected_routes, 2);
        assert_eq!(stats.dynamic_routes, 1);
    }

    #[test]
    fn test_duplicate_dynamic_pattern_replaces() {
        let r = Router::from_config(&[
            route("/u/{id}", "GET", "User", "old"),
            route("/u/{id}/", "GET", "User", "new"),
        ]);
        assert_eq!(r.stats().dynamic_routes, 1);
        assert_eq!(r.resolve("/u/1", &Method::GET, false).handler().action(), "new");
    }

    #[test]
    fn test_current_route_tracks_last_resolution() {
        let r = router();
        assert!(r.current_route().is_none());
        r.resolve("/login", &Method::GET, false);
        assert_eq!(r.current_route().unwrap().pattern(), "/login");
        r.resolve("/nope", &Method::GET, false);
        assert_eq!(r.current_route().unwrap().pattern(), "/error_404");
    }

    #[test]
    fn test_register_after_boot() {
        let mut r = router();
        r.register(&route("/late", "PUT", "Late", "put")).unwrap();
        assert_eq!(r.resolve("/late", &Method::PUT, false).handler().action(), "put");
        assert!(r.register(&route("/{a}/{a}", "GET", "A", "b")).is_err());
    }

    #[test]
    fn test_slow_pattern_match_is_skipped() {
        let r = router().with_match_budget(Duration::ZERO);
        assert_eq!(r.match_budget(), Duration::ZERO);

        // Every dynamic match now blows the budget and falls through
        let route = r.resolve("/api/public/contact_form/42/get", &Method::GET, false);
        assert_eq!(route.pattern(), "/error_404");

        // Static routes never go through the pattern matcher
        assert_eq!(r.resolve("/login", &Method::GET, false).handler().to_string(), "Auth::form");
        assert_eq!(router().match_budget(), MATCH_BUDGET);
    }
}
