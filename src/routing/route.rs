//! Route descriptor and handler references.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};

/// `Controller::action` pair naming a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerRef {
    controller: Arc<str>,
    action: Arc<str>,
}

impl HandlerRef {
    pub fn new(controller: impl AsRef<str>, action: impl AsRef<str>) -> Self {
        Self {
            controller: Arc::from(controller.as_ref()),
            action: Arc::from(action.as_ref()),
        }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.controller, self.action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not of the form `Controller::action`")]
pub struct HandlerRefParseError(pub String);

impl FromStr for HandlerRef {
    type Err = HandlerRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((c, a)) if !c.is_empty() && !a.is_empty() && !a.contains("::") => {
                Ok(Self::new(c, a))
            }
            _ => Err(HandlerRefParseError(s.to_string())),
        }
    }
}

/// Routes the router falls back to when a request cannot be served as asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorRoute {
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    UriTooLong,
}

impl ErrorRoute {
    pub const ALL: [ErrorRoute; 6] = [
        ErrorRoute::BadRequest,
        ErrorRoute::Forbidden,
        ErrorRoute::NotFound,
        ErrorRoute::MethodNotAllowed,
        ErrorRoute::NotAcceptable,
        ErrorRoute::UriTooLong,
    ];

    pub fn status(self) -> StatusCode {
        match self {
            ErrorRoute::BadRequest => StatusCode::BAD_REQUEST,
            ErrorRoute::Forbidden => StatusCode::FORBIDDEN,
            ErrorRoute::NotFound => StatusCode::NOT_FOUND,
            ErrorRoute::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorRoute::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ErrorRoute::UriTooLong => StatusCode::URI_TOO_LONG,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ErrorRoute::BadRequest => "/error_400",
            ErrorRoute::Forbidden => "/error_403",
            ErrorRoute::NotFound => "/error_404",
            ErrorRoute::MethodNotAllowed => "/error_405",
            ErrorRoute::NotAcceptable => "/error_406",
            ErrorRoute::UriTooLong => "/error_414",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.path() == path)
    }

    /// Handler installed for error routes the configuration leaves out.
    pub fn builtin_handler() -> HandlerRef {
        HandlerRef::new("Error", "show")
    }
}

/// Immutable route descriptor.
///
/// Table entries never carry parameters; [`crate::routing::Router::resolve`]
/// hands out a copy with the parameters bound for that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pattern: Arc<str>,
    method: Method,
    handler: HandlerRef,
    parameters: BTreeMap<String, String>,
}

impl Route {
    pub fn new(pattern: impl AsRef<str>, method: Method, handler: HandlerRef) -> Self {
        Self {
            pattern: Arc::from(pattern.as_ref()),
            method,
            handler,
            parameters: BTreeMap::new(),
        }
    }

    pub(crate) fn builtin_error(kind: ErrorRoute) -> Self {
        Self::new(kind.path(), Method::GET, ErrorRoute::builtin_handler())
    }

    pub(crate) fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn is_dynamic(&self) -> bool {
        self.pattern.contains('{')
    }

    /// The error kind when this is one of the `/error_XXX` routes.
    pub fn error_kind(&self) -> Option<ErrorRoute> {
        ErrorRoute::from_path(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_ref_parse() {
        let h: HandlerRef = "Auth::form".parse().unwrap();
        assert_eq!(h.controller(), "Auth");
        assert_eq!(h.action(), "form");
        assert_eq!(h.to_string(), "Auth::form");

        assert!("Auth".parse::<HandlerRef>().is_err());
        assert!("::form".parse::<HandlerRef>().is_err());
        assert!("A::b::c".parse::<HandlerRef>().is_err());
    }

    #[test]
    fn test_error_route_round_trip() {
        for kind in ErrorRoute::ALL {
            assert_eq!(ErrorRoute::from_path(kind.path()), Some(kind));
        }
        assert_eq!(ErrorRoute::UriTooLong.status(), StatusCode::URI_TOO_LONG);
        assert_eq!(ErrorRoute::from_path("/login"), None);
    }

    #[test]
    fn test_route_parameters_are_per_copy() {
        let table_entry = Route::new("/user/{id}", Method::GET, HandlerRef::new("User", "show"));
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "7".to_string());

        let resolved = table_entry.clone().with_parameters(params);
        assert_eq!(resolved.parameter("id"), Some("7"));
        assert!(table_entry.parameters().is_empty());
        assert!(resolved.is_dynamic());
    }
}
