//! Request stage: bind the route to a handler.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::bus::MessageBus;
use crate::handler::params::{self, QueryParams};
use crate::handler::{HandlerBinding, HandlerRegistry};
use crate::pipeline::{Middleware, PipelineError};

/// Request headers the pipeline keeps; everything else is dropped.
pub const ALLOWED_HEADERS: [&str; 14] = [
    "accept",
    "accept-language",
    "accept-encoding",
    "user-agent",
    "content-type",
    "cache-control",
    "connection",
    "upgrade-insecure-requests",
    "cookie",
    "authorization",
    "x-requested-with",
    "x-csrf-token",
    "x-xsrf-token",
    "origin",
];

pub const MAX_HEADER_VALUE: usize = 1024;

pub struct RequestStage {
    handlers: Arc<HandlerRegistry>,
}

impl RequestStage {
    pub const ID: &'static str = "request";

    pub fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self { handlers }
    }
}

impl Middleware for RequestStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let reference = bus.route().handler().clone();
        let entry = self
            .handlers
            .get(&reference)
            .ok_or(PipelineError::HandlerNotFound(reference))?;

        bus.set_headers(filter_headers(bus.request().headers()));

        let query = QueryParams::parse(bus.request().query());
        let bound = params::bind(
            &entry.reference().to_string(),
            entry.params(),
            bus.route().parameters(),
            &query,
        )?;
        bus.set("query", query.to_json());

        tracing::debug!(
            request_id = %bus.request_id(),
            handler = %entry.reference(),
            params = bound.len(),
            "Handler bound"
        );

        bus.set_security(entry.security().clone());
        bus.set_binding(HandlerBinding { entry, params: bound });
        Ok(())
    }
}

/// Keep allow-listed headers, cut each value to 1024 bytes and drop
/// anything outside printable ASCII.
pub fn filter_headers(raw: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for name in ALLOWED_HEADERS {
        for value in raw.get_all(name) {
            let clean: String = value
                .as_bytes()
                .iter()
                .take(MAX_HEADER_VALUE)
                .filter(|b| (0x20..0x7f).contains(*b))
                .map(|&b| b as char)
                .collect();
            if let Ok(value) = HeaderValue::from_str(&clean) {
                filtered.append(HeaderName::from_static(name), value);
            }
        }
    }
    filtered
}
