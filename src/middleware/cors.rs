//! Cross-origin response headers for allow-listed origins.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
};
use axum::http::HeaderValue;
use serde::Deserialize;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::pipeline::{Middleware, PipelineError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct CorsConfig {
    /// Exact origins, or `"*"` for any.
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    max_age_secs: u64,
    allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["content-type", "x-csrf-token", "x-requested-with"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            max_age_secs: 600,
            allow_credentials: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    pub const NAME: &'static str = "cors";

    pub fn from_config(config: &Value) -> Result<Self, String> {
        let config: CorsConfig = serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;
        Ok(Self { config })
    }

    fn allows(&self, origin: &str) -> bool {
        self.config
            .allowed_origins
            .iter()
            .any(|o| o == "*" || o == origin)
    }

    fn any_origin(&self) -> bool {
        self.config.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Middleware for Cors {
    fn id(&self) -> &str {
        Self::NAME
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let Some(origin) = bus.headers().get(ORIGIN).cloned() else {
            return Ok(());
        };
        let Ok(origin_str) = origin.to_str() else {
            return Ok(());
        };
        if !self.allows(origin_str) {
            tracing::debug!(request_id = %bus.request_id(), origin = %origin_str, "Origin not allowed");
            return Ok(());
        }

        let wildcard = self.any_origin() && !self.config.allow_credentials;
        let methods = HeaderValue::from_str(&self.config.allowed_methods.join(", "));
        let headers = HeaderValue::from_str(&self.config.allowed_headers.join(", "));
        let max_age = HeaderValue::from(self.config.max_age_secs);

        let Some(outgoing) = bus.outgoing_mut() else {
            return Ok(());
        };
        let target = &mut outgoing.headers;
        if wildcard {
            target.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        } else {
            target.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            target.append(VARY, HeaderValue::from_static("Origin"));
        }
        if self.config.allow_credentials {
            target.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Ok(methods) = methods {
            target.insert(ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        if let Ok(headers) = headers {
            target.insert(ACCESS_CONTROL_ALLOW_HEADERS, headers);
        }
        target.insert(ACCESS_CONTROL_MAX_AGE, max_age);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::Outgoing;
    use crate::pipeline::priority::tests::test_bus;
    use axum::http::{HeaderMap, StatusCode};
    use serde_json::json;

    fn bus_with_origin(origin: &str) -> MessageBus {
        let mut bus = test_bus();
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(origin).unwrap());
        bus.set_headers(headers);
        bus.set_outgoing(Outgoing::empty(StatusCode::OK));
        bus
    }

    #[test]
    fn test_listed_origin_echoed() {
        let cors = Cors::from_config(&json!({"allowed_origins": ["https://app.example"]})).unwrap();
        let mut bus = bus_with_origin("https://app.example");
        cors.process(&mut bus).unwrap();

        let out = bus.outgoing().unwrap();
        assert_eq!(out.header("access-control-allow-origin"), Some("https://app.example"));
        assert_eq!(out.header("vary"), Some("Origin"));
        assert_eq!(out.header("access-control-max-age"), Some("600"));
    }

    #[test]
    fn test_unlisted_origin_ignored() {
        let cors = Cors::from_config(&json!({"allowed_origins": ["https://app.example"]})).unwrap();
        let mut bus = bus_with_origin("https://evil.example");
        cors.process(&mut bus).unwrap();
        assert!(bus.outgoing().unwrap().header("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_wildcard() {
        let cors = Cors::from_config(&json!({"allowed_origins": ["*"]})).unwrap();
        let mut bus = bus_with_origin("https://any.example");
        cors.process(&mut bus).unwrap();
        assert_eq!(bus.outgoing().unwrap().header("access-control-allow-origin"), Some("*"));
    }
}
