//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route entries are well formed and unique
//! - Check handler and middleware references
//! - Compile closure patterns once so a bad regex never reaches a request
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// HTTP methods a route may declare.
pub const KNOWN_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Type names accepted in `closure.validation.data_types`.
pub const KNOWN_DATA_TYPES: &[&str] = &[
    "string", "integer", "int", "float", "double", "boolean", "bool", "array", "object", "null",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("route #{index}: path `{path}` must start with '/'")]
    RoutePath { index: usize, path: String },

    #[error("route `{path}`: unknown http method `{method}`")]
    RouteMethod { path: String, method: String },

    #[error("route `{path}`: controller and controller_method must both be set")]
    RouteHandler { path: String },

    #[error("route `{path}` is declared more than once")]
    DuplicateRoute { path: String },

    #[error("handler entry `{handler}` must look like `Controller::method`")]
    HandlerId { handler: String },

    #[error("handler `{handler}`: auth realm must not be empty")]
    AuthRealm { handler: String },

    #[error("middleware #{index} has an empty name")]
    MiddlewareName { index: usize },

    #[error("middleware `{name}` is declared more than once")]
    DuplicateMiddleware { name: String },

    #[error("closure pattern `{pattern}` does not compile: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("closure data type `{ty}` for key `{key}` is unknown")]
    DataType { key: String, ty: String },

    #[error("compression level {0} is outside 0..=9")]
    CompressionLevel(u32),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("listener.max_body_bytes"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.csrf.token_ttl_secs == 0 {
        errors.push(ValidationError::Zero("security.csrf.token_ttl_secs"));
    }
    if config.security.session.idle_timeout_secs == 0 {
        errors.push(ValidationError::Zero("security.session.idle_timeout_secs"));
    }
    if config.security.session.purge_interval_secs == 0 {
        errors.push(ValidationError::Zero("security.session.purge_interval_secs"));
    }
    if config.closure.security.max_response_size == 0 {
        errors.push(ValidationError::Zero("closure.security.max_response_size"));
    }
    if config.compression.level > 9 {
        errors.push(ValidationError::CompressionLevel(config.compression.level));
    }

    validate_routes(config, &mut errors);
    validate_handlers(config, &mut errors);
    validate_middleware(config, &mut errors);
    validate_closure(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routes(config: &AppConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath {
                index,
                path: route.path.clone(),
            });
        }

        let method = route.http_method.to_ascii_uppercase();
        if !KNOWN_METHODS.contains(&method.as_str()) {
            errors.push(ValidationError::RouteMethod {
                path: route.path.clone(),
                method: route.http_method.clone(),
            });
        }

        if route.controller.trim().is_empty() || route.controller_method.trim().is_empty() {
            errors.push(ValidationError::RouteHandler {
                path: route.path.clone(),
            });
        }

        // The route table is keyed by normalized path
        let key = route.path.trim_matches('/').to_string();
        if !seen.insert(key) {
            errors.push(ValidationError::DuplicateRoute {
                path: route.path.clone(),
            });
        }
    }
}

fn validate_handlers(config: &AppConfig, errors: &mut Vec<ValidationError>) {
    for entry in &config.handlers {
        let well_formed = entry
            .handler
            .split_once("::")
            .map(|(c, m)| !c.is_empty() && !m.is_empty() && !m.contains("::"))
            .unwrap_or(false);
        if !well_formed {
            errors.push(ValidationError::HandlerId {
                handler: entry.handler.clone(),
            });
        }

        if let Some(auth) = &entry.auth {
            if auth.realm.trim().is_empty() {
                errors.push(ValidationError::AuthRealm {
                    handler: entry.handler.clone(),
                });
            }
        }
    }
}

fn validate_middleware(config: &AppConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();

    for (index, entry) in config.middleware.iter().enumerate() {
        if entry.name.trim().is_empty() {
            errors.push(ValidationError::MiddlewareName { index });
            continue;
        }
        if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::DuplicateMiddleware {
                name: entry.name.clone(),
            });
        }
    }
}

fn validate_closure(config: &AppConfig, errors: &mut Vec<ValidationError>) {
    for pattern in &config.closure.security.disallowed_patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    for (key, union) in &config.closure.validation.data_types {
        for ty in union.split('|').map(str::trim) {
            if !KNOWN_DATA_TYPES.contains(&ty) {
                errors.push(ValidationError::DataType {
                    key: key.clone(),
                    ty: ty.to_string(),
                });
            }
        }
    }
}
