//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the kernel.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the application kernel.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Ordered route table.
    pub routes: Vec<RouteConfig>,

    /// Per-handler security overrides.
    pub handlers: Vec<HandlerSecurityConfig>,

    /// Application middleware, run after the core stages.
    pub middleware: Vec<MiddlewareConfig>,

    /// Response contract enforced by the closing stage.
    pub closure: ClosureConfig,

    /// Sessions, CSRF, CSP and security redirect targets.
    pub security: SecurityConfig,

    /// Response compression.
    pub compression: CompressionConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Literal path or pattern with `{name}` placeholders.
    pub path: String,

    /// HTTP method the route answers to.
    pub http_method: String,

    /// Controller part of the handler reference.
    pub controller: String,

    /// Action part of the handler reference.
    pub controller_method: String,
}

/// Security metadata for one handler, keyed by `Controller::method`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HandlerSecurityConfig {
    pub handler: String,

    #[serde(default)]
    pub csrf: Option<CsrfRule>,

    #[serde(default)]
    pub auth: Option<AuthRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CsrfRule {
    /// Reject non-AJAX requests before looking at the token.
    pub ajax_only: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthRule {
    /// User realm (one per user table in a database-backed provider).
    pub realm: String,

    #[serde(default)]
    pub roles: Vec<String>,

    /// Required account status; empty skips the status check.
    #[serde(default)]
    pub status: String,

    /// Strict mode requires every listed role instead of any one of them.
    #[serde(default = "default_true")]
    pub strict: bool,
}

/// Application middleware entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MiddlewareConfig {
    /// Name looked up in the middleware registry.
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,

    /// Free-form options handed to the middleware through the bus.
    #[serde(default)]
    pub config: toml::Table,
}

/// Closing stage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClosureConfig {
    pub enabled: bool,
    pub security: ClosureSecurityConfig,
    pub validation: ClosureValidationConfig,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            security: ClosureSecurityConfig::default(),
            validation: ClosureValidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClosureSecurityConfig {
    /// Sanitize strings and reject dangerous content in API responses.
    pub xss_protection: bool,

    /// Inject the fixed security header set and strip disclosure headers.
    pub header_injection_protection: bool,

    /// Reject responses whose content type is not listed below.
    pub content_type_validation: bool,

    pub allowed_content_types: Vec<String>,

    /// Maximum serialized body size in bytes.
    pub max_response_size: usize,

    /// Regular expressions (Rust `regex` syntax) no sanitized string may match.
    pub disallowed_patterns: Vec<String>,
}

impl Default for ClosureSecurityConfig {
    fn default() -> Self {
        Self {
            xss_protection: true,
            header_injection_protection: true,
            content_type_validation: true,
            allowed_content_types: vec![
                "application/json".to_string(),
                "text/html".to_string(),
                "text/plain".to_string(),
            ],
            max_response_size: 5 * 1024 * 1024,
            disallowed_patterns: vec![
                r"(?i)<\s*script".to_string(),
                r"(?i)javascript:".to_string(),
                r"(?i)on\w+\s*=".to_string(),
                r"(?i)data:".to_string(),
                r"(?i)vbscript:".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClosureValidationConfig {
    pub response_structure: ResponseStructureConfig,

    /// Allowed type union per top-level key, e.g. `"string|array|null"`.
    pub data_types: BTreeMap<String, String>,

    pub sanitization: SanitizationConfig,
}

impl Default for ClosureValidationConfig {
    fn default() -> Self {
        let data_types = [
            ("status", "string"),
            ("message", "string|array|null"),
            ("data", "array|object|string|integer|boolean|null"),
            ("errors", "array|null"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            response_structure: ResponseStructureConfig::default(),
            data_types,
            sanitization: SanitizationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseStructureConfig {
    pub required_keys: Vec<String>,
    pub allowed_keys: Vec<String>,
    pub status_values: Vec<String>,
}

impl Default for ResponseStructureConfig {
    fn default() -> Self {
        Self {
            required_keys: vec!["status".to_string()],
            allowed_keys: ["status", "data", "message", "errors", "meta"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            status_values: vec!["success".to_string(), "error".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizationConfig {
    pub strip_tags: bool,
    pub allowed_tags: Vec<String>,
    pub trim_strings: bool,
    pub escape_html: bool,
    pub normalize_line_endings: bool,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            strip_tags: true,
            allowed_tags: ["p", "br", "strong", "em", "u", "ol", "ul", "li", "h1", "h2", "h3", "h4", "h5", "h6"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            trim_strings: true,
            escape_html: true,
            normalize_line_endings: true,
        }
    }
}

/// Security stage configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub session: SessionConfig,
    pub csrf: CsrfConfig,
    pub csp: CspConfig,
    pub redirects: RedirectConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session id.
    pub cookie_name: String,

    /// Cookie carrying the long-lived remember token.
    pub remember_cookie: String,

    /// A session user idle for longer than this is logged out.
    pub idle_timeout_secs: u64,

    /// Realm checked for a session user on handlers that require no auth.
    pub default_realm: String,

    /// How often expired sessions are swept from the store.
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "YADRO-SESSION".to_string(),
            remember_cookie: "REMEMBER-TOKEN".to_string(),
            idle_timeout_secs: 30 * 60,
            default_realm: "users".to_string(),
            purge_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub token_ttl_secs: u64,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self { token_ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CspConfig {
    pub enabled: bool,

    /// Directive name to source list. `{nonce}` expands to the per-request nonce.
    pub directives: BTreeMap<String, Vec<String>>,
}

impl Default for CspConfig {
    fn default() -> Self {
        let directives = [
            ("default-src", vec!["'self'"]),
            ("script-src", vec!["'self'", "'nonce-{nonce}'", "'strict-dynamic'"]),
            ("style-src", vec!["'self'", "'nonce-{nonce}'"]),
            ("img-src", vec!["'self'", "data:"]),
            ("object-src", vec!["'none'"]),
            ("frame-ancestors", vec!["'none'"]),
            ("base-uri", vec!["'self'"]),
            ("form-action", vec!["'self'"]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect();

        Self {
            enabled: true,
            directives,
        }
    }
}

/// Where the security stage sends a request it refuses.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedirectConfig {
    pub login: String,
    pub forbidden: String,
    pub premoderation: String,
    pub banned: String,
    pub crash: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            forbidden: "/error_403".to_string(),
            premoderation: "/premoderation_info".to_string(),
            banned: "/ban_info".to_string(),
            crash: "/crash".to_string(),
        }
    }
}

/// Response compression.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Bodies smaller than this are sent as-is.
    pub min_size: usize,

    /// Gzip level, 0-9.
    pub level: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 1024,
            level: 6,
        }
    }
}

fn default_true() -> bool {
    true
}
