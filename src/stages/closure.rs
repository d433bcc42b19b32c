//! Closing stage: response contract and output hardening.
//!
//! # Responsibilities
//! - Validate API documents against the configured shape: required keys,
//!   allowed keys, `status` values, per-key type unions
//! - Sanitize every string of an API document and reject disallowed content
//! - Re-render the outgoing body when sanitizing rewrote the document;
//!   enforce content type and size limits
//! - Add security headers, CSP for views, strip disclosure headers
//!
//! # Data Flow
//! ```text
//! HandlerResponse (bus)
//!     → API only: validate_structure → sanitize_value
//!     → size check → earlier outgoing, or build_outgoing when the
//!       document was rewritten (keeps earlier status + headers)
//!     → content type check → security headers (+ CSP for views)
//!     → any violation: generic 500 SECURITY_ERROR document
//! ```
//!
//! # Design Decisions
//! - Violation details are logged, never sent to the client
//! - Runs as its own pipeline after the app middleware
//! - App middleware edit the rendered outgoing, not the handler response

use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::bus::{HandlerResponse, MessageBus, ResponseBody, ResponseKind};
use crate::config::ClosureConfig;
use crate::http::compression::GzipCompressor;
use crate::http::response::Outgoing;
use crate::observability::metrics;
use crate::pipeline::{Middleware, PipelineError};
use crate::security::headers::{apply_security_headers, strip_disclosure_headers};
use crate::security::ContentSecurityPolicy;
use crate::stages::response::{build_outgoing, render_body, JSON_CONTENT_TYPE};

pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while processing your request";
pub const SECURITY_ERROR_CODE: &str = "SECURITY_ERROR";

const TAG_PATTERN: &str = r"(?s)<!--.*?-->|</?([A-Za-z][A-Za-z0-9]*)\b[^>]*>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClosureViolation {
    #[error("API response is not a JSON object")]
    NotObject,

    #[error("missing required key '{0}'")]
    MissingKey(String),

    #[error("key '{0}' is not allowed")]
    UnknownKey(String),

    #[error("status value '{0}' is not allowed")]
    StatusValue(String),

    #[error("key '{key}' is {found}, expected {expected}")]
    DataType {
        key: String,
        expected: String,
        found: &'static str,
    },

    #[error("content matches disallowed pattern '{0}'")]
    DisallowedContent(String),

    #[error("content type '{0}' is not allowed")]
    ContentType(String),

    #[error("response of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("failed to render response: {0}")]
    Render(String),
}

pub struct ClosureStage {
    config: ClosureConfig,
    tags: Regex,
    disallowed: Vec<Regex>,
    csp: Option<ContentSecurityPolicy>,
    compressor: GzipCompressor,
}

impl ClosureStage {
    pub const ID: &'static str = "closure";

    pub fn new(
        config: ClosureConfig,
        csp: Option<ContentSecurityPolicy>,
        compressor: GzipCompressor,
    ) -> Result<Self, regex::Error> {
        let disallowed = config
            .security
            .disallowed_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tags: Regex::new(TAG_PATTERN)?,
            disallowed,
            config,
            csp,
            compressor,
        })
    }

    fn finish(&self, bus: &MessageBus, response: HandlerResponse) -> Result<Outgoing, ClosureViolation> {
        let kind = response.kind();

        let sanitized = match (kind, response.body()) {
            (ResponseKind::Api, ResponseBody::Json(document)) => {
                self.validate_structure(document)?;
                if self.config.security.xss_protection {
                    Some(self.sanitize_value(document)?)
                } else {
                    None
                }
            }
            _ => None,
        };
        let rewritten = match (&sanitized, response.body()) {
            (Some(document), ResponseBody::Json(original)) => document != original,
            _ => false,
        };
        let response = match sanitized {
            Some(document) if rewritten => response.with_body(ResponseBody::Json(document)),
            _ => response,
        };

        let size = render_body(response.body())
            .map_err(|e| ClosureViolation::Render(e.to_string()))?
            .len();
        let max = self.config.security.max_response_size;
        if size > max {
            return Err(ClosureViolation::TooLarge { size, max });
        }

        let mut outgoing = match bus.outgoing() {
            Some(previous) if !rewritten => previous.clone(),
            previous => {
                let mut outgoing = build_outgoing(&response, bus.encoding(), &self.compressor)
                    .map_err(|e| ClosureViolation::Render(e.to_string()))?;
                if let Some(previous) = previous {
                    outgoing.status = previous.status;
                    for name in previous.headers.keys() {
                        if *name == CONTENT_ENCODING || outgoing.headers.contains_key(name) {
                            continue;
                        }
                        for value in previous.headers.get_all(name) {
                            outgoing.headers.append(name.clone(), value.clone());
                        }
                    }
                }
                outgoing
            }
        };

        if self.config.security.content_type_validation {
            let media = outgoing
                .header(CONTENT_TYPE.as_str())
                .unwrap_or_default()
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            let allowed = &self.config.security.allowed_content_types;
            if !allowed.iter().any(|t| t.eq_ignore_ascii_case(&media)) {
                return Err(ClosureViolation::ContentType(media));
            }
        }

        if self.config.security.header_injection_protection {
            apply_security_headers(&mut outgoing.headers);
            strip_disclosure_headers(&mut outgoing.headers);
        }

        if kind == ResponseKind::View {
            if let Some(csp) = &self.csp {
                if let Ok(value) = HeaderValue::from_str(&csp.header_value(bus.csp_nonce())) {
                    outgoing
                        .headers
                        .insert(HeaderName::from_static("content-security-policy"), value);
                }
            }
        }

        Ok(outgoing)
    }

    pub fn validate_structure(&self, document: &Value) -> Result<(), ClosureViolation> {
        let map = document.as_object().ok_or(ClosureViolation::NotObject)?;
        let rules = &self.config.validation.response_structure;

        if let Some(missing) = rules.required_keys.iter().find(|k| !map.contains_key(*k)) {
            return Err(ClosureViolation::MissingKey(missing.clone()));
        }
        if !rules.allowed_keys.is_empty() {
            if let Some(unknown) = map.keys().find(|k| !rules.allowed_keys.contains(k)) {
                return Err(ClosureViolation::UnknownKey(unknown.clone()));
            }
        }
        if let Some(Value::String(status)) = map.get("status") {
            if !rules.status_values.is_empty() && !rules.status_values.contains(status) {
                return Err(ClosureViolation::StatusValue(status.clone()));
            }
        }

        for (key, union) in &self.config.validation.data_types {
            let Some(value) = map.get(key) else {
                continue;
            };
            let found = json_type(value);
            if !union.split('|').any(|t| canonical_type(t.trim()) == found) {
                return Err(ClosureViolation::DataType {
                    key: key.clone(),
                    expected: union.clone(),
                    found,
                });
            }
        }
        Ok(())
    }

    pub fn sanitize_value(&self, value: &Value) -> Result<Value, ClosureViolation> {
        Ok(match value {
            Value::String(s) => Value::String(self.sanitize_string(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.sanitize_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut clean = Map::with_capacity(map.len());
                for (key, v) in map {
                    clean.insert(key.clone(), self.sanitize_value(v)?);
                }
                Value::Object(clean)
            }
            other => other.clone(),
        })
    }

    pub fn sanitize_string(&self, input: &str) -> Result<String, ClosureViolation> {
        let rules = &self.config.validation.sanitization;

        let mut out = if rules.strip_tags {
            self.strip_tags(input)
        } else {
            input.to_string()
        };
        if rules.trim_strings {
            out = out.trim().to_string();
        }
        if rules.escape_html {
            out = escape_html(&out);
        }
        if rules.normalize_line_endings {
            out = out.replace("\r\n", "\n").replace('\r', "\n");
        }

        match self.disallowed.iter().find(|p| p.is_match(&out)) {
            Some(pattern) => Err(ClosureViolation::DisallowedContent(pattern.as_str().to_string())),
            None => Ok(out),
        }
    }

    /// Remove tags and comments, keeping allow-listed tags.
    fn strip_tags(&self, input: &str) -> String {
        let allowed = &self.config.validation.sanitization.allowed_tags;
        self.tags
            .replace_all(input, |caps: &Captures| match caps.get(1) {
                Some(name) if allowed.iter().any(|t| t.eq_ignore_ascii_case(name.as_str())) => {
                    caps[0].to_string()
                }
                _ => String::new(),
            })
            .into_owned()
    }

    fn fallback() -> Outgoing {
        let document = json!({
            "status": "error",
            "data": null,
            "message": GENERIC_ERROR_MESSAGE,
            "errors": [{ "code": SECURITY_ERROR_CODE }],
        });
        let mut outgoing = Outgoing::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::to_vec(&document).unwrap_or_default(),
        );
        outgoing
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        apply_security_headers(&mut outgoing.headers);
        outgoing
    }
}

impl Middleware for ClosureStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        if !self.config.enabled {
            return Ok(());
        }
        let Some(response) = bus.response().cloned() else {
            return Ok(());
        };

        match self.finish(bus, response) {
            Ok(outgoing) => bus.set_outgoing(outgoing),
            Err(violation) => {
                tracing::warn!(
                    request_id = %bus.request_id(),
                    handler = %bus.route().handler(),
                    violation = %violation,
                    "Response rejected by closing stage"
                );
                metrics::record_closure_fallback();
                bus.set_outgoing(Self::fallback());
            }
        }
        Ok(())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn canonical_type(name: &str) -> &str {
    match name {
        "int" => "integer",
        "double" => "float",
        "bool" => "boolean",
        other => other,
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}
