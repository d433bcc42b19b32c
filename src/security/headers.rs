//! Security response headers.
//!
//! # Responsibilities
//! - Add the fixed hardening header set to every response
//! - Strip headers that disclose the server stack
//!
//! # Design Decisions
//! - Hardening headers overwrite whatever a handler set
//! - `Content-Type` is only filled in when missing

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
];

pub const DISCLOSURE_HEADERS: [&str; 4] = ["x-powered-by", "server", "x-aspnet-version", "x-aspnetmvc-version"];

pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
}

pub fn strip_disclosure_headers(headers: &mut HeaderMap) {
    for name in DISCLOSURE_HEADERS {
        headers.remove(name);
    }
}

pub fn ensure_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}
