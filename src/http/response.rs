//! Outgoing response produced by the pipeline.
//!
//! # Responsibilities
//! - Hold status, headers and the fully rendered body
//! - Build the redirect the kernel answers security refusals with
//! - Convert into an axum response at the edge
//!
//! # Design Decisions
//! - Bodies are buffered; the closing stage needs the final bytes to check size
//! - Header names are case-insensitive through `HeaderMap`

use std::borrow::Cow;

use axum::body::{Body, Bytes};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Outgoing {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Bytes::new())
    }

    /// `302 Found` to `location`. An unencodable target falls back to `/`.
    pub fn redirect(location: &str) -> Self {
        let mut outgoing = Self::empty(StatusCode::FOUND);
        let value = HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
        outgoing.headers.insert(LOCATION, value);
        outgoing
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl IntoResponse for Outgoing {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect() {
        let out = Outgoing::redirect("/login");
        assert_eq!(out.status, StatusCode::FOUND);
        assert_eq!(out.header("location"), Some("/login"));
        assert!(out.body.is_empty());

        let bad = Outgoing::redirect("/a\nb");
        assert_eq!(bad.header("location"), Some("/"));
    }

    #[test]
    fn test_into_response_keeps_parts() {
        let mut out = Outgoing::new(StatusCode::CREATED, "hi");
        out.headers.insert("x-test", HeaderValue::from_static("1"));
        let res = out.into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers().get("x-test").unwrap(), "1");
    }
}
