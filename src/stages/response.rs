//! Response stage: render the handler's response.
//!
//! # Responsibilities
//! - Turn a `HandlerResponse` into an `Outgoing`: status, handler headers,
//!   `Content-Type`, rendered body
//! - Apply the deferred gzip encoding when it pays off
//!
//! # Design Decisions
//! - Rendering lives in free functions; the closing stage re-renders with them
//! - Gzip is skipped below the size threshold, for incompressible types and
//!   when it would not shrink the body

use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE, VARY};
use axum::http::HeaderValue;

use crate::bus::{HandlerResponse, MessageBus, ResponseBody, ResponseKind};
use crate::http::compression::{ContentEncoding, GzipCompressor};
use crate::http::response::Outgoing;
use crate::pipeline::{Middleware, PipelineError};
use crate::security::headers::ensure_content_type;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

pub fn content_type_for(kind: ResponseKind) -> &'static str {
    match kind {
        ResponseKind::Api => JSON_CONTENT_TYPE,
        ResponseKind::View => HTML_CONTENT_TYPE,
    }
}

pub fn render_body(body: &ResponseBody) -> Result<Vec<u8>, serde_json::Error> {
    match body {
        ResponseBody::Json(value) => serde_json::to_vec(value),
        ResponseBody::Markup(markup) => Ok(markup.as_bytes().to_vec()),
    }
}

pub fn build_outgoing(
    response: &HandlerResponse,
    encoding: Option<ContentEncoding>,
    compressor: &GzipCompressor,
) -> Result<Outgoing, PipelineError> {
    let mut headers = response.headers().clone();
    ensure_content_type(&mut headers, content_type_for(response.kind()));
    let mut body = render_body(response.body())?;

    if encoding == Some(ContentEncoding::Gzip) {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Some(compressed) = compressor.compress_if_beneficial(&body, content_type) {
            body = compressed;
            headers.insert(
                CONTENT_ENCODING,
                HeaderValue::from_static(ContentEncoding::Gzip.as_str()),
            );
            headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
        }
    }

    let mut outgoing = Outgoing::new(response.status(), body);
    outgoing.headers = headers;
    Ok(outgoing)
}

pub struct ResponseStage {
    compressor: GzipCompressor,
}

impl ResponseStage {
    pub const ID: &'static str = "response";

    pub fn new(compressor: GzipCompressor) -> Self {
        Self { compressor }
    }
}

impl Middleware for ResponseStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let response = bus.response().ok_or(PipelineError::MissingState {
            stage: Self::ID,
            requires: "a handler response",
        })?;
        let outgoing = build_outgoing(response, bus.encoding(), &self.compressor)?;

        tracing::debug!(
            request_id = %bus.request_id(),
            status = outgoing.status.as_u16(),
            bytes = outgoing.body.len(),
            encoding = outgoing.header("content-encoding").unwrap_or("identity"),
            "Response built"
        );
        bus.set_outgoing(outgoing);
        Ok(())
    }
}
