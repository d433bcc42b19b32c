//! What a handler hands back to the pipeline.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Markup(String),
}

/// `Api` responses are JSON documents subject to the response contract;
/// `View` responses are rendered markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Api,
    View,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Api => "api",
            ResponseKind::View => "view",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    status: StatusCode,
    body: ResponseBody,
    headers: HeaderMap,
    is_json: bool,
}

impl HandlerResponse {
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody::Json(body),
            headers: HeaderMap::new(),
            is_json: true,
        }
    }

    pub fn view(markup: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody::Markup(markup.into()),
            headers: HeaderMap::new(),
            is_json: false,
        }
    }

    /// `{"status": "success", "data": ...}`
    pub fn success(data: Value) -> Self {
        Self::json(json!({ "status": "success", "data": data }))
    }

    /// `{"status": "error", "message": ...}` with the given status code.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self::json(json!({ "status": "error", "message": message.into() })).with_status(status)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Invalid header names or values are dropped with a debug log.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => tracing::debug!(header = %name, "Dropping invalid response header"),
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_json(&self) -> bool {
        self.is_json
    }

    pub fn kind(&self) -> ResponseKind {
        if self.is_json {
            ResponseKind::Api
        } else {
            ResponseKind::View
        }
    }

    pub(crate) fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }
}
