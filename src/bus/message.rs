//! Per-request message bus.

use std::collections::HashMap;
use std::time::SystemTime;

use axum::http::HeaderMap;
use base64::Engine;
use serde_json::Value;

use crate::bus::response::{HandlerResponse, ResponseKind};
use crate::handler::{HandlerBinding, SecurityMetadata};
use crate::http::compression::ContentEncoding;
use crate::http::request::RequestInfo;
use crate::http::response::Outgoing;
use crate::routing::Route;
use crate::security::User;

/// Reserved extension key; writing `true` through [`MessageBus::set`] stops
/// the pipeline exactly like [`MessageBus::stop`].
pub const PIPELINE_STOPPED: &str = "_pipeline_stopped";

static STOPPED: Value = Value::Bool(true);
static RUNNING: Value = Value::Bool(false);

/// Context shared by every middleware of one request.
#[derive(Debug)]
pub struct MessageBus {
    request_id: String,
    request_time: SystemTime,
    request: RequestInfo,
    route: Route,
    csp_nonce: String,
    headers: HeaderMap,
    binding: Option<HandlerBinding>,
    security: Option<SecurityMetadata>,
    user: Option<User>,
    response: Option<HandlerResponse>,
    encoding: Option<ContentEncoding>,
    redirect: Option<String>,
    outgoing: Option<Outgoing>,
    cookies: Vec<String>,
    stopped: bool,
    extensions: HashMap<String, Value>,
}

impl MessageBus {
    pub fn new(request: RequestInfo, route: Route) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self {
            request_id: request.request_id().to_string(),
            request_time: SystemTime::now(),
            request,
            route,
            csp_nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
            headers: HeaderMap::new(),
            binding: None,
            security: None,
            user: None,
            response: None,
            encoding: None,
            redirect: None,
            outgoing: None,
            cookies: Vec::new(),
            stopped: false,
            extensions: HashMap::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request_time(&self) -> SystemTime {
        self.request_time
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Nonce for inline scripts and styles of this response.
    pub fn csp_nonce(&self) -> &str {
        &self.csp_nonce
    }

    /// Allow-listed, sanitized request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    pub fn binding(&self) -> Option<&HandlerBinding> {
        self.binding.as_ref()
    }

    pub fn set_binding(&mut self, binding: HandlerBinding) {
        self.binding = Some(binding);
    }

    pub fn security(&self) -> Option<&SecurityMetadata> {
        self.security.as_ref()
    }

    pub fn set_security(&mut self, meta: SecurityMetadata) {
        self.security = Some(meta);
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    pub fn response(&self) -> Option<&HandlerResponse> {
        self.response.as_ref()
    }

    pub fn response_kind(&self) -> Option<ResponseKind> {
        self.response.as_ref().map(HandlerResponse::kind)
    }

    pub fn set_response(&mut self, response: HandlerResponse) {
        self.response = Some(response);
    }

    pub fn encoding(&self) -> Option<ContentEncoding> {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: ContentEncoding) {
        self.encoding = Some(encoding);
    }

    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    /// Record a redirect target and stop the pipeline.
    pub fn redirect_to(&mut self, target: impl Into<String>) {
        self.redirect = Some(target.into());
        self.stop();
    }

    pub fn outgoing(&self) -> Option<&Outgoing> {
        self.outgoing.as_ref()
    }

    pub fn outgoing_mut(&mut self) -> Option<&mut Outgoing> {
        self.outgoing.as_mut()
    }

    pub fn set_outgoing(&mut self, outgoing: Outgoing) {
        self.outgoing = Some(outgoing);
    }

    pub fn take_outgoing(&mut self) -> Option<Outgoing> {
        self.outgoing.take()
    }

    /// `Set-Cookie` values sent with whatever response this request ends in.
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn add_cookie(&mut self, cookie: impl Into<String>) {
        self.cookies.push(cookie.into());
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        if key == PIPELINE_STOPPED {
            return Some(if self.stopped { &STOPPED } else { &RUNNING });
        }
        self.extensions.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == PIPELINE_STOPPED {
            self.stopped = value == Value::Bool(true);
            return;
        }
        self.extensions.insert(key, value);
    }

    pub fn has(&self, key: &str) -> bool {
        if key == PIPELINE_STOPPED {
            return self.stopped;
        }
        self.extensions.contains_key(key)
    }
}
