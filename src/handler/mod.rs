//! Handler subsystem.
//!
//! # Data Flow
//! ```text
//! Boot:
//!     HandlerEntry::new("Controller", "action", closure)
//!         .param(ParamSpec) .csrf(..) .auth(..)
//!     → HandlerRegistry (+ [[handlers]] config overrides)
//!
//! Per request:
//!     request stage  → registry lookup + params::bind → HandlerBinding
//!     handler stage  → HandlerEntry::call(HandlerContext) → HandlerResponse
//! ```
//!
//! # Design Decisions
//! - A registration-time table replaces runtime introspection of controllers
//! - Handlers are synchronous; the server runs the pipeline on a blocking worker

pub mod builtin;
pub mod params;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::bus::MessageBus;
use crate::http::request::RequestInfo;
use crate::routing::Route;
use crate::security::{SessionManager, User, UserProvider};

pub use params::{BindingError, ParamKind, ParamSpec, ParamValue, QueryParams};
pub use registry::{AuthRequirement, CsrfRequirement, HandlerEntry, HandlerRegistry, SecurityMetadata};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Message(message.into())
    }
}

/// Handler chosen for the request plus its bound parameters.
#[derive(Debug, Clone)]
pub struct HandlerBinding {
    pub entry: Arc<HandlerEntry>,
    pub params: BTreeMap<String, ParamValue>,
}

/// Collaborators handlers may reach, shared by the whole kernel.
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<SessionManager>,
    pub users: Arc<dyn UserProvider>,
}

/// Read-only view a handler gets of its request.
pub struct HandlerContext<'a> {
    bus: &'a MessageBus,
    params: &'a BTreeMap<String, ParamValue>,
    services: &'a Services,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        bus: &'a MessageBus,
        params: &'a BTreeMap<String, ParamValue>,
        services: &'a Services,
    ) -> Self {
        Self { bus, params, services }
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        self.params
    }

    pub fn request(&self) -> &RequestInfo {
        self.bus.request()
    }

    pub fn route(&self) -> &Route {
        self.bus.route()
    }

    pub fn user(&self) -> Option<&User> {
        self.bus.user()
    }

    pub fn request_id(&self) -> &str {
        self.bus.request_id()
    }

    pub fn csp_nonce(&self) -> &str {
        self.bus.csp_nonce()
    }

    /// Value an earlier middleware left on the bus.
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.bus.get(key)
    }

    pub fn services(&self) -> &Services {
        self.services
    }
}
