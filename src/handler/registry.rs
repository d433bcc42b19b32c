//! Registration-time handler table.
//!
//! # Responsibilities
//! - Map `Controller::action` to a callable plus its declared parameters
//! - Hold each handler's security metadata (CSRF, auth policy)
//! - Apply security overrides declared in the config file
//!
//! # Design Decisions
//! - Handlers are plain closures registered with builder calls
//! - Entries are `Arc`-shared; a kernel reload clones the table cheaply
//! - Config overrides replace builder metadata per section (csrf, auth)

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bus::HandlerResponse;
use crate::config::HandlerSecurityConfig;
use crate::handler::params::ParamSpec;
use crate::handler::{HandlerContext, HandlerError};
use crate::routing::HandlerRef;

pub type HandlerFn = dyn Fn(&HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfRequirement {
    pub ajax_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequirement {
    pub realm: String,
    pub roles: Vec<String>,
    /// `None` skips the status check.
    pub status: Option<String>,
    pub strict: bool,
}

impl AuthRequirement {
    pub fn realm(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            roles: Vec::new(),
            status: None,
            strict: true,
        }
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityMetadata {
    pub csrf: Option<CsrfRequirement>,
    pub auth: Option<AuthRequirement>,
}

impl SecurityMetadata {
    pub fn is_empty(&self) -> bool {
        self.csrf.is_none() && self.auth.is_none()
    }
}

#[derive(Clone)]
pub struct HandlerEntry {
    reference: HandlerRef,
    params: Vec<ParamSpec>,
    security: SecurityMetadata,
    func: Arc<HandlerFn>,
}

impl HandlerEntry {
    pub fn new<F>(controller: &str, action: &str, func: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> + Send + Sync + 'static,
    {
        Self {
            reference: HandlerRef::new(controller, action),
            params: Vec::new(),
            security: SecurityMetadata::default(),
            func: Arc::new(func),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn csrf(mut self, ajax_only: bool) -> Self {
        self.security.csrf = Some(CsrfRequirement { ajax_only });
        self
    }

    pub fn auth(mut self, requirement: AuthRequirement) -> Self {
        self.security.auth = Some(requirement);
        self
    }

    pub fn reference(&self) -> &HandlerRef {
        &self.reference
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn security(&self) -> &SecurityMetadata {
        &self.security
    }

    pub fn call(&self, ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("reference", &self.reference)
            .field("params", &self.params)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    entries: HashMap<HandlerRef, Arc<HandlerEntry>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a second registration under the same name replaces the first.
    pub fn register(&mut self, entry: HandlerEntry) -> &mut Self {
        let key = entry.reference.clone();
        if self.entries.insert(key.clone(), Arc::new(entry)).is_some() {
            tracing::warn!(handler = %key, "Handler registered twice, keeping the later one");
        }
        self
    }

    pub fn get(&self, reference: &HandlerRef) -> Option<Arc<HandlerEntry>> {
        self.entries.get(reference).cloned()
    }

    pub fn contains(&self, reference: &HandlerRef) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace builder metadata with `[[handlers]]` config entries.
    pub fn apply_security(&mut self, overrides: &[HandlerSecurityConfig]) {
        for entry in overrides {
            let reference: HandlerRef = match entry.handler.parse() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring handler security entry");
                    continue;
                }
            };
            let Some(slot) = self.entries.get_mut(&reference) else {
                tracing::warn!(handler = %reference, "Security entry names an unregistered handler");
                continue;
            };

            let handler = Arc::make_mut(slot);
            if let Some(csrf) = &entry.csrf {
                handler.security.csrf = Some(CsrfRequirement {
                    ajax_only: csrf.ajax_only,
                });
            }
            if let Some(auth) = &entry.auth {
                handler.security.auth = Some(AuthRequirement {
                    realm: auth.realm.clone(),
                    roles: auth.roles.clone(),
                    status: Some(auth.status.clone()).filter(|s| !s.is_empty()),
                    strict: auth.strict,
                });
            }
            tracing::debug!(handler = %reference, "Applied config security metadata");
        }
    }
}
