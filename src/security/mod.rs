//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Security stage, per request:
//!     → csrf.rs + session.rs (token bound to session and user agent)
//!     → auth.rs (session user → remember token → API token)
//!     → auth.rs check_policy (status, roles)
//!     → failure: AccessDenial → redirect target, pipeline stopped
//!
//! Closure stage, per response:
//!     → headers.rs (hardening headers, strip disclosure headers)
//!     → csp.rs (Content-Security-Policy with the request nonce)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any failed check short-circuits to a redirect
//! - Token comparisons are constant time
//! - No trust in client input

pub mod auth;
pub mod csp;
pub mod csrf;
pub mod headers;
pub mod session;

use crate::config::RedirectConfig;

pub use auth::{check_policy, AuthMethod, Authenticated, Authenticator, MemoryUserProvider, User, UserProvider};
pub use csp::ContentSecurityPolicy;
pub use session::{session_cookie, CsrfGrant, MemorySessionStore, SessionManager, SessionStore};

/// Why the security stage refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    CsrfNotAjax,
    CsrfMissing,
    CsrfInvalid,
    Unauthenticated,
    Premoderation,
    Banned,
    StatusMissing,
    StatusMismatch,
    MissingRole,
}

impl AccessDenial {
    pub fn reason(self) -> &'static str {
        match self {
            AccessDenial::CsrfNotAjax => "csrf_not_ajax",
            AccessDenial::CsrfMissing => "csrf_missing",
            AccessDenial::CsrfInvalid => "csrf_invalid",
            AccessDenial::Unauthenticated => "unauthenticated",
            AccessDenial::Premoderation => "premoderation",
            AccessDenial::Banned => "banned",
            AccessDenial::StatusMissing => "status_missing",
            AccessDenial::StatusMismatch => "status_mismatch",
            AccessDenial::MissingRole => "missing_role",
        }
    }

    pub fn target(self, redirects: &RedirectConfig) -> &str {
        match self {
            AccessDenial::CsrfNotAjax
            | AccessDenial::CsrfMissing
            | AccessDenial::CsrfInvalid
            | AccessDenial::MissingRole => &redirects.forbidden,
            AccessDenial::Unauthenticated => &redirects.login,
            AccessDenial::Premoderation => &redirects.premoderation,
            AccessDenial::Banned => &redirects.banned,
            AccessDenial::StatusMissing | AccessDenial::StatusMismatch => &redirects.crash,
        }
    }
}
