//! Security stage: CSRF, authentication and access policy.
//!
//! # Responsibilities
//! - Enforce the handler's CSRF requirement against the session token
//! - Authenticate the caller in the handler's realm
//! - Apply the status and role policy; attach the user to the bus
//! - Record `user_authenticated` on every request; handlers without an auth
//!   requirement see the session user of the default realm, if any
//!
//! # Design Decisions
//! - A refusal records a redirect and stops the bus; nothing is raised
//! - A session minted during authentication goes out as a `Set-Cookie`,
//!   refusals included

use std::sync::Arc;

use crate::bus::MessageBus;
use crate::config::{RedirectConfig, SessionConfig};
use crate::handler::CsrfRequirement;
use crate::observability::metrics;
use crate::pipeline::{Middleware, PipelineError};
use crate::security::csrf::TOKEN_HEADERS;
use crate::security::{
    check_policy, session_cookie, AccessDenial, Authenticator, SessionManager, User, UserProvider,
};

pub struct SecurityStage {
    sessions: Arc<SessionManager>,
    authenticator: Authenticator,
    default_realm: String,
    redirects: RedirectConfig,
}

impl SecurityStage {
    pub const ID: &'static str = "security";

    pub fn new(
        sessions: Arc<SessionManager>,
        users: Arc<dyn UserProvider>,
        session: &SessionConfig,
        redirects: RedirectConfig,
    ) -> Self {
        Self {
            authenticator: Authenticator::new(sessions.clone(), users, session),
            sessions,
            default_realm: session.default_realm.clone(),
            redirects,
        }
    }

    fn check_csrf(&self, bus: &MessageBus, rule: &CsrfRequirement) -> Result<(), AccessDenial> {
        let request = bus.request();
        if rule.ajax_only && !request.is_ajax() {
            return Err(AccessDenial::CsrfNotAjax);
        }

        let token = TOKEN_HEADERS
            .iter()
            .filter_map(|name| bus.headers().get(*name))
            .filter_map(|v| v.to_str().ok())
            .find(|v| !v.is_empty())
            .ok_or(AccessDenial::CsrfMissing)?;

        let session_id = request
            .cookie(self.authenticator.session_cookie())
            .ok_or(AccessDenial::CsrfInvalid)?;

        if self
            .sessions
            .validate_csrf(session_id, token, request.user_agent())
        {
            Ok(())
        } else {
            Err(AccessDenial::CsrfInvalid)
        }
    }

    fn deny(&self, bus: &mut MessageBus, denial: AccessDenial) {
        let target = denial.target(&self.redirects).to_string();
        tracing::warn!(
            request_id = %bus.request_id(),
            handler = %bus.route().handler(),
            reason = denial.reason(),
            redirect = %target,
            "Request refused"
        );
        metrics::record_short_circuit(denial.reason());
        bus.redirect_to(target);
    }

    fn attach_user(bus: &mut MessageBus, user: Option<User>) {
        bus.set("user_authenticated", user.is_some());
        if let Some(user) = user {
            bus.set("user_id", user.id);
            bus.set_user(user);
        }
    }
}

impl Middleware for SecurityStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let meta = bus
            .security()
            .cloned()
            .ok_or(PipelineError::MissingState {
                stage: Self::ID,
                requires: "handler security metadata",
            })?;

        if let Some(rule) = &meta.csrf {
            if let Err(denial) = self.check_csrf(bus, rule) {
                self.deny(bus, denial);
                return Ok(());
            }
        }

        let Some(requirement) = &meta.auth else {
            let user = self
                .authenticator
                .session_user(bus.request(), &self.default_realm);
            Self::attach_user(bus, user);
            return Ok(());
        };

        let Some(found) = self.authenticator.authenticate(bus.request(), &requirement.realm) else {
            bus.set("user_authenticated", false);
            self.deny(bus, AccessDenial::Unauthenticated);
            return Ok(());
        };
        if let Some(session_id) = &found.new_session {
            bus.add_cookie(session_cookie(self.authenticator.session_cookie(), session_id));
        }
        if let Err(denial) = check_policy(&found.user, requirement) {
            self.deny(bus, denial);
            return Ok(());
        }

        tracing::debug!(
            request_id = %bus.request_id(),
            user_id = found.user.id,
            realm = %requirement.realm,
            method = found.method.as_str(),
            "Authenticated"
        );
        bus.set("auth_method", found.method.as_str());
        Self::attach_user(bus, Some(found.user));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::handler::{AuthRequirement, SecurityMetadata};
    use crate::http::request::RequestInfo;
    use crate::routing::{HandlerRef, Route};
    use crate::security::{MemorySessionStore, MemoryUserProvider, User};
    use crate::stages::request::filter_headers;
    use axum::http::Method;

    struct Fixture {
        stage: SecurityStage,
        sessions: Arc<SessionManager>,
        users: Arc<MemoryUserProvider>,
    }

    fn fixture() -> Fixture {
        let config = SecurityConfig::default();
        let sessions = Arc::new(SessionManager::new(Arc::new(MemorySessionStore::new()), &config));
        let users = Arc::new(MemoryUserProvider::new());
        let stage = SecurityStage::new(
            sessions.clone(),
            users.clone(),
            &config.session,
            config.redirects.clone(),
        );
        Fixture { stage, sessions, users }
    }

    fn bus(request: RequestInfo, meta: SecurityMetadata) -> MessageBus {
        let headers = filter_headers(request.headers());
        let mut bus = MessageBus::new(request, Route::new("/x", Method::POST, HandlerRef::new("Form", "submit")));
        bus.set_headers(headers);
        bus.set_security(meta);
        bus
    }

    fn csrf(ajax_only: bool) -> SecurityMetadata {
        SecurityMetadata {
            csrf: Some(CsrfRequirement { ajax_only }),
            auth: None,
        }
    }

    #[test]
    fn test_no_metadata_passes() {
        let f = fixture();
        let mut bus = bus(RequestInfo::new(Method::GET, "/x"), SecurityMetadata::default());
        f.stage.process(&mut bus).unwrap();
        assert!(!bus.is_stopped());
    }

    #[test]
    fn test_csrf_missing_token_redirects() {
        let f = fixture();
        let mut bus = bus(RequestInfo::new(Method::POST, "/x"), csrf(false));
        f.stage.process(&mut bus).unwrap();
        assert!(bus.is_stopped());
        assert_eq!(bus.redirect(), Some("/error_403"));
    }

    #[test]
    fn test_csrf_ajax_only() {
        let f = fixture();
        let grant = f.sessions.issue_csrf_token(None, "UA");
        let request = RequestInfo::new(Method::POST, "/x")
            .with_header("Cookie", &format!("YADRO-SESSION={}", grant.session_id))
            .with_header("User-Agent", "UA")
            .with_header("X-CSRF-TOKEN", &grant.token);

        let mut refused = bus(request.clone(), csrf(true));
        f.stage.process(&mut refused).unwrap();
        assert_eq!(refused.redirect(), Some("/error_403"));

        let mut accepted = bus(request.with_header("X-Requested-With", "XMLHttpRequest"), csrf(true));
        f.stage.process(&mut accepted).unwrap();
        assert!(!accepted.is_stopped());
    }

    #[test]
    fn test_csrf_xsrf_header_and_agent_binding() {
        let f = fixture();
        let grant = f.sessions.issue_csrf_token(None, "UA");
        let request = RequestInfo::new(Method::POST, "/x")
            .with_header("Cookie", &format!("YADRO-SESSION={}", grant.session_id))
            .with_header("X-XSRF-TOKEN", &grant.token);

        let mut ok = bus(request.clone().with_header("User-Agent", "UA"), csrf(false));
        f.stage.process(&mut ok).unwrap();
        assert!(!ok.is_stopped());

        let mut other_agent = bus(request.with_header("User-Agent", "Other"), csrf(false));
        f.stage.process(&mut other_agent).unwrap();
        assert_eq!(other_agent.redirect(), Some("/error_403"));
    }

    #[test]
    fn test_unauthenticated_goes_to_login() {
        let f = fixture();
        let meta = SecurityMetadata {
            csrf: None,
            auth: Some(AuthRequirement::realm("users")),
        };
        let mut bus = bus(RequestInfo::new(Method::GET, "/x"), meta);
        f.stage.process(&mut bus).unwrap();
        assert_eq!(bus.redirect(), Some("/login"));
        assert!(bus.user().is_none());
        assert_eq!(bus.get("user_authenticated"), Some(&serde_json::Value::Bool(false)));
    }

    #[test]
    fn test_authenticated_user_attached() {
        let f = fixture();
        let user = User::new(7, "Carol").with_status("active").with_roles(["admin"]);
        f.users.add_api_token("users", "tok", user.clone());
        let meta = SecurityMetadata {
            csrf: None,
            auth: Some(AuthRequirement::realm("users").status("active").roles(["admin"])),
        };
        let mut bus = bus(
            RequestInfo::new(Method::GET, "/x").with_header("Authorization", "Bearer tok"),
            meta,
        );
        f.stage.process(&mut bus).unwrap();
        assert!(!bus.is_stopped());
        assert_eq!(bus.user(), Some(&user));
        assert_eq!(bus.get("auth_method"), Some(&serde_json::Value::from("api_token")));
        assert_eq!(bus.get("user_authenticated"), Some(&serde_json::Value::Bool(true)));
        assert!(bus.cookies().is_empty());
    }

    #[test]
    fn test_session_user_recorded_without_auth_requirement() {
        let f = fixture();
        let mut anonymous = bus(RequestInfo::new(Method::GET, "/x"), SecurityMetadata::default());
        f.stage.process(&mut anonymous).unwrap();
        assert_eq!(anonymous.get("user_authenticated"), Some(&serde_json::Value::Bool(false)));
        assert!(anonymous.user().is_none());

        let user = User::new(3, "Dana").with_status("active");
        let sid = f.sessions.start_user_session(None, "users", user.clone(), "UA");
        let request = RequestInfo::new(Method::GET, "/x")
            .with_header("Cookie", &format!("YADRO-SESSION={sid}"))
            .with_header("User-Agent", "UA");
        let mut known = bus(request, SecurityMetadata::default());
        f.stage.process(&mut known).unwrap();
        assert!(!known.is_stopped());
        assert_eq!(known.get("user_authenticated"), Some(&serde_json::Value::Bool(true)));
        assert_eq!(known.get("user_id"), Some(&serde_json::Value::from(3)));
        assert_eq!(known.user(), Some(&user));
    }

    #[test]
    fn test_remember_token_login_sets_fresh_session_cookie() {
        let f = fixture();
        let user = User::new(4, "Eve").with_status("active");
        f.users.add_remember_token("users", "rt", user.clone());
        let meta = SecurityMetadata {
            csrf: None,
            auth: Some(AuthRequirement::realm("users")),
        };
        let request = RequestInfo::new(Method::GET, "/x")
            .with_header("Cookie", "YADRO-SESSION=planted; REMEMBER-TOKEN=rt")
            .with_header("User-Agent", "UA");

        let mut bus = bus(request, meta);
        f.stage.process(&mut bus).unwrap();
        assert_eq!(bus.user(), Some(&user));
        assert_eq!(bus.cookies().len(), 1);

        let cookie = &bus.cookies()[0];
        let sid = cookie
            .strip_prefix("YADRO-SESSION=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert_ne!(sid, "planted");
        assert_eq!(f.sessions.validate_user(sid, "users", "UA"), Some(user));
        assert!(f.sessions.validate_user("planted", "users", "UA").is_none());
    }

    #[test]
    fn test_policy_redirects() {
        let f = fixture();
        f.users.add_api_token("users", "banned", User::new(1, "B").with_status("banned"));
        f.users.add_api_token("users", "viewer", User::new(2, "V").with_status("active").with_roles(["viewer"]));
        let meta = SecurityMetadata {
            csrf: None,
            auth: Some(AuthRequirement::realm("users").status("active").roles(["admin"])),
        };

        let mut banned = bus(
            RequestInfo::new(Method::GET, "/x").with_header("Authorization", "Bearer banned"),
            meta.clone(),
        );
        f.stage.process(&mut banned).unwrap();
        assert_eq!(banned.redirect(), Some("/ban_info"));

        let mut viewer = bus(
            RequestInfo::new(Method::GET, "/x").with_header("Authorization", "Bearer viewer"),
            meta,
        );
        f.stage.process(&mut viewer).unwrap();
        assert_eq!(viewer.redirect(), Some("/error_403"));
    }

    #[test]
    fn test_requires_request_stage() {
        let f = fixture();
        let mut bus = MessageBus::new(
            RequestInfo::new(Method::GET, "/x"),
            Route::new("/x", Method::GET, HandlerRef::new("Form", "submit")),
        );
        assert!(matches!(
            f.stage.process(&mut bus),
            Err(PipelineError::MissingState { .. })
        ));
    }
}
