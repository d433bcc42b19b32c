//! Authentication and access policy.
//!
//! # Responsibilities
//! - Identify the caller: session user, then remember-token cookie, then
//!   bearer API token
//! - Enforce account status and role requirements
//!
//! # Design Decisions
//! - User lookup is a trait; storage is somebody else's problem
//! - A remember-token login is promoted to a session user on a fresh id,
//!   which the caller must hand back to the client
//! - Status is only checked when the handler asks for one

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::handler::AuthRequirement;
use crate::http::request::RequestInfo;
use crate::security::session::SessionManager;
use crate::security::AccessDenial;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub status: String,
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: String::new(),
            status: String::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

pub trait UserProvider: Send + Sync {
    fn find_by_remember_token(&self, realm: &str, token: &str) -> Option<User>;
    fn find_by_api_token(&self, realm: &str, token: &str) -> Option<User>;
}

/// Token tables held in memory, keyed by realm and token.
#[derive(Debug, Default)]
pub struct MemoryUserProvider {
    remember_tokens: DashMap<(String, String), User>,
    api_tokens: DashMap<(String, String), User>,
}

impl MemoryUserProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_remember_token(&self, realm: &str, token: &str, user: User) {
        self.remember_tokens
            .insert((realm.to_string(), token.to_string()), user);
    }

    pub fn add_api_token(&self, realm: &str, token: &str, user: User) {
        self.api_tokens.insert((realm.to_string(), token.to_string()), user);
    }

    pub fn revoke_api_token(&self, realm: &str, token: &str) {
        self.api_tokens.remove(&(realm.to_string(), token.to_string()));
    }
}

impl UserProvider for MemoryUserProvider {
    fn find_by_remember_token(&self, realm: &str, token: &str) -> Option<User> {
        self.remember_tokens
            .get(&(realm.to_string(), token.to_string()))
            .map(|u| u.value().clone())
    }

    fn find_by_api_token(&self, realm: &str, token: &str) -> Option<User> {
        self.api_tokens
            .get(&(realm.to_string(), token.to_string()))
            .map(|u| u.value().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Session,
    RememberToken,
    ApiToken,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Session => "session",
            AuthMethod::RememberToken => "remember_token",
            AuthMethod::ApiToken => "api_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user: User,
    pub method: AuthMethod,
    /// Session id minted during this request; the client must switch to it.
    pub new_session: Option<String>,
}

pub struct Authenticator {
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserProvider>,
    session_cookie: String,
    remember_cookie: String,
}

impl Authenticator {
    pub fn new(sessions: Arc<SessionManager>, users: Arc<dyn UserProvider>, config: &SessionConfig) -> Self {
        Self {
            sessions,
            users,
            session_cookie: config.cookie_name.clone(),
            remember_cookie: config.remember_cookie.clone(),
        }
    }

    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    pub fn authenticate(&self, request: &RequestInfo, realm: &str) -> Option<Authenticated> {
        if let Some(user) = self.session_user(request, realm) {
            return Some(Authenticated {
                user,
                method: AuthMethod::Session,
                new_session: None,
            });
        }

        if let Some(token) = request.cookie(&self.remember_cookie).filter(|t| !t.is_empty()) {
            if let Some(user) = self.users.find_by_remember_token(realm, token) {
                let previous = request.cookie(&self.session_cookie).filter(|s| !s.is_empty());
                let session_id = self.sessions.start_user_session(
                    previous,
                    realm,
                    user.clone(),
                    request.user_agent(),
                );
                return Some(Authenticated {
                    user,
                    method: AuthMethod::RememberToken,
                    new_session: Some(session_id),
                });
            }
        }

        if let Some(token) = request.bearer_token() {
            if let Some(user) = self.users.find_by_api_token(realm, token) {
                return Some(Authenticated {
                    user,
                    method: AuthMethod::ApiToken,
                    new_session: None,
                });
            }
        }

        None
    }

    /// The user of the request's session in `realm`. Never logs anyone in.
    pub fn session_user(&self, request: &RequestInfo, realm: &str) -> Option<User> {
        let session_id = request.cookie(&self.session_cookie).filter(|s| !s.is_empty())?;
        self.sessions.validate_user(session_id, realm, request.user_agent())
    }
}

/// Status and role checks for an authenticated user.
pub fn check_policy(user: &User, requirement: &AuthRequirement) -> Result<(), AccessDenial> {
    if let Some(required) = &requirement.status {
        match user.status.as_str() {
            "premoderation" => return Err(AccessDenial::Premoderation),
            "banned" => return Err(AccessDenial::Banned),
            "" => return Err(AccessDenial::StatusMissing),
            status if status != required => return Err(AccessDenial::StatusMismatch),
            _ => {}
        }
    }

    if !requirement.roles.is_empty() {
        let allowed = if requirement.strict {
            requirement.roles.iter().all(|r| user.has_role(r))
        } else {
            requirement.roles.iter().any(|r| user.has_role(r))
        };
        if !allowed {
            return Err(AccessDenial::MissingRole);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::security::session::MemorySessionStore;
    use axum::http::Method;

    fn setup() -> (Authenticator, Arc<SessionManager>, Arc<MemoryUserProvider>) {
        let config = SecurityConfig::default();
        let sessions = Arc::new(SessionManager::new(Arc::new(MemorySessionStore::new()), &config));
        let users = Arc::new(MemoryUserProvider::new());
        let auth = Authenticator::new(sessions.clone(), users.clone(), &config.session);
        (auth, sessions, users)
    }

    fn bob() -> User {
        User::new(2, "Bob").with_status("active").with_roles(["editor"])
    }

    #[test]
    fn test_session_first() {
        let (auth, sessions, _) = setup();
        let sid = sessions.start_user_session(None, "users", bob(), "UA");
        let req = RequestInfo::new(Method::GET, "/")
            .with_header("Cookie", &format!("YADRO-SESSION={sid}"))
            .with_header("User-Agent", "UA");

        let found = auth.authenticate(&req, "users").unwrap();
        assert_eq!(found.user, bob());
        assert_eq!(found.method, AuthMethod::Session);
        assert!(found.new_session.is_none());
        assert_eq!(auth.session_user(&req, "users"), Some(bob()));
    }

    #[test]
    fn test_remember_token_promotes_to_fresh_session() {
        let (auth, sessions, users) = setup();
        users.add_remember_token("users", "rt", bob());
        let req = RequestInfo::new(Method::GET, "/")
            .with_header("Cookie", "YADRO-SESSION=planted; REMEMBER-TOKEN=rt")
            .with_header("User-Agent", "UA");

        let found = auth.authenticate(&req, "users").unwrap();
        assert_eq!(found.method, AuthMethod::RememberToken);
        let sid = found.new_session.unwrap();
        assert_ne!(sid, "planted");
        assert_eq!(sessions.validate_user(&sid, "users", "UA"), Some(bob()));
        assert!(sessions.validate_user("planted", "users", "UA").is_none());

        // Without any session cookie the promotion still happens
        let bare = RequestInfo::new(Method::GET, "/")
            .with_header("Cookie", "REMEMBER-TOKEN=rt")
            .with_header("User-Agent", "UA");
        assert!(auth.authenticate(&bare, "users").unwrap().new_session.is_some());
    }

    #[test]
    fn test_api_token_last() {
        let (auth, _, users) = setup();
        users.add_api_token("users", "api-1", bob());
        let req = RequestInfo::new(Method::GET, "/").with_header("Authorization", "Bearer api-1");
        assert_eq!(auth.authenticate(&req, "users").unwrap().method, AuthMethod::ApiToken);
        assert!(auth.session_user(&req, "users").is_none());

        // Tokens are per realm
        assert!(auth.authenticate(&req, "admins").is_none());
        assert!(auth.authenticate(&RequestInfo::new(Method::GET, "/"), "users").is_none());
    }

    #[test]
    fn test_status_policy() {
        let req = AuthRequirement::realm("users").status("active");
        assert_eq!(check_policy(&bob(), &req), Ok(()));
        assert_eq!(
            check_policy(&bob().with_status("premoderation"), &req),
            Err(AccessDenial::Premoderation)
        );
        assert_eq!(check_policy(&bob().with_status("banned"), &req), Err(AccessDenial::Banned));
        assert_eq!(check_policy(&bob().with_status(""), &req), Err(AccessDenial::StatusMissing));
        assert_eq!(
            check_policy(&bob().with_status("archived"), &req),
            Err(AccessDenial::StatusMismatch)
        );

        // No required status, no check
        assert_eq!(check_policy(&bob().with_status("banned"), &AuthRequirement::realm("users")), Ok(()));
    }

    #[test]
    fn test_role_policy() {
        let strict = AuthRequirement::realm("users").roles(["editor", "admin"]);
        assert_eq!(check_policy(&bob(), &strict), Err(AccessDenial::MissingRole));
        assert_eq!(check_policy(&bob().with_roles(["admin", "editor"]), &strict), Ok(()));

        let lenient = strict.clone().lenient();
        assert_eq!(check_policy(&bob(), &lenient), Ok(()));
        assert_eq!(check_policy(&bob().with_roles(["viewer"]), &lenient), Err(AccessDenial::MissingRole));
    }
}
