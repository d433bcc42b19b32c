//! Server-side sessions.
//!
//! # Responsibilities
//! - Persist per-session user and CSRF state behind the `SessionStore` trait
//! - Validate a session user: realm, user agent, idle timeout; renew on success
//! - Issue and validate CSRF tokens bound to a session and user agent
//! - Sweep sessions whose user and CSRF token have both expired
//!
//! # Design Decisions
//! - Time comes from an injectable clock so expiry is testable
//! - A session that fails validation loses its user but keeps its id
//! - Logging in or issuing a CSRF token always moves the session to a fresh
//!   id; ids the store does not know are never adopted

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::config::SecurityConfig;
use crate::security::auth::User;
use crate::security::csrf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub realm: String,
    pub user: User,
    pub user_agent: String,
    pub last_activity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfSession {
    pub token: String,
    pub user_agent: String,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub csrf: Option<CsrfSession>,
}

impl SessionData {
    fn is_empty(&self) -> bool {
        self.user.is_none() && self.csrf.is_none()
    }
}

pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Option<SessionData>;
    fn save(&self, session_id: &str, data: SessionData);
    fn destroy(&self, session_id: &str);

    /// Let `keep` edit every session; drop those it returns `false` for.
    /// Returns the number of sessions dropped.
    fn retain(&self, keep: &dyn Fn(&mut SessionData) -> bool) -> usize;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, session_id: &str) -> Option<SessionData> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    fn save(&self, session_id: &str, data: SessionData) {
        self.sessions.insert(session_id.to_string(), data);
    }

    fn destroy(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn retain(&self, keep: &dyn Fn(&mut SessionData) -> bool) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, data| keep(data));
        before.saturating_sub(self.sessions.len())
    }
}

/// `Set-Cookie` value carrying a session id.
pub fn session_cookie(name: &str, session_id: &str) -> String {
    format!("{name}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    idle_timeout_secs: u64,
    csrf_ttl_secs: u64,
    clock: Clock,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: &SecurityConfig) -> Self {
        Self {
            store,
            idle_timeout_secs: config.session.idle_timeout_secs,
            csrf_ttl_secs: config.csrf.token_ttl_secs,
            clock: Arc::new(unix_now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Fresh random session identifier.
    pub fn new_session_id() -> String {
        csrf::generate_token()
    }

    /// Move the data of a known session to a new id and drop the old entry.
    fn regenerate(&self, previous: Option<&str>) -> (String, SessionData) {
        let data = match previous {
            Some(id) => {
                let data = self.store.load(id).unwrap_or_default();
                self.store.destroy(id);
                data
            }
            None => SessionData::default(),
        };
        (Self::new_session_id(), data)
    }

    /// Log `user` in and return the id of the session now holding them.
    pub fn start_user_session(
        &self,
        previous: Option<&str>,
        realm: &str,
        user: User,
        user_agent: &str,
    ) -> String {
        let (session_id, mut data) = self.regenerate(previous);
        data.user = Some(SessionUser {
            realm: realm.to_string(),
            user,
            user_agent: user_agent.to_string(),
            last_activity: (self.clock)(),
        });
        self.store.save(&session_id, data);
        tracing::debug!(realm = %realm, "Session user started");
        session_id
    }

    /// The session's user for `realm`, if the session is still valid.
    pub fn validate_user(&self, session_id: &str, realm: &str, user_agent: &str) -> Option<User> {
        let mut data = self.store.load(session_id)?;
        let session_user = data.user.as_mut()?;
        if session_user.realm != realm {
            return None;
        }

        let now = (self.clock)();
        let idle = now.saturating_sub(session_user.last_activity);
        if session_user.user_agent != user_agent || idle > self.idle_timeout_secs {
            tracing::debug!(realm = %realm, idle_secs = idle, "Session user rejected");
            data.user = None;
            self.store.save(session_id, data);
            return None;
        }

        session_user.last_activity = now;
        let user = session_user.user.clone();
        self.store.save(session_id, data);
        Some(user)
    }

    /// Issue a CSRF token, replacing any previous one, on a fresh session id.
    pub fn issue_csrf_token(&self, previous: Option<&str>, user_agent: &str) -> CsrfGrant {
        let (session_id, mut data) = self.regenerate(previous);
        let token = csrf::generate_token();
        data.csrf = Some(CsrfSession {
            token: token.clone(),
            user_agent: user_agent.to_string(),
            expires_at: (self.clock)() + self.csrf_ttl_secs,
        });
        self.store.save(&session_id, data);
        CsrfGrant { session_id, token }
    }

    pub fn validate_csrf(&self, session_id: &str, submitted: &str, user_agent: &str) -> bool {
        let Some(mut data) = self.store.load(session_id) else {
            return false;
        };
        let Some(session) = data.csrf.as_ref() else {
            return false;
        };

        if !csrf::tokens_match(&session.token, submitted) {
            return false;
        }
        if (self.clock)() > session.expires_at {
            data.csrf = None;
            self.store.save(session_id, data);
            return false;
        }
        session.user_agent == user_agent
    }

    pub fn end_session(&self, session_id: &str) {
        self.store.destroy(session_id);
    }

    /// Clear idle users and stale CSRF tokens; drop sessions left empty.
    pub fn purge_expired(&self) -> usize {
        let now = (self.clock)();
        let idle_timeout = self.idle_timeout_secs;
        let purged = self.store.retain(&|data| {
            if data
                .user
                .as_ref()
                .is_some_and(|u| now.saturating_sub(u.last_activity) > idle_timeout)
            {
                data.user = None;
            }
            if data.csrf.as_ref().is_some_and(|c| now > c.expires_at) {
                data.csrf = None;
            }
            !data.is_empty()
        });
        if purged > 0 {
            tracing::debug!(purged, "Expired sessions purged");
        }
        purged
    }
}

/// A CSRF token and the session id it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfGrant {
    pub session_id: String,
    pub token: String,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("csrf_ttl_secs", &self.csrf_ttl_secs)
            .finish_non_exhaustive()
    }
}
