//! Sample application wired into the `yadro` binary and the CLI.
//!
//! Handlers:
//! - `Home::index`: landing page with a nonce-tagged inline script
//! - `Auth::form`: login form; issues a CSRF token on a fresh session
//! - `Auth::login`: CSRF-protected, AJAX-only; logs the demo user in and
//!   moves them to a new session id
//! - `ContactForm::get`: JSON lookup with an `int` route parameter
//! - `Account::show`: requires an authenticated, active user

use axum::http::header::SET_COOKIE;
use serde_json::json;

use crate::bus::HandlerResponse;
use crate::handler::{
    AuthRequirement, HandlerContext, HandlerEntry, HandlerError, HandlerRegistry, ParamKind,
    ParamSpec, ParamValue,
};
use crate::security::{session_cookie, User};

pub const REALM: &str = "users";
pub const SESSION_COOKIE: &str = "YADRO-SESSION";

pub fn demo_user() -> User {
    User::new(1, "demo")
        .with_email("demo@example.com")
        .with_status("active")
        .with_roles(["member"])
}

pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(HandlerEntry::new("Home", "index", home))
        .register(HandlerEntry::new("Auth", "form", login_form))
        .register(HandlerEntry::new("Auth", "login", login).csrf(true))
        .register(
            HandlerEntry::new("ContactForm", "get", contact)
                .param(ParamSpec::required("id", ParamKind::Int))
                .param(
                    ParamSpec::optional("lang", ParamKind::Str)
                        .with_default(ParamValue::Str("en".to_string())),
                ),
        )
        .register(
            HandlerEntry::new("Account", "show", account)
                .auth(AuthRequirement::realm(REALM).status("active").roles(["member"])),
        );
    registry
}

fn home(ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
    Ok(HandlerResponse::view(format!(
        "<h1>yadro</h1><script nonce=\"{}\">console.log(\"ready\")</script>",
        ctx.csp_nonce()
    )))
}

fn login_form(ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
    let request = ctx.request();
    let previous = request.cookie(SESSION_COOKIE).filter(|s| !s.is_empty());
    let grant = ctx
        .services()
        .sessions
        .issue_csrf_token(previous, request.user_agent());

    Ok(HandlerResponse::view(format!(
        "<form method=\"post\" action=\"/auth/login\"><input type=\"hidden\" name=\"_token\" value=\"{}\"></form>",
        grant.token
    ))
    .with_header(SET_COOKIE.as_str(), &session_cookie(SESSION_COOKIE, &grant.session_id)))
}

fn login(ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
    let request = ctx.request();
    let previous = request
        .cookie(SESSION_COOKIE)
        .ok_or_else(|| HandlerError::msg("login without a session cookie"))?;
    let user = demo_user();
    let session_id = ctx.services().sessions.start_user_session(
        Some(previous),
        REALM,
        user.clone(),
        request.user_agent(),
    );
    Ok(HandlerResponse::success(json!({ "user": user.name }))
        .with_header(SET_COOKIE.as_str(), &session_cookie(SESSION_COOKIE, &session_id)))
}

fn contact(ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
    let id = ctx
        .param("id")
        .and_then(ParamValue::as_int)
        .ok_or_else(|| HandlerError::msg("id not bound"))?;
    let lang = ctx.param("lang").and_then(ParamValue::as_str).unwrap_or("en");
    Ok(HandlerResponse::success(json!({ "id": id, "lang": lang })))
}

fn account(ctx: &HandlerContext<'_>) -> Result<HandlerResponse, HandlerError> {
    let user = ctx
        .user()
        .ok_or_else(|| HandlerError::msg("no authenticated user"))?;
    Ok(HandlerResponse::success(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
    })))
}
