//! End-to-end request scenarios run directly against a booted kernel.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use yadro::bus::HandlerResponse;
use yadro::config::parse_config;
use yadro::handler::{HandlerEntry, HandlerRegistry};
use yadro::http::RequestInfo;
use yadro::pipeline::PipelineError;
use yadro::security::session::unix_now;
use yadro::security::{MemorySessionStore, MemoryUserProvider, SessionManager};
use yadro::{demo, Components, Kernel};

use common::{demo_kernel, form_token, get, session_cookie, DEMO_ROUTES};

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_unknown_path_and_wrong_method() {
    let kernel = demo_kernel();

    let missing = kernel.handle(get("/nonexistent"));
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert!(missing.body_text().contains("404"));

    let wrong_method = kernel.handle(RequestInfo::new(Method::POST, "/"));
    assert_eq!(wrong_method.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(wrong_method.body_text().contains("405"));
}

#[test]
fn test_ajax_wrong_method_is_406_json() {
    let kernel = demo_kernel();
    let out = kernel.handle(
        RequestInfo::new(Method::DELETE, "/").with_header("X-Requested-With", "XMLHttpRequest"),
    );
    assert_eq!(out.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(out.header("content-type"), Some("application/json"));
    assert_eq!(json_body(&out.body_text())["status"], json!("error"));
}

#[test]
fn test_dynamic_route_binds_typed_params() {
    let kernel = demo_kernel();

    let out = kernel.handle(get("/contact/42?lang=de"));
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(out.body_text(), r#"{"data":{"id":42,"lang":"de"},"status":"success"}"#);

    let defaulted = kernel.handle(get("/contact/7"));
    assert_eq!(json_body(&defaulted.body_text())["data"]["lang"], json!("en"));
}

#[test]
fn test_uncoercible_param_aborts_pipeline() {
    let kernel = demo_kernel();
    assert!(matches!(
        kernel.try_handle(get("/contact/abc")),
        Err(PipelineError::Binding(_))
    ));
    let out = kernel.handle(get("/contact/abc"));
    assert_eq!(out.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(out.body.is_empty());
}

#[test]
fn test_view_carries_nonce_in_csp() {
    let kernel = demo_kernel();
    let bus = kernel.try_handle(get("/")).unwrap();
    let nonce = bus.csp_nonce().to_string();
    let out = bus.outgoing().unwrap();

    assert!(out.body_text().contains(&format!("nonce=\"{nonce}\"")));
    let csp = out.header("content-security-policy").unwrap();
    assert!(csp.contains(&format!("'nonce-{nonce}'")));
    assert_eq!(out.header("x-frame-options"), Some("DENY"));
}

#[test]
fn test_csrf_short_circuits_before_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut handlers = HandlerRegistry::new();
    handlers.register(
        HandlerEntry::new("Form", "submit", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerResponse::success(json!("saved")))
        })
        .csrf(false),
    );
    let config = parse_config(
        r#"
        [[routes]]
        path = "/submit"
        http_method = "POST"
        controller = "Form"
        controller_method = "submit"
        "#,
    )
    .unwrap();
    let kernel = Kernel::boot(config, &Components::new(handlers)).unwrap();

    let no_token = kernel.handle(RequestInfo::new(Method::POST, "/submit"));
    assert_eq!(no_token.status, StatusCode::FOUND);
    assert_eq!(no_token.header("location"), Some("/error_403"));
    assert_eq!(no_token.header("x-content-type-options"), Some("nosniff"));

    let bad_token = kernel.handle(
        RequestInfo::new(Method::POST, "/submit")
            .with_header("Cookie", "YADRO-SESSION=abc")
            .with_header("X-CSRF-TOKEN", "forged"),
    );
    assert_eq!(bad_token.header("location"), Some("/error_403"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let grant = kernel.services().sessions.issue_csrf_token(None, "");
    let accepted = kernel.handle(
        RequestInfo::new(Method::POST, "/submit")
            .with_header("Cookie", &format!("YADRO-SESSION={}", grant.session_id))
            .with_header("X-XSRF-TOKEN", &grant.token),
    );
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_login_flow_unlocks_account() {
    let kernel = demo_kernel();

    let anonymous = kernel.handle(get("/account"));
    assert_eq!(anonymous.status, StatusCode::FOUND);
    assert_eq!(anonymous.header("location"), Some("/login"));

    let form = kernel.handle(get("/login"));
    assert_eq!(form.status, StatusCode::OK);
    let session = session_cookie(&form);
    let token = form_token(&form);
    let cookie = format!("YADRO-SESSION={session}");

    // The login action only accepts AJAX submissions.
    let plain = kernel.handle(
        RequestInfo::new(Method::POST, "/auth/login")
            .with_header("Cookie", &cookie)
            .with_header("X-CSRF-TOKEN", &token),
    );
    assert_eq!(plain.header("location"), Some("/error_403"));

    let login = kernel.handle(
        RequestInfo::new(Method::POST, "/auth/login")
            .with_header("Cookie", &cookie)
            .with_header("X-CSRF-TOKEN", &token)
            .with_header("X-Requested-With", "XMLHttpRequest"),
    );
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(json_body(&login.body_text())["data"]["user"], json!("demo"));

    // Logging in moves the user to a new session id
    let renewed = session_cookie(&login);
    assert_ne!(renewed, session);
    let stale = kernel.handle(get("/account").with_header("Cookie", &cookie));
    assert_eq!(stale.header("location"), Some("/login"));

    let account = kernel.handle(get("/account").with_header("Cookie", &format!("YADRO-SESSION={renewed}")));
    assert_eq!(account.status, StatusCode::OK);
    let body = json_body(&account.body_text());
    assert_eq!(body["data"]["name"], json!("demo"));
    assert_eq!(body["data"]["email"], json!("demo@example.com"));
}

#[test]
fn test_planted_session_id_gains_nothing_from_login() {
    let kernel = demo_kernel();
    let planted = "YADRO-SESSION=attacker-chosen-id";

    let form = kernel.handle(get("/login").with_header("Cookie", planted));
    let session = session_cookie(&form);
    assert_ne!(session, "attacker-chosen-id");

    let login = kernel.handle(
        RequestInfo::new(Method::POST, "/auth/login")
            .with_header("Cookie", &format!("YADRO-SESSION={session}"))
            .with_header("X-CSRF-TOKEN", &form_token(&form))
            .with_header("X-Requested-With", "XMLHttpRequest"),
    );
    assert_eq!(login.status, StatusCode::OK);

    let hijack = kernel.handle(get("/account").with_header("Cookie", planted));
    assert_eq!(hijack.status, StatusCode::FOUND);
    assert_eq!(hijack.header("location"), Some("/login"));
}

#[test]
fn test_remember_token_hands_out_fresh_session() {
    let users = Arc::new(MemoryUserProvider::new());
    users.add_remember_token(demo::REALM, "rt-1", demo::demo_user());
    let mut components = Components::new(demo::registry());
    components.users = users;
    let kernel = Kernel::boot(common::demo_config(), &components).unwrap();

    let first = kernel.handle(get("/account").with_header("Cookie", "YADRO-SESSION=planted; REMEMBER-TOKEN=rt-1"));
    assert_eq!(first.status, StatusCode::OK);
    let session = session_cookie(&first);
    assert_ne!(session, "planted");

    // The new session alone is enough from here on
    let second = kernel.handle(get("/account").with_header("Cookie", &format!("YADRO-SESSION={session}")));
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.header("set-cookie").is_none());

    let planted = kernel.handle(get("/account").with_header("Cookie", "YADRO-SESSION=planted"));
    assert_eq!(planted.header("location"), Some("/login"));
}

#[test]
fn test_anonymous_form_loads_are_swept() {
    let store = Arc::new(MemorySessionStore::new());
    let mut components = Components::new(demo::registry());
    components.sessions = store.clone();
    let kernel = Kernel::boot(common::demo_config(), &components).unwrap();

    // A returning client keeps swapping one session for the next
    let mut session = session_cookie(&kernel.handle(get("/login")));
    for _ in 0..50 {
        let form = kernel.handle(get("/login").with_header("Cookie", &format!("YADRO-SESSION={session}")));
        session = session_cookie(&form);
    }
    assert_eq!(store.len(), 1);

    // Arbitrary cookie values each get their own fresh session
    for i in 0..200 {
        kernel.handle(get("/login").with_header("Cookie", &format!("YADRO-SESSION=made-up-{i}")));
    }
    assert_eq!(store.len(), 201);
    assert_eq!(kernel.services().sessions.purge_expired(), 0);

    // Once the CSRF tokens lapse, the sweep clears the store
    let later = unix_now() + kernel.config().security.csrf.token_ttl_secs + 1;
    let sweeper = SessionManager::new(store.clone(), &kernel.config().security)
        .with_clock(Arc::new(move || later));
    assert_eq!(sweeper.purge_expired(), 201);
    assert!(store.is_empty());
}

fn kernel_with(handler: HandlerEntry) -> Kernel {
    let mut handlers = HandlerRegistry::new();
    handlers.register(handler);
    let config = parse_config(
        r#"
        [[routes]]
        path = "/api/item"
        http_method = "GET"
        controller = "Item"
        controller_method = "show"
        "#,
    )
    .unwrap();
    Kernel::boot(config, &Components::new(handlers)).unwrap()
}

#[test]
fn test_api_strings_are_sanitized() {
    let kernel = kernel_with(HandlerEntry::new("Item", "show", |_| {
        Ok(HandlerResponse::success(json!({ "title": "  <b>bold</b> & co\r\n " })))
    }));
    let out = kernel.handle(get("/api/item"));
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(json_body(&out.body_text())["data"]["title"], json!("bold &amp; co"));
}

#[test]
fn test_contract_violation_becomes_generic_error() {
    let kernel = kernel_with(HandlerEntry::new("Item", "show", |_| {
        Ok(HandlerResponse::json(json!({ "status": "success", "debug": "stack trace" })))
    }));
    let out = kernel.handle(get("/api/item"));
    assert_eq!(out.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(&out.body_text());
    assert_eq!(body["errors"][0]["code"], json!("SECURITY_ERROR"));
    assert!(!out.body_text().contains("stack trace"));
}

#[test]
fn test_disallowed_content_becomes_generic_error() {
    let kernel = kernel_with(HandlerEntry::new("Item", "show", |_| {
        Ok(HandlerResponse::success(json!({ "link": "javascript:alert(1)" })))
    }));
    let out = kernel.handle(get("/api/item"));
    assert_eq!(out.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&out.body_text())["status"], json!("error"));
}

#[test]
fn test_app_middleware_adds_cors_headers() {
    let toml = format!(
        "{DEMO_ROUTES}\n{}",
        r#"
        [[middleware]]
        name = "cors"
        config = { allowed_origins = ["https://app.example.com"], allowed_methods = ["GET"] }

        [[middleware]]
        name = "unknown_thing"
        "#
    );
    let config = parse_config(&toml).unwrap();
    let kernel = Kernel::boot(config, &Components::new(yadro::demo::registry())).unwrap();
    assert_eq!(kernel.pipeline().statistics().stages[1].middleware, ["cors"]);

    let allowed = kernel.handle(get("/").with_header("Origin", "https://app.example.com"));
    assert_eq!(
        allowed.header("access-control-allow-origin"),
        Some("https://app.example.com")
    );
    assert!(allowed.header("content-security-policy").is_some());

    let other = kernel.handle(get("/").with_header("Origin", "https://evil.example"));
    assert!(other.header("access-control-allow-origin").is_none());
}
