//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::Method;
use tokio::net::TcpListener;

use yadro::config::parse_config;
use yadro::http::{Outgoing, RequestInfo};
use yadro::{demo, AppConfig, Components, HttpServer, Kernel, Shutdown};

/// Route table of the bundled demo application.
pub const DEMO_ROUTES: &str = r#"
[[routes]]
path = "/"
http_method = "GET"
controller = "Home"
controller_method = "index"

[[routes]]
path = "/login"
http_method = "GET"
controller = "Auth"
controller_method = "form"

[[routes]]
path = "/auth/login"
http_method = "POST"
controller = "Auth"
controller_method = "login"

[[routes]]
path = "/contact/{id}"
http_method = "GET"
controller = "ContactForm"
controller_method = "get"

[[routes]]
path = "/account"
http_method = "GET"
controller = "Account"
controller_method = "show"
"#;

pub fn demo_config() -> AppConfig {
    parse_config(DEMO_ROUTES).unwrap()
}

pub fn demo_kernel() -> Kernel {
    Kernel::boot(demo_config(), &Components::new(demo::registry())).unwrap()
}

pub fn get(target: &str) -> RequestInfo {
    RequestInfo::new(Method::GET, target)
}

/// Pull the session cookie value out of a `Set-Cookie` header.
pub fn session_cookie(outgoing: &Outgoing) -> String {
    let set_cookie = outgoing.header("set-cookie").unwrap();
    let pair = set_cookie.split(';').next().unwrap();
    pair.split_once('=').unwrap().1.to_string()
}

/// Pull the CSRF token out of the login form markup.
pub fn form_token(outgoing: &Outgoing) -> String {
    let body = outgoing.body_text();
    let start = body.find("value=\"").unwrap() + "value=\"".len();
    let end = body[start..].find('"').unwrap() + start;
    body[start..end].to_string()
}

/// A server bound to an ephemeral port on localhost.
pub struct TestServer {
    pub base_url: String,
    pub shutdown: Arc<Shutdown>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Boot `config` with `components` and serve it in the background.
pub async fn spawn_server(config: AppConfig, components: Components) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, components).unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, None, rx).await;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        shutdown,
    }
}

pub async fn spawn_demo() -> TestServer {
    spawn_server(demo_config(), Components::new(demo::registry())).await
}
