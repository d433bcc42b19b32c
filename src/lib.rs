//! yadro: routing and middleware pipeline kernel for web applications.
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP request
//!       → http::server (axum fallback, tower-http layers, blocking worker)
//!       → Kernel::handle
//!           → Router::init_message_bus (resolve route, fresh MessageBus)
//!           → CombinedPipeline
//!               core:    request 100 → security 90 → handler 80
//!                        → compression 70 → response 60
//!               app:     configured middleware (request_log, cors, ...)
//!               closure: response contract + output hardening
//!           → redirect (302) or the Outgoing the stages built
//!   HTTP response
//! ```
//!
//! Cross-cutting: `config` (TOML, validation, hot reload), `observability`
//! (tracing, Prometheus metrics), `lifecycle` (startup, signals, shutdown).

pub mod bus;
pub mod config;
pub mod demo;
pub mod handler;
pub mod http;
pub mod kernel;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod security;
pub mod stages;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use kernel::{BootError, Components, Kernel};
pub use lifecycle::Shutdown;
