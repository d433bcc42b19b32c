//! Core pipeline stages.
//!
//! # Data Flow
//! ```text
//! request (100)     handler lookup, header allow-list, parameter binding
//! security (90)     CSRF, authentication, status and role policy
//! handler (80)      invoke the bound handler → HandlerResponse
//! compression (70)  negotiate deferred gzip
//! response (60)     render HandlerResponse → Outgoing
//!
//! closure (own pipeline, last)
//!                   response contract, sanitization, security headers
//! ```
//!
//! # Design Decisions
//! - Each stage checks that the previous one left what it needs on the bus
//!   and fails with `MissingState` otherwise
//! - Security refusals redirect and stop; they are not errors

pub mod closure;
pub mod compression;
pub mod handler;
pub mod request;
pub mod response;
pub mod security;

pub use closure::{ClosureStage, ClosureViolation};
pub use compression::CompressionStage;
pub use handler::HandlerStage;
pub use request::RequestStage;
pub use response::ResponseStage;
pub use security::SecurityStage;

pub const REQUEST_PRIORITY: i32 = 100;
pub const SECURITY_PRIORITY: i32 = 90;
pub const HANDLER_PRIORITY: i32 = 80;
pub const COMPRESSION_PRIORITY: i32 = 70;
pub const RESPONSE_PRIORITY: i32 = 60;
