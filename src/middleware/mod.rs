//! Built-in application middleware.
//!
//! Enabled per deployment through `[[middleware]]` entries; both run in the
//! app pipeline, after the response has been built.

pub mod cors;
pub mod request_log;

pub use cors::Cors;
pub use request_log::RequestLog;
