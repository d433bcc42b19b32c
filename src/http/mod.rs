//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http layers, request ID)
//!     → request.rs (RequestInfo snapshot: method, path, query, headers, body)
//!     → Kernel::handle on a blocking worker
//!     → compression.rs (gzip, applied by the response stage)
//!     → response.rs (Outgoing → axum Response)
//!     → Send to client
//! ```

pub mod compression;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestInfo, X_REQUEST_ID};
pub use response::Outgoing;
pub use server::HttpServer;
