//! Message bus subsystem.
//!
//! # Data Flow
//! ```text
//! Router::init_message_bus
//!     → MessageBus { request id, time, request, route }
//!     → request stage   (headers, binding)
//!     → security stage  (security metadata, user | redirect + stop)
//!     → handler stage   (HandlerResponse)
//!     → compression     (encoding)
//!     → response stage  (Outgoing)
//!     → app middleware, closure stage (Outgoing rewritten in place)
//!     → Kernel turns it into the HTTP answer
//! ```
//!
//! # Design Decisions
//! - Well-known values are typed fields; everything else is a JSON extension map
//! - One bus per request, owned by that request's pipeline run

pub mod message;
pub mod response;

pub use message::{MessageBus, PIPELINE_STOPPED};
pub use response::{HandlerResponse, ResponseBody, ResponseKind};
