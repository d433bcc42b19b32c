//! Middleware pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Kernel::handle
//!     → CombinedPipeline (combined.rs)
//!         → core:    MiddlewarePipeline (priority.rs)
//!                    request 100 → security 90 → handler 80
//!                    → compression 70 → response 60
//!         → app:     AppPipeline (app.rs), built from [[middleware]]
//!         → closure: closing validation stage
//!
//! After every middleware and between stages:
//!     bus stopped? → return immediately
//! ```
//!
//! # Design Decisions
//! - Middleware are trait objects shared through `Arc`; the pipeline is
//!   read-only once the kernel has booted
//! - Order is descending priority, stable for equal priorities
//! - Errors propagate unchanged; short-circuits are not errors

pub mod app;
pub mod combined;
pub mod middleware;
pub mod priority;

use thiserror::Error;

use crate::bus::MessageBus;
use crate::handler::{BindingError, HandlerError};
use crate::routing::HandlerRef;

pub use app::{AppPipeline, MiddlewareRegistry, APP_CONFIG_PREFIX};
pub use combined::{CombinedPipeline, PipelineStatistics, StageStatistics};
pub use middleware::Middleware;
pub use priority::MiddlewarePipeline;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no handler registered for {0}")]
    HandlerNotFound(HandlerRef),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("handler {handler} failed: {source}")]
    Handler {
        handler: HandlerRef,
        #[source]
        source: HandlerError,
    },

    #[error("{stage} stage ran before {requires} was available")]
    MissingState {
        stage: &'static str,
        requires: &'static str,
    },

    #[error("middleware '{id}' failed: {message}")]
    Middleware { id: String, message: String },

    #[error("failed to render response: {0}")]
    Render(#[from] serde_json::Error),
}

/// A runnable group of middleware.
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError>;

    fn has(&self, id: &str) -> bool;

    fn count(&self) -> usize;

    /// Middleware ids in execution order.
    fn ids(&self) -> Vec<String>;
}
