//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, X-Requested-With)
//!     → router.rs (guards: length, depth)
//!     → static table (exact normalized path)
//!     → pattern.rs (dynamic patterns, declaration order)
//!     → method check (405, or 406 for AJAX)
//!     → Return: Route with bound parameters, or an /error_XXX route
//!
//! Route Compilation (at boot):
//!     RouteConfig[]
//!     → literal paths into the static map
//!     → safety check + compile `{param}` patterns
//!     → install missing error routes
//! ```
//!
//! # Design Decisions
//! - Routes compiled at boot, read-only while serving
//! - Deterministic: same input always resolves to the same route
//! - First dynamic match wins (declaration order)

pub mod pattern;
pub mod route;
pub mod router;

pub use route::{ErrorRoute, HandlerRef, Route};
pub use router::{Router, RouterStats};
