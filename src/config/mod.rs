//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → Kernel::boot builds router + pipelines from it
//!
//! On reload:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → a new Kernel is booted and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, AuthRule, ClosureConfig, ClosureSecurityConfig, ClosureValidationConfig,
    CompressionConfig, CspConfig, CsrfRule, HandlerSecurityConfig, ListenerConfig,
    MiddlewareConfig, ObservabilityConfig, RedirectConfig, RouteConfig, SanitizationConfig,
    SecurityConfig, SessionConfig, TimeoutConfig,
};
pub use validation::ValidationError;
