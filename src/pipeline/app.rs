//! Application middleware loaded from configuration.
//!
//! # Responsibilities
//! - Keep a registry of named middleware factories
//! - Build the app pipeline from `[[middleware]]` entries
//! - Hand each middleware its config table through the bus
//!
//! # Design Decisions
//! - Unknown names and failing factories are logged and skipped; the kernel
//!   still boots
//! - Disabled entries are not instantiated at all

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::bus::MessageBus;
use crate::config::MiddlewareConfig;
use crate::middleware::{Cors, RequestLog};
use crate::pipeline::{Middleware, MiddlewarePipeline, Pipeline, PipelineError};

/// Bus key prefix under which an app middleware finds its config table.
pub const APP_CONFIG_PREFIX: &str = "_app_middleware_config:";

pub type MiddlewareFactory = dyn Fn(&Value) -> Result<Arc<dyn Middleware>, String> + Send + Sync;

#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Arc<MiddlewareFactory>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `request_log` and `cors`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(RequestLog::NAME, |config| {
                Ok(Arc::new(RequestLog::from_config(config)?) as Arc<dyn Middleware>)
            })
            .register(Cors::NAME, |config| {
                Ok(Arc::new(Cors::from_config(config)?) as Arc<dyn Middleware>)
            });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Middleware>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, config: &Value) -> Result<Arc<dyn Middleware>, String> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| format!("no middleware named '{name}'"))?;
        factory(config)
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Writes the entry's config table to the bus, then runs the middleware.
struct Configured {
    key: String,
    config: Value,
    inner: Arc<dyn Middleware>,
}

impl Middleware for Configured {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        bus.set(self.key.clone(), self.config.clone());
        self.inner.process(bus)
    }
}

pub struct AppPipeline {
    registry: MiddlewareRegistry,
    pipeline: MiddlewarePipeline,
}

impl AppPipeline {
    pub fn from_config(entries: &[MiddlewareConfig], registry: MiddlewareRegistry) -> Self {
        let pipeline = Self::build(entries, &registry);
        Self { registry, pipeline }
    }

    /// Rebuild from a new set of entries with the same registry.
    pub fn reload(&mut self, entries: &[MiddlewareConfig]) {
        self.pipeline = Self::build(entries, &self.registry);
        tracing::info!(count = self.pipeline.count(), "App middleware reloaded");
    }

    fn build(entries: &[MiddlewareConfig], registry: &MiddlewareRegistry) -> MiddlewarePipeline {
        let mut pipeline = MiddlewarePipeline::new("app");

        for entry in entries.iter().filter(|e| e.enabled) {
            let config = match serde_json::to_value(&entry.config) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(middleware = %entry.name, error = %e, "Unusable middleware config");
                    continue;
                }
            };

            match registry.build(&entry.name, &config) {
                Ok(inner) => {
                    pipeline.pipe(
                        Arc::new(Configured {
                            key: format!("{APP_CONFIG_PREFIX}{}", entry.name),
                            config,
                            inner,
                        }),
                        entry.priority,
                    );
                    tracing::debug!(middleware = %entry.name, priority = entry.priority, "App middleware loaded");
                }
                Err(e) => {
                    tracing::warn!(middleware = %entry.name, error = %e, "Skipping app middleware");
                }
            }
        }

        pipeline
    }
}

impl Pipeline for AppPipeline {
    fn name(&self) -> &str {
        "app"
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        self.pipeline.process(bus)
    }

    fn has(&self, id: &str) -> bool {
        self.pipeline.has(id)
    }

    fn count(&self) -> usize {
        self.pipeline.count()
    }

    fn ids(&self) -> Vec<String> {
        self.pipeline.ids()
    }
}
