//! Application kernel.
//!
//! # Responsibilities
//! - Boot: validate config, build router, handler table and pipelines
//! - Handle: route a request, run the combined pipeline, produce an `Outgoing`
//! - Turn redirects into `302` responses and uncaught errors into bare `500`s
//!
//! # Data Flow
//! ```text
//! RequestInfo
//!     → Router::init_message_bus (route resolution, bus)
//!     → CombinedPipeline::process (core → app → closure)
//!     → redirect? → 302 + Location + security headers
//!     → otherwise the outgoing response the stages built
//! ```
//!
//! # Design Decisions
//! - A kernel is immutable; reloading config boots a new one
//! - Handler and middleware registries are supplied by the embedding binary

use std::sync::Arc;
use std::time::Instant;

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use thiserror::Error;

use crate::bus::MessageBus;
use crate::config::validation::validate_config;
use crate::config::{AppConfig, ValidationError};
use crate::handler::builtin;
use crate::handler::{HandlerRegistry, Services};
use crate::http::compression::GzipCompressor;
use crate::http::request::RequestInfo;
use crate::http::response::Outgoing;
use crate::observability::metrics;
use crate::pipeline::{
    AppPipeline, CombinedPipeline, MiddlewarePipeline, MiddlewareRegistry, Pipeline, PipelineError,
};
use crate::routing::{ErrorRoute, Router};
use crate::security::headers::apply_security_headers;
use crate::security::{
    ContentSecurityPolicy, MemorySessionStore, MemoryUserProvider, SessionManager, SessionStore,
    UserProvider,
};
use crate::stages::{
    ClosureStage, CompressionStage, HandlerStage, RequestStage, ResponseStage, SecurityStage,
    COMPRESSION_PRIORITY, HANDLER_PRIORITY, REQUEST_PRIORITY, RESPONSE_PRIORITY, SECURITY_PRIORITY,
};

#[derive(Debug, Error)]
pub enum BootError {
    #[error("invalid configuration ({} errors)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("invalid closure pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// What the embedding application plugs into the kernel.
#[derive(Clone)]
pub struct Components {
    pub handlers: HandlerRegistry,
    pub middleware: MiddlewareRegistry,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserProvider>,
}

impl Components {
    /// In-memory session and user stores, built-in app middleware.
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self {
            handlers,
            middleware: MiddlewareRegistry::with_builtins(),
            sessions: Arc::new(MemorySessionStore::new()),
            users: Arc::new(MemoryUserProvider::new()),
        }
    }
}

pub struct Kernel {
    config: Arc<AppConfig>,
    router: Arc<Router>,
    handlers: Arc<HandlerRegistry>,
    services: Services,
    pipeline: CombinedPipeline,
}

impl Kernel {
    pub fn boot(config: AppConfig, components: &Components) -> Result<Self, BootError> {
        validate_config(&config).map_err(BootError::Validation)?;

        let router = Router::from_config(&config.routes);

        let mut handlers = components.handlers.clone();
        if !handlers.contains(&ErrorRoute::builtin_handler()) {
            handlers.register(builtin::error_page());
        }
        handlers.apply_security(&config.handlers);
        for route in router.routes() {
            if !handlers.contains(route.handler()) {
                tracing::warn!(
                    path = %route.pattern(),
                    handler = %route.handler(),
                    "Route points at an unregistered handler"
                );
            }
        }
        let handlers = Arc::new(handlers);

        let services = Services {
            sessions: Arc::new(SessionManager::new(components.sessions.clone(), &config.security)),
            users: components.users.clone(),
        };
        let compressor = GzipCompressor::new(config.compression.level, config.compression.min_size);

        let mut core = MiddlewarePipeline::new("core");
        core.pipe(Arc::new(RequestStage::new(handlers.clone())), REQUEST_PRIORITY)
            .pipe(
                Arc::new(SecurityStage::new(
                    services.sessions.clone(),
                    services.users.clone(),
                    &config.security.session,
                    config.security.redirects.clone(),
                )),
                SECURITY_PRIORITY,
            )
            .pipe(Arc::new(HandlerStage::new(services.clone())), HANDLER_PRIORITY)
            .pipe(
                Arc::new(CompressionStage::new(config.compression.enabled)),
                COMPRESSION_PRIORITY,
            )
            .pipe(Arc::new(ResponseStage::new(compressor)), RESPONSE_PRIORITY);

        let app = AppPipeline::from_config(&config.middleware, components.middleware.clone());

        let mut closure = MiddlewarePipeline::new("closure");
        closure.pipe(
            Arc::new(ClosureStage::new(
                config.closure.clone(),
                ContentSecurityPolicy::from_config(&config.security.csp),
                compressor,
            )?),
            0,
        );

        let mut pipeline = CombinedPipeline::new();
        pipeline
            .add(Arc::new(core))
            .add(Arc::new(app))
            .add(Arc::new(closure));

        let stats = router.stats();
        tracing::info!(
            static_routes = stats.static_routes,
            dynamic_routes = stats.dynamic_routes,
            rejected_routes = stats.rejected_routes,
            handlers = handlers.len(),
            middleware = pipeline.count(),
            "Kernel booted"
        );

        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(router),
            handlers,
            services,
            pipeline,
        })
    }

    /// Run the pipeline and hand back the bus, or the error that aborted it.
    pub fn try_handle(&self, request: RequestInfo) -> Result<MessageBus, PipelineError> {
        let mut bus = self.router.init_message_bus(request);
        self.pipeline.process(&mut bus)?;
        Ok(bus)
    }

    /// Run the pipeline and always produce a response.
    pub fn handle(&self, request: RequestInfo) -> Outgoing {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.path().to_string();
        let request_id = request.request_id().to_string();

        let (outgoing, route) = match self.try_handle(request) {
            Ok(bus) => {
                let route = bus.route().pattern().to_string();
                (Self::finalize(bus), route)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    error = %e,
                    "Pipeline failed"
                );
                (Outgoing::empty(StatusCode::INTERNAL_SERVER_ERROR), "none".to_string())
            }
        };

        metrics::record_request(&method, outgoing.status.as_u16(), &route, start);
        outgoing
    }

    fn finalize(mut bus: MessageBus) -> Outgoing {
        let mut outgoing = if let Some(target) = bus.redirect() {
            let mut outgoing = Outgoing::redirect(target);
            apply_security_headers(&mut outgoing.headers);
            outgoing
        } else {
            bus.take_outgoing().unwrap_or_else(|| {
                tracing::warn!(request_id = %bus.request_id(), "Pipeline ended without a response");
                Outgoing::empty(StatusCode::INTERNAL_SERVER_ERROR)
            })
        };

        for cookie in bus.cookies() {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    outgoing.headers.append(SET_COOKIE, value);
                }
                Err(_) => tracing::warn!(request_id = %bus.request_id(), "Dropping unencodable cookie"),
            }
        }
        outgoing
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn pipeline(&self) -> &CombinedPipeline {
        &self.pipeline
    }
}
