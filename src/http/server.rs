//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single dispatch fallback
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Bind the server to a listener and serve until shutdown
//! - Run the kernel on a blocking worker per request
//! - Swap in a freshly booted kernel when the config changes
//! - Sweep expired sessions on the configured interval

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::http::request::RequestInfo;
use crate::kernel::{BootError, Components, Kernel};

/// Application state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<ArcSwap<Kernel>>,
    pub max_body_bytes: usize,
}

/// HTTP front of the kernel.
pub struct HttpServer {
    router: Router,
    kernel: Arc<ArcSwap<Kernel>>,
    components: Components,
}

impl HttpServer {
    /// Boot a kernel from `config` and build the HTTP stack around it.
    pub fn new(config: AppConfig, components: Components) -> Result<Self, BootError> {
        let kernel = Arc::new(ArcSwap::from_pointee(Kernel::boot(config.clone(), &components)?));
        let state = AppState {
            kernel: kernel.clone(),
            max_body_bytes: config.listener.max_body_bytes,
        };
        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            kernel,
            components,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        // Outermost first: the id exists before tracing starts and is echoed
        // on every response, including timeouts and 413s. The body limit
        // wraps the timeout, which needs a `Default` response body beneath it.
        let layers = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new().fallback(dispatch).with_state(state).layer(layers)
    }

    /// Kernel currently serving requests.
    pub fn kernel(&self) -> Arc<Kernel> {
        self.kernel.load_full()
    }

    /// Boot a kernel from `config` and swap it in. In-flight requests finish
    /// on the previous kernel. Listener settings only apply on restart.
    pub fn reload(&self, config: AppConfig) -> Result<(), BootError> {
        reload_kernel(&self.kernel, &self.components, config)
    }

    /// Serve on `listener` until `shutdown` fires, applying configs from
    /// `updates` as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        updates: Option<mpsc::UnboundedReceiver<AppConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(mut updates) = updates {
            let kernel = self.kernel.clone();
            let components = self.components.clone();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    if let Err(e) = reload_kernel(&kernel, &components, config) {
                        tracing::error!(error = %e, "Config reload rejected, keeping current kernel");
                    }
                }
            });
        }

        tokio::spawn(sweep_sessions(self.kernel.clone(), shutdown.resubscribe()));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn reload_kernel(
    slot: &ArcSwap<Kernel>,
    components: &Components,
    config: AppConfig,
) -> Result<(), BootError> {
    let kernel = Kernel::boot(config, components)?;
    slot.store(Arc::new(kernel));
    tracing::info!("Kernel reloaded");
    Ok(())
}

async fn sweep_sessions(kernel: Arc<ArcSwap<Kernel>>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let every = Duration::from_secs(
            kernel
                .load()
                .config()
                .security
                .session
                .purge_interval_secs
                .max(1),
        );
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(every) => {
                let purged = kernel.load_full().services().sessions.purge_expired();
                tracing::trace!(purged, "Session sweep finished");
            }
        }
    }
}

/// Every request lands here; the kernel does its own routing.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Rejecting request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let info = RequestInfo::from_parts(&parts, body);
    let kernel = state.kernel.load_full();
    match tokio::task::spawn_blocking(move || kernel.handle(info)).await {
        Ok(outgoing) => outgoing.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Kernel worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
