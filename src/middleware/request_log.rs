//! Structured access log.

use std::time::SystemTime;

use serde::Deserialize;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::pipeline::{Middleware, PipelineError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RequestLogConfig {
    /// Requests slower than this are logged at warn level.
    slow_ms: u64,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self { slow_ms: 1000 }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLog {
    slow_ms: u64,
}

impl RequestLog {
    pub const NAME: &'static str = "request_log";

    pub fn from_config(config: &Value) -> Result<Self, String> {
        let config: RequestLogConfig = serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;
        Ok(Self {
            slow_ms: config.slow_ms,
        })
    }

    pub fn slow_ms(&self) -> u64 {
        self.slow_ms
    }
}

impl Middleware for RequestLog {
    fn id(&self) -> &str {
        Self::NAME
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let elapsed_ms = SystemTime::now()
            .duration_since(bus.request_time())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let status = bus.outgoing().map(|o| o.status.as_u16()).unwrap_or_default();
        let request = bus.request();

        if elapsed_ms > self.slow_ms {
            tracing::warn!(
                request_id = %bus.request_id(),
                method = %request.method(),
                path = %request.path(),
                handler = %bus.route().handler(),
                status,
                elapsed_ms,
                "Slow request"
            );
        } else {
            tracing::info!(
                request_id = %bus.request_id(),
                method = %request.method(),
                path = %request.path(),
                handler = %bus.route().handler(),
                status,
                elapsed_ms,
                "Request handled"
            );
        }
        Ok(())
    }
}
