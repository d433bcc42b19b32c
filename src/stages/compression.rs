//! Compression stage: negotiate gzip; the response stage applies it.

use axum::http::header::ACCEPT_ENCODING;

use crate::bus::MessageBus;
use crate::http::compression::{accepts_gzip, ContentEncoding};
use crate::pipeline::{Middleware, PipelineError};

pub struct CompressionStage {
    enabled: bool,
}

impl CompressionStage {
    pub const ID: &'static str = "compression";

    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Middleware for CompressionStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }

        let wants_gzip = bus
            .headers()
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(accepts_gzip);
        if wants_gzip {
            bus.set_encoding(ContentEncoding::Gzip);
        }
        Ok(())
    }
}
