//! Handler stage: invoke the bound handler.

use std::time::UNIX_EPOCH;

use serde_json::json;

use crate::bus::MessageBus;
use crate::handler::{HandlerContext, Services};
use crate::pipeline::{Middleware, PipelineError};

pub struct HandlerStage {
    services: Services,
}

impl HandlerStage {
    pub const ID: &'static str = "handler";

    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

impl Middleware for HandlerStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        let binding = bus.binding().cloned().ok_or(PipelineError::MissingState {
            stage: Self::ID,
            requires: "a handler binding",
        })?;

        let response = {
            let ctx = HandlerContext::new(bus, &binding.params, &self.services);
            binding.entry.call(&ctx).map_err(|source| PipelineError::Handler {
                handler: binding.entry.reference().clone(),
                source,
            })?
        };

        let request_time = bus
            .request_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let meta = json!({
            "status": response.status().as_u16(),
            "kind": response.kind().as_str(),
            "request_id": bus.request_id(),
            "request_time": request_time,
        });
        bus.set("response_meta", meta);

        tracing::debug!(
            request_id = %bus.request_id(),
            handler = %binding.entry.reference(),
            status = response.status().as_u16(),
            kind = response.kind().as_str(),
            "Handler returned"
        );
        bus.set_response(response);
        Ok(())
    }
}
