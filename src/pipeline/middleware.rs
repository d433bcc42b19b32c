//! The middleware contract.

use crate::bus::MessageBus;
use crate::pipeline::PipelineError;

/// One step of a pipeline.
///
/// A middleware reads and writes the bus. To end the request early it sets a
/// redirect or calls [`MessageBus::stop`]; returning an error aborts the whole
/// request with a 500.
pub trait Middleware: Send + Sync {
    /// Identity used by `has`/`remove`/`set_priority`. Several instances may
    /// share one id.
    fn id(&self) -> &str;

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError>;
}
