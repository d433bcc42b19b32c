//! Chain of pipelines run as one.

use std::sync::Arc;

use serde::Serialize;

use crate::bus::MessageBus;
use crate::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatistics {
    pub name: String,
    pub count: usize,
    pub middleware: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatistics {
    pub stages: Vec<StageStatistics>,
    pub total_middleware: usize,
}

#[derive(Default)]
pub struct CombinedPipeline {
    stages: Vec<Arc<dyn Pipeline>>,
}

impl CombinedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stage: Arc<dyn Pipeline>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// Remove stages by name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.stages.len();
        self.stages.retain(|s| s.name() != name);
        before - self.stages.len()
    }

    pub fn stage(&self, name: &str) -> Option<&Arc<dyn Pipeline>> {
        self.stages.iter().find(|s| s.name() == name)
    }

    pub fn statistics(&self) -> PipelineStatistics {
        let stages: Vec<StageStatistics> = self
            .stages
            .iter()
            .map(|s| StageStatistics {
                name: s.name().to_string(),
                count: s.count(),
                middleware: s.ids(),
            })
            .collect();
        let total_middleware = stages.iter().map(|s| s.count).sum();
        PipelineStatistics {
            stages,
            total_middleware,
        }
    }
}

impl Pipeline for CombinedPipeline {
    fn name(&self) -> &str {
        "combined"
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        for stage in &self.stages {
            if bus.is_stopped() {
                break;
            }
            stage.process(bus)?;
        }
        Ok(())
    }

    fn has(&self, id: &str) -> bool {
        self.stages.iter().any(|s| s.has(id))
    }

    fn count(&self) -> usize {
        self.stages.iter().map(|s| s.count()).sum()
    }

    fn ids(&self) -> Vec<String> {
        self.stages.iter().flat_map(|s| s.ids()).collect()
    }
}
