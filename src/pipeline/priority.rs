//! Priority-ordered middleware pipeline.
//!
//! # Responsibilities
//! - Hold middleware with an integer priority
//! - Run them highest priority first, registration order among equals
//! - Stop as soon as a middleware stops the bus
//!
//! # Design Decisions
//! - Execution order is computed lazily and cached; every mutation drops the cache
//! - `prepend` puts a middleware ahead of its equals, not ahead of everything

use std::cmp::Reverse;
use std::sync::{Arc, OnceLock};

use crate::bus::MessageBus;
use crate::pipeline::{Middleware, Pipeline, PipelineError};

struct Slot {
    middleware: Arc<dyn Middleware>,
    priority: i32,
}

pub struct MiddlewarePipeline {
    name: String,
    slots: Vec<Slot>,
    order: OnceLock<Vec<usize>>,
}

impl MiddlewarePipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            order: OnceLock::new(),
        }
    }

    /// Append a middleware.
    pub fn pipe(&mut self, middleware: Arc<dyn Middleware>, priority: i32) -> &mut Self {
        self.slots.push(Slot { middleware, priority });
        self.order.take();
        self
    }

    /// Insert a middleware at the head of the registration order.
    pub fn prepend(&mut self, middleware: Arc<dyn Middleware>, priority: i32) -> &mut Self {
        self.slots.insert(0, Slot { middleware, priority });
        self.order.take();
        self
    }

    /// Change the priority of every middleware with this id. Returns how many changed.
    pub fn set_priority(&mut self, id: &str, priority: i32) -> usize {
        let mut changed = 0;
        for slot in self.slots.iter_mut().filter(|s| s.middleware.id() == id) {
            slot.priority = priority;
            changed += 1;
        }
        if changed > 0 {
            self.order.take();
        }
        changed
    }

    /// Remove every middleware with this id. Returns how many were removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.slots.len();
        self.slots.retain(|s| s.middleware.id() != id);
        let removed = before - self.slots.len();
        if removed > 0 {
            self.order.take();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.take();
    }

    pub fn priority_of(&self, id: &str) -> Option<i32> {
        self.slots
            .iter()
            .find(|s| s.middleware.id() == id)
            .map(|s| s.priority)
    }

    fn order(&self) -> &[usize] {
        self.order.get_or_init(|| {
            let mut order: Vec<usize> = (0..self.slots.len()).collect();
            order.sort_by_key(|&i| Reverse(self.slots[i].priority));
            order
        })
    }
}

impl Pipeline for MiddlewarePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
        if bus.is_stopped() {
            return Ok(());
        }

        for &index in self.order() {
            let middleware = &self.slots[index].middleware;
            middleware.process(bus)?;

            if bus.is_stopped() {
                tracing::debug!(
                    request_id = %bus.request_id(),
                    pipeline = %self.name,
                    middleware = %middleware.id(),
                    "Pipeline stopped"
                );
                return Ok(());
            }
        }
        Ok(())
    }

    fn has(&self, id: &str) -> bool {
        self.slots.iter().any(|s| s.middleware.id() == id)
    }

    fn count(&self) -> usize {
        self.slots.len()
    }

    fn ids(&self) -> Vec<String> {
        self.order()
            .iter()
            .map(|&i| self.slots[i].middleware.id().to_string())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::request::RequestInfo;
    use crate::routing::{HandlerRef, Route};
    use axum::http::Method;
    use std::sync::Mutex;

    pub(crate) struct Recorder {
        pub id: String,
        pub log: Arc<Mutex<Vec<String>>>,
        pub stops: bool,
    }

    impl Recorder {
        pub fn new(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                log: log.clone(),
                stops: false,
            })
        }

        pub fn stopping(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                log: log.clone(),
                stops: true,
            })
        }
    }

    impl Middleware for Recorder {
        fn id(&self) -> &str {
            &self.id
        }

        fn process(&self, bus: &mut MessageBus) -> Result<(), PipelineError> {
            self.log.lock().unwrap().push(self.id.clone());
            if self.stops {
                bus.stop();
            }
            Ok(())
        }
    }

    pub(crate) fn test_bus() -> MessageBus {
        MessageBus::new(
            RequestInfo::new(Method::GET, "/"),
            Route::new("/", Method::GET, HandlerRef::new("Home", "index")),
        )
    }

    #[test]
    fn test_descending_priority_stable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new("test");
        pipeline
            .pipe(Recorder::new("low", &log), 1)
            .pipe(Recorder::new("high", &log), 10)
            .pipe(Recorder::new("mid-a", &log), 5)
            .pipe(Recorder::new("mid-b", &log), 5);

        pipeline.process(&mut test_bus()).unwrap();
        assert_eq!(*log.lock().unwrap(), ["high", "mid-a", "mid-b", "low"]);
        assert_eq!(pipeline.ids(), ["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn test_prepend_wins_among_equals() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new("test");
        pipeline.pipe(Recorder::new("a", &log), 0);
        pipeline.prepend(Recorder::new("b", &log), 0);
        assert_eq!(pipeline.ids(), ["b", "a"]);
    }

    #[test]
    fn test_set_priority_reorders() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new("test");
        pipeline.pipe(Recorder::new("a", &log), 2).pipe(Recorder::new("b", &log), 1);
        assert_eq!(pipeline.ids(), ["a", "b"]);

        assert_eq!(pipeline.set_priority("b", 3), 1);
        assert_eq!(pipeline.ids(), ["b", "a"]);
        assert_eq!(pipeline.priority_of("b"), Some(3));
        assert_eq!(pipeline.set_priority("missing", 3), 0);
    }

    #[test]
    fn test_stop_halts_remaining() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new("test");
        pipeline
            .pipe(Recorder::new("first", &log), 3)
            .pipe(Recorder::stopping("stopper", &log), 2)
            .pipe(Recorder::new("never", &log), 1);

        let mut bus = test_bus();
        pipeline.process(&mut bus).unwrap();
        assert!(bus.is_stopped());
        assert_eq!(*log.lock().unwrap(), ["first", "stopper"]);
    }

    #[test]
    fn test_remove_every_instance() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = MiddlewarePipeline::new("test");
        pipeline
            .pipe(Recorder::new("dup", &log), 1)
            .pipe(Recorder::new("keep", &log), 1)
            .pipe(Recorder::new("dup", &log), 1);

        assert_eq!(pipeline.count(), 3);
        assert_eq!(pipeline.remove("dup"), 2);
        assert!(!pipeline.has("dup"));
        assert!(pipeline.has("keep"));
        assert_eq!(pipeline.count(), 1);

        pipeline.clear();
        assert_eq!(pipeline.count(), 0);
    }
}
