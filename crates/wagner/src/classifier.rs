//! Sync/async classification of resolved tasks

use std::collections::HashMap;

use crate::graph::WorkingGraph;

/// Whether a task's value is available immediately or through a future
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Sync,
    Async,
}

/// Per-resolution classification of every reachable name
#[derive(Debug, Clone, Default)]
pub struct Classification {
    modes: HashMap<String, Mode>,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `name` once all of its dependencies have been classified.
    ///
    /// A task is asynchronous if it was declared asynchronous or any direct
    /// dependency is. Resolved leaves are always synchronous.
    pub fn classify(&mut self, graph: &WorkingGraph, name: &str) -> Mode {
        if let Some(mode) = self.modes.get(name) {
            return *mode;
        }

        let mode = match graph.get(name) {
            Some(node) if node.is_leaf() => Mode::Sync,
            Some(node) if node.is_declared_async() => Mode::Async,
            Some(node) => {
                if node.dependencies().iter().any(|dep| self.is_async(dep)) {
                    Mode::Async
                } else {
                    Mode::Sync
                }
            }
            None => Mode::Sync,
        };

        self.modes.insert(name.to_string(), mode);
        mode
    }

    pub fn mode(&self, name: &str) -> Option<Mode> {
        self.modes.get(name).copied()
    }

    pub fn is_async(&self, name: &str) -> bool {
        self.mode(name) == Some(Mode::Async)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::ServiceCache;
    use crate::context::{Args, Locals};
    use crate::error::BoxError;
    use crate::graph::Registry;
    use crate::task::{AsyncFn, Producer, SyncFn, TaskDef};

    fn registry() -> Registry {
        let sync = |name: &str, deps: &[&str]| {
            TaskDef::new(name, deps, Producer::Sync(Arc::new(SyncFn(|_: &Args| Ok::<_, BoxError>(())))))
        };
        let mut registry = Registry::new();
        registry.insert(sync("eggs", &["bacon", "sausage"]));
        registry.insert(TaskDef::new(
            "bacon",
            &[],
            Producer::Async(Arc::new(AsyncFn(|_: Args| async { Ok::<_, BoxError>(()) }))),
        ));
        registry.insert(sync("sausage", &["pan"]));
        registry.insert(sync("pan", &[]));
        registry
    }

    #[test]
    fn test_async_propagates_to_dependents() {
        let graph = WorkingGraph::build(&registry(), &Locals::new(), &ServiceCache::new());
        let mut classification = Classification::new();
        for name in ["pan", "sausage", "bacon", "eggs"] {
            classification.classify(&graph, name);
        }

        assert_eq!(classification.mode("pan"), Some(Mode::Sync));
        assert_eq!(classification.mode("sausage"), Some(Mode::Sync));
        assert_eq!(classification.mode("bacon"), Some(Mode::Async));
        assert_eq!(classification.mode("eggs"), Some(Mode::Async));
        assert_eq!(classification.mode("toast"), None);
    }

    #[test]
    fn test_locals_are_sync() {
        let locals = Locals::new().with("bacon", "crispy");
        let graph = WorkingGraph::build(&registry(), &locals, &ServiceCache::new());
        let mut classification = Classification::new();
        for name in ["bacon", "pan", "sausage", "eggs"] {
            classification.classify(&graph, name);
        }

        assert!(!classification.is_async("bacon"));
        assert!(!classification.is_async("eggs"));
    }
}
