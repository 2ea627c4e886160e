//! Dependency resolution: reachability, cycle and missing-name detection,
//! classification and execution order

use std::collections::HashSet;

use tracing::debug;

use crate::classifier::{Classification, Mode};
use crate::error::{ResolveError, ResolveResult};
use crate::graph::{DependencyDag, WorkingGraph};

/// Result of a structural traversal from a set of target names
#[derive(Debug, Clone, Default)]
pub struct Reachable {
    /// Every reachable name, dependencies first
    pub post_order: Vec<String>,
    pub classification: Classification,
}

impl Reachable {
    /// First asynchronous name in dependency order
    pub fn first_async(&self) -> Option<&str> {
        self.post_order
            .iter()
            .map(String::as_str)
            .find(|name| self.classification.is_async(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.post_order.iter().any(|entry| entry == name)
    }
}

/// Everything an engine needs to execute one invocation
#[derive(Debug, Clone)]
pub struct Plan {
    pub reachable: Reachable,
    /// Names whose values are needed, stopping at already-resolved names
    pub required: HashSet<String>,
}

impl Plan {
    /// Required names in DFS post-order
    pub fn sync_order(&self) -> Vec<String> {
        self.reachable
            .post_order
            .iter()
            .filter(|name| self.required.contains(*name))
            .cloned()
            .collect()
    }

    /// Required names in Kahn order, all sync names before all async names
    pub fn async_order(&self, graph: &WorkingGraph) -> ResolveResult<Vec<String>> {
        order_partitioned(graph, &self.required, &self.reachable.classification)
    }
}

/// Resolve the plan for `targets` against `graph`
pub fn plan<S: AsRef<str>>(graph: &WorkingGraph, targets: &[S]) -> ResolveResult<Plan> {
    let reachable = reachable(graph, targets)?;
    let required = required(graph, targets);
    debug!(
        reachable = reachable.post_order.len(),
        required = required.len(),
        "Resolved invocation plan"
    );
    Ok(Plan { reachable, required })
}

/// Depth-first traversal from every target.
///
/// Fails with [`ResolveError::Cycle`] when a name is revisited while still on
/// the traversal stack, and with [`ResolveError::MissingDependency`] when a
/// name is not part of the graph. Resolved leaves have no dependencies, so the
/// traversal ends there.
pub fn reachable<S: AsRef<str>>(graph: &WorkingGraph, targets: &[S]) -> ResolveResult<Reachable> {
    let mut walk = Walk {
        graph,
        visited: HashSet::new(),
        stack: Vec::new(),
        result: Reachable::default(),
    };

    for target in targets {
        walk.visit(target.as_ref(), None)?;
    }

    Ok(walk.result)
}

struct Walk<'a> {
    graph: &'a WorkingGraph,
    visited: HashSet<String>,
    stack: Vec<String>,
    result: Reachable,
}

impl Walk<'_> {
    fn visit(&mut self, name: &str, requested_by: Option<&str>) -> ResolveResult<()> {
        if let Some(position) = self.stack.iter().position(|entry| entry == name) {
            let mut path = self.stack[position..].to_vec();
            path.push(name.to_string());
            return Err(ResolveError::cycle(path));
        }
        if self.visited.contains(name) {
            return Ok(());
        }

        let Some(node) = self.graph.get(name) else {
            return Err(ResolveError::missing(name, requested_by));
        };

        self.stack.push(name.to_string());
        for dep in node.dependencies() {
            self.visit(dep, Some(name))?;
        }
        self.stack.pop();

        self.visited.insert(name.to_string());
        self.result.classification.classify(self.graph, name);
        self.result.post_order.push(name.to_string());
        Ok(())
    }
}

/// Names whose values an invocation of `targets` needs.
///
/// Locals, constants and cached services are included but not descended into,
/// so their dependencies only show up when another path requires them.
/// Unknown names are skipped; [`reachable`] reports them.
pub fn required<S: AsRef<str>>(graph: &WorkingGraph, targets: &[S]) -> HashSet<String> {
    let mut required = HashSet::new();
    let mut pending: Vec<&str> = targets.iter().map(AsRef::as_ref).collect();

    while let Some(name) = pending.pop() {
        if !required.insert(name.to_string()) {
            continue;
        }
        let Some(node) = graph.get(name) else {
            continue;
        };
        if node.ready_value().is_none() {
            pending.extend(node.dependencies().iter().map(String::as_str));
        }
    }

    required
}

/// Topological order over `names`, earliest declaration first among ready
/// names, then partitioned into synchronous names followed by asynchronous ones
pub fn order_partitioned(
    graph: &WorkingGraph,
    names: &HashSet<String>,
    classification: &Classification,
) -> ResolveResult<Vec<String>> {
    let order = DependencyDag::build(graph, names)?.topological_order();
    let (sync, asynchronous): (Vec<String>, Vec<String>) = order
        .into_iter()
        .partition(|name| classification.mode(name) != Some(Mode::Async));

    Ok(sync.into_iter().chain(asynchronous).collect())
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

    fn sync(name: &str, deps: &[&str]) -> TaskDef {
        TaskDef::new(name, deps, Producer::Sync(Arc::new(SyncFn(|_: &Args| Ok::<_, BoxError>(())))))
    }

    fn asynchronous(name: &str, deps: &[&str]) -> TaskDef {
        let producer = AsyncFn(|_: Args| async { Ok::<_, BoxError>(()) });
        TaskDef::new(name, deps, Producer::Async(Arc::new(producer)))
    }

    fn graph(tasks: Vec<TaskDef>) -> WorkingGraph {
        let mut registry = Registry::new();
        for task in tasks {
            registry.insert(task);
        }
        WorkingGraph::build(&registry, &Locals::new(), &ServiceCache::new())
    }

    fn names(values: &[&str]) -> HashSet<String> {
        values.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_reaches_every_dependency() {
        let graph = graph(vec![
            sync("eggs", &["bacon", "sausage"]),
            sync("bacon", &[]),
            sync("sausage", &["pan"]),
            sync("pan", &[]),
        ]);

        let result = reachable(&graph, &["eggs"]).unwrap();
        assert_eq!(result.post_order, ["bacon", "pan", "sausage", "eggs"]);
        assert!(result.first_async().is_none());
    }

    #[test]
    fn test_orders_async_last() {
        let graph = graph(vec![
            asynchronous("eggs", &["bacon", "sausage"]),
            asynchronous("bacon", &[]),
            sync("sausage", &["pan"]),
            sync("pan", &[]),
        ]);

        let result = reachable(&graph, &["eggs", "bacon", "sausage", "pan"]).unwrap();
        let order = order_partitioned(&graph, &names(&["eggs", "bacon", "sausage", "pan"]), &result.classification)
            .unwrap();
        assert_eq!(order, ["pan", "sausage", "bacon", "eggs"]);
        assert_eq!(result.first_async(), Some("bacon"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = graph(vec![
            sync("eggs", &["bacon", "pan"]),
            sync("bacon", &["pan"]),
            sync("pan", &[]),
        ]);

        let plan = plan(&graph, &["eggs"]).unwrap();
        assert_eq!(plan.sync_order(), ["pan", "bacon", "eggs"]);
        assert_eq!(plan.async_order(&graph).unwrap(), ["pan", "bacon", "eggs"]);
    }

    #[test]
    fn test_missing_dependency() {
        let empty = graph(vec![]);
        let error = reachable(&empty, &["eggs"]).unwrap_err();
        assert_eq!(error.to_string(), "No such dependency: eggs");

        let graph = graph(vec![sync("eggs", &["pan"])]);
        let error = reachable(&graph, &["eggs"]).unwrap_err();
        assert_eq!(error, ResolveError::missing("pan", Some("eggs")));
    }

    #[test]
    fn test_cycle_reports_path() {
        let toast = graph(vec![sync("toast", &["toast"])]);
        let error = reachable(&toast, &["toast"]).unwrap_err();
        assert_eq!(error.to_string(), "Cycle detected: toast <- toast");

        let graph = graph(vec![sync("eggs", &["bacon"]), sync("bacon", &["eggs"])]);
        let error = reachable(&graph, &["eggs"]).unwrap_err();
        assert_eq!(error.to_string(), "Cycle detected: eggs <- bacon <- eggs");
    }

    #[test]
    fn test_required_stops_at_resolved_names() {
        let mut registry = Registry::new();
        registry.insert(sync("eggs", &["bacon"]));
        registry.insert(sync("bacon", &["pan"]).into_service());
        registry.insert(sync("pan", &[]));
        registry.insert(sync("toast", &[]));

        let cache = ServiceCache::new();
        cache.put("bacon", Arc::new(()));
        let graph = WorkingGraph::build(&registry, &Locals::new(), &cache);

        let plan = plan(&graph, &["eggs"]).unwrap();
        assert!(plan.reachable.contains("pan"));
        assert_eq!(plan.required, names(&["eggs", "bacon"]));
        assert_eq!(plan.sync_order(), ["bacon", "eggs"]);
        assert!(!plan.required.contains("toast"));
    }
}
