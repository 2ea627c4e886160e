//! Task registry, per-invocation working graph and the daggy-backed ordering DAG

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use daggy::{Dag, NodeIndex, Walker};

use crate::cache::ServiceCache;
use crate::context::{Locals, Value};
use crate::error::{ModuleError, ResolveError, ResolveResult};
use crate::task::{Producer, TaskDef};

/// Declaration-ordered collection of task definitions
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: Vec<Arc<TaskDef>>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. A task with the same name is replaced in place,
    /// keeping its original declaration position.
    pub fn insert(&mut self, task: TaskDef) -> Option<Arc<TaskDef>> {
        self.insert_shared(Arc::new(task))
    }

    fn insert_shared(&mut self, task: Arc<TaskDef>) -> Option<Arc<TaskDef>> {
        match self.index.get(task.name()) {
            Some(&position) => Some(std::mem::replace(&mut self.tasks[position], task)),
            None => {
                self.index.insert(task.name().to_string(), self.tasks.len());
                self.tasks.push(task);
                None
            }
        }
    }

    /// Copy every definition of `other` into this registry, sharing the records
    pub fn import(&mut self, other: &Registry) {
        for task in &other.tasks {
            self.insert_shared(task.clone());
        }
    }

    /// Flag a registered task as a service. Shared records are copied first,
    /// so registries that imported the same task are unaffected.
    pub fn mark_service(&mut self, name: &str) -> Result<(), ModuleError> {
        let position = *self
            .index
            .get(name)
            .ok_or_else(|| ModuleError::UnknownTask(name.to_string()))?;
        Arc::make_mut(&mut self.tasks[position]).set_service();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskDef>> {
        self.index.get(name).map(|&position| &self.tasks[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tasks in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskDef>> {
        self.tasks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|task| task.name())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Where an already-resolved working graph entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Constant,
}

/// A member of the working graph
#[derive(Clone)]
pub enum Node {
    /// A registered task, with its memoized value if it is a cached service
    Task {
        def: Arc<TaskDef>,
        cached: Option<Value>,
    },
    /// A leaf that needs no producer call
    Resolved { value: Value, origin: Origin },
}

impl Node {
    pub fn dependencies(&self) -> &[String] {
        match self {
            Node::Task { def, .. } => def.dependencies(),
            Node::Resolved { .. } => &[],
        }
    }

    /// Whether the node was registered with an asynchronous producer
    pub fn is_declared_async(&self) -> bool {
        matches!(self, Node::Task { def, .. } if def.producer().is_async())
    }

    /// Value available without running a producer: local, constant or cache hit
    pub fn ready_value(&self) -> Option<&Value> {
        match self {
            Node::Task { cached, .. } => cached.as_ref(),
            Node::Resolved { value, .. } => Some(value),
        }
    }

    /// Whether the node can never need a producer call
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Resolved { .. })
    }

    pub fn task(&self) -> Option<&Arc<TaskDef>> {
        match self {
            Node::Task { def, .. } => Some(def),
            Node::Resolved { .. } => None,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Task { def, cached } => f
                .debug_struct("Task")
                .field("def", def)
                .field("cached", &cached.is_some())
                .finish(),
            Node::Resolved { origin, .. } => f.debug_struct("Resolved").field("origin", origin).finish(),
        }
    }
}

/// The registry plus one invocation's locals and cache view
#[derive(Debug, Clone, Default)]
pub struct WorkingGraph {
    nodes: Vec<(String, Node)>,
    index: HashMap<String, usize>,
}

impl WorkingGraph {
    /// Build the working graph for one invocation.
    ///
    /// Locals shadow registered tasks (and their cached values) of the same name.
    pub fn build(registry: &Registry, locals: &Locals, cache: &ServiceCache) -> Self {
        let mut graph = Self::default();

        for task in registry.iter() {
            let node = match task.producer() {
                Producer::Constant(value) => Node::Resolved {
                    value: value.clone(),
                    origin: Origin::Constant,
                },
                _ => Node::Task {
                    def: task.clone(),
                    cached: task
                        .is_service()
                        .then(|| cache.get(task.name()))
                        .flatten(),
                },
            };
            graph.insert(task.name(), node);
        }

        for (name, value) in locals.iter() {
            graph.insert(
                name,
                Node::Resolved {
                    value: value.clone(),
                    origin: Origin::Local,
                },
            );
        }

        graph
    }

    fn insert(&mut self, name: &str, node: Node) {
        match self.index.get(name) {
            Some(&position) => self.nodes[position].1 = node,
            None => {
                self.index.insert(name.to_string(), self.nodes.len());
                self.nodes.push((name.to_string(), node));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&position| &self.nodes[position].1)
    }

    /// Declaration position, used to break ordering ties
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// A DAG over a resolved subset of the working graph.
///
/// Nodes are inserted in declaration order, so lower node indices were
/// declared earlier. Edges point from a dependency to its dependent.
#[derive(Debug)]
pub struct DependencyDag {
    dag: Dag<String, ()>,
}

impl DependencyDag {
    /// Build the DAG for `names`; dependencies outside `names` are ignored
    pub fn build(graph: &WorkingGraph, names: &HashSet<String>) -> ResolveResult<Self> {
        let mut members: Vec<&str> = names.iter().map(String::as_str).collect();
        members.sort_by_key(|name| graph.rank(name).unwrap_or(usize::MAX));

        let mut dag = Dag::new();
        let mut nodes = HashMap::with_capacity(members.len());
        for name in &members {
            nodes.insert(*name, dag.add_node(name.to_string()));
        }

        for name in &members {
            let Some(node) = graph.get(name) else {
                return Err(ResolveError::missing(*name, None));
            };
            for dep in node.dependencies() {
                let Some(&from) = nodes.get(dep.as_str()) else {
                    continue;
                };
                dag.add_edge(from, nodes[name], ())
                    .map_err(|_| ResolveError::cycle(vec![name.to_string(), dep.clone(), name.to_string()]))?;
            }
        }

        Ok(Self { dag })
    }

    /// Kahn walk from the in-degree-zero frontier, earliest declaration first
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        let mut frontier = BinaryHeap::new();

        for index in 0..self.dag.node_count() {
            let node = NodeIndex::new(index);
            let degree = self.dag.parents(node).iter(&self.dag).count();
            if degree == 0 {
                frontier.push(Reverse(node));
            }
            in_degree.insert(node, degree);
        }

        let mut order = Vec::with_capacity(self.dag.node_count());
        while let Some(Reverse(node)) = frontier.pop() {
            order.push(self.dag[node].clone());

            for (_, child) in self.dag.children(node).iter(&self.dag) {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree -= 1;
                    if *degree == 0 {
                        frontier.push(Reverse(child));
                    }
                }
            }
        }

        order
    }
}
