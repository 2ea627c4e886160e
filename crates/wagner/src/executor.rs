//! Synchronous and asynchronous invocation engines

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::IntoFuture;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use futures::future::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ServiceCache;
use crate::context::{Args, Value};
use crate::error::{panic_message, BoxError, ExecutionError, ResolveError, WagnerError, WagnerResult};
use crate::graph::WorkingGraph;
use crate::record::ResolutionRecord;
use crate::resolver;
use crate::target::Target;
use crate::task::{Launch, TaskDef};
use crate::types::{InvocationStats, ModuleConfig};
use crate::BoxFuture;

/// Unique identifier for an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generate a new unique invocation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress event emitted during an asynchronous invocation
#[derive(Debug, Clone)]
pub enum InvocationEvent {
    /// The first scheduling pass is about to run
    Started {
        invocation: InvocationId,
        required_tasks: usize,
    },
    /// A producer was launched
    TaskStarted { name: String },
    /// A producer finished successfully
    TaskFinished { name: String, duration: Duration },
    /// A producer failed or panicked; this is the invocation's error
    TaskFailed {
        name: String,
        error: String,
        duration: Duration,
    },
    /// A service value was taken from the cache
    CacheHit { name: String },
    /// Every required task succeeded
    Completed { stats: InvocationStats },
    /// The invocation failed
    Failed { error: String, stats: InvocationStats },
}

/// Handle of an asynchronous invocation.
///
/// Awaiting it drives the scheduler and resolves exactly once. Asynchronous
/// producers are spawned onto the current tokio runtime, so it must be awaited
/// inside one.
pub struct Invocation<R> {
    id: InvocationId,
    future: BoxFuture<WagnerResult<R>>,
    events: mpsc::UnboundedReceiver<InvocationEvent>,
}

impl<R> Invocation<R> {
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// Split into the result future and the event receiver
    pub fn into_parts(self) -> (BoxFuture<WagnerResult<R>>, mpsc::UnboundedReceiver<InvocationEvent>) {
        (self.future, self.events)
    }
}

impl<R> IntoFuture for Invocation<R> {
    type Output = WagnerResult<R>;
    type IntoFuture = BoxFuture<WagnerResult<R>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl<R> fmt::Debug for Invocation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation").field("id", &self.id).finish_non_exhaustive()
    }
}

type PanicPayload = Box<dyn Any + Send + 'static>;

/// What a launched producer came back with
enum Outcome {
    Succeeded(Value),
    Failed(BoxError),
    Panicked(PanicPayload),
}

impl From<Result<Value, BoxError>> for Outcome {
    fn from(result: Result<Value, BoxError>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(error) => Outcome::Failed(error),
        }
    }
}

fn launch(task: &TaskDef, args: Args, catch_panics: bool) -> Result<Launch, PanicPayload> {
    if !catch_panics {
        return Ok(task.producer().launch(args));
    }
    panic::catch_unwind(AssertUnwindSafe(|| task.producer().launch(args)))
}

fn panicked(task_name: &str, payload: &PanicPayload) -> WagnerError {
    WagnerError::Execution(ExecutionError::TaskPanicked {
        task_name: task_name.to_string(),
        message: panic_message(payload.as_ref()),
    })
}

/// Run `target` synchronously against `graph`.
///
/// Every structural problem, including an asynchronous task anywhere in the
/// reachable graph, is reported before a producer runs. Producer panics are
/// not caught.
pub(crate) fn run_sync<R>(
    graph: &WorkingGraph,
    cache: &ServiceCache,
    config: &ModuleConfig,
    target: Target<R>,
) -> WagnerResult<R> {
    target.validate_params(config)?;
    let plan = resolver::plan(graph, target.params())?;
    if let Some(name) = plan.reachable.first_async() {
        return Err(ResolveError::AsyncDependency { name: name.to_string() }.into());
    }

    let id = InvocationId::new();
    let order = plan.sync_order();
    debug!(invocation = %id, tasks = order.len(), "Running synchronous invocation");

    let mut record = ResolutionRecord::new();
    for name in &order {
        let Some(node) = graph.get(name) else {
            return Err(ResolveError::missing(name.as_str(), None).into());
        };
        if let Some(value) = node.ready_value() {
            record.resolved(name, value.clone());
            continue;
        }
        let Some(task) = node.task() else {
            continue;
        };

        debug!(invocation = %id, task = %name, "Running task");
        let args = record.args(task.dependencies());
        let value = match task.producer().launch(args) {
            Launch::Ready(Ok(value)) => value,
            Launch::Ready(Err(error)) => {
                warn!(invocation = %id, task = %name, error = %error, "Task failed");
                return Err(WagnerError::task_failed(name.as_str(), error));
            }
            Launch::Pending(_) => {
                return Err(ResolveError::AsyncDependency { name: name.clone() }.into());
            }
        };

        if task.is_service() {
            cache.put(name, value.clone());
        }
        record.resolved(name, value);
    }

    let args = record.args(target.params());
    Ok(target.call(None, args))
}

/// Resolve `target` and return an invocation that drives it asynchronously.
///
/// Structural errors are returned here; nothing runs until the invocation is awaited.
pub(crate) fn start_async<R: Send + 'static>(
    graph: WorkingGraph,
    cache: ServiceCache,
    config: ModuleConfig,
    target: Target<R>,
) -> WagnerResult<Invocation<R>> {
    target.validate_params(&config)?;
    let plan = resolver::plan(&graph, target.params())?;
    let order = plan.async_order(&graph)?;

    let id = InvocationId::new();
    let (sender, events) = mpsc::unbounded_channel();
    let driver = Driver {
        id,
        graph,
        order,
        required: plan.required,
        cache,
        events: config.report_events.then_some(sender),
        config,
        target,
        record: ResolutionRecord::new(),
        stats: InvocationStats::default(),
        started: HashMap::new(),
    };

    Ok(Invocation {
        id,
        future: Box::pin(driver.run()),
        events,
    })
}

/// The ready-set stepper of one asynchronous invocation
struct Driver<R> {
    id: InvocationId,
    graph: WorkingGraph,
    order: Vec<String>,
    required: HashSet<String>,
    cache: ServiceCache,
    config: ModuleConfig,
    target: Target<R>,
    record: ResolutionRecord,
    stats: InvocationStats,
    events: Option<mpsc::UnboundedSender<InvocationEvent>>,
    started: HashMap<String, Instant>,
}

impl<R: Send + 'static> Driver<R> {
    async fn run(mut self) -> WagnerResult<R> {
        let start = Instant::now();
        self.stats.required_tasks = self.required.len();
        info!(invocation = %self.id, required = self.required.len(), "Starting invocation");
        self.emit(InvocationEvent::Started {
            invocation: self.id,
            required_tasks: self.required.len(),
        });

        let outcome = self.drive().await;
        self.stats.total_duration = start.elapsed();

        let args = self.record.args(self.target.params());
        match outcome {
            Ok(()) => {
                info!(
                    invocation = %self.id,
                    executed = self.stats.executed_tasks,
                    cache_hits = self.stats.cache_hits,
                    duration = ?self.stats.total_duration,
                    "Invocation completed"
                );
                self.emit(InvocationEvent::Completed {
                    stats: self.stats.clone(),
                });
                Ok(self.target.call(None, args))
            }
            Err(error) => {
                info!(invocation = %self.id, error = %error, "Invocation failed");
                self.emit(InvocationEvent::Failed {
                    error: error.to_string(),
                    stats: self.stats.clone(),
                });
                if self.target.takes_error() {
                    Ok(self.target.call(Some(error), args))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn drive(&mut self) -> WagnerResult<()> {
        self.seed();

        let (sender, mut receiver) = mpsc::unbounded_channel::<(String, Outcome)>();
        let mut in_flight = 0usize;

        loop {
            while let Ok((name, outcome)) = receiver.try_recv() {
                in_flight -= 1;
                self.complete(&name, outcome)?;
            }
            if self.is_finished() {
                return Ok(());
            }

            self.stats.passes += 1;
            let mut ran_inline = false;

            for index in 0..self.order.len() {
                let name = self.order[index].clone();
                if !self.record.slot(&name).map_or(true, |slot| slot.is_pending()) {
                    continue;
                }
                let Some(task) = self.graph.get(&name).and_then(|node| node.task()).cloned() else {
                    continue;
                };
                if !self.record.is_ready(task.dependencies()) || !self.record.start(&name) {
                    continue;
                }

                debug!(invocation = %self.id, task = %name, "Launching task");
                self.started.insert(name.clone(), Instant::now());
                self.emit(InvocationEvent::TaskStarted { name: name.clone() });

                let args = self.record.args(task.dependencies());
                match launch(&task, args, self.config.catch_panics) {
                    Ok(Launch::Ready(result)) => {
                        ran_inline = true;
                        self.complete(&name, result.into())?;
                    }
                    Ok(Launch::Pending(future)) => {
                        let sender = sender.clone();
                        tokio::spawn(async move {
                            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                                Ok(result) => result.into(),
                                Err(payload) => Outcome::Panicked(payload),
                            };
                            // The invocation may already be over; late outcomes are dropped
                            let _ = sender.send((name, outcome));
                        });
                        in_flight += 1;
                        self.stats.peak_in_flight = self.stats.peak_in_flight.max(in_flight);
                    }
                    Err(payload) => self.complete(&name, Outcome::Panicked(payload))?,
                }
            }

            if self.is_finished() {
                return Ok(());
            }

            if ran_inline {
                if self.config.yield_between_passes {
                    tokio::task::yield_now().await;
                }
                continue;
            }

            if in_flight == 0 {
                return Err(self.stalled());
            }

            match receiver.recv().await {
                Some((name, outcome)) => {
                    in_flight -= 1;
                    self.complete(&name, outcome)?;
                }
                None => return Err(self.stalled()),
            }
        }
    }

    /// Record every required value that needs no producer call
    fn seed(&mut self) {
        let mut cache_hits = Vec::new();
        for name in &self.order {
            let Some(node) = self.graph.get(name) else {
                continue;
            };
            let Some(value) = node.ready_value() else {
                continue;
            };
            if node.task().is_some() {
                cache_hits.push(name.clone());
            }
            self.record.resolved(name, value.clone());
        }

        for name in cache_hits {
            debug!(invocation = %self.id, service = %name, "Service cache hit");
            self.stats.cache_hits += 1;
            self.emit(InvocationEvent::CacheHit { name });
        }
    }

    fn complete(&mut self, name: &str, outcome: Outcome) -> WagnerResult<()> {
        let duration = self
            .started
            .get(name)
            .map(Instant::elapsed)
            .unwrap_or_default();

        let error = match outcome {
            Outcome::Succeeded(value) => {
                if !self.record.succeed(name, value.clone()) {
                    return Ok(());
                }
                if self.graph.get(name).and_then(|node| node.task()).is_some_and(|task| task.is_service()) {
                    self.cache.put(name, value);
                }
                debug!(invocation = %self.id, task = name, duration = ?duration, "Task finished");
                self.stats.executed_tasks += 1;
                self.emit(InvocationEvent::TaskFinished {
                    name: name.to_string(),
                    duration,
                });
                return Ok(());
            }
            Outcome::Failed(error) => WagnerError::task_failed(name, error),
            Outcome::Panicked(payload) => {
                if !self.config.catch_panics {
                    panic::resume_unwind(payload);
                }
                panicked(name, &payload)
            }
        };

        if self.record.fail(name) {
            warn!(invocation = %self.id, task = name, error = %error, "Task failed");
            self.stats.failed_tasks += 1;
            self.emit(InvocationEvent::TaskFailed {
                name: name.to_string(),
                error: error.to_string(),
                duration,
            });
        }
        Err(error)
    }

    fn is_finished(&self) -> bool {
        self.record.all_done(self.required.iter().map(String::as_str))
    }

    fn stalled(&self) -> WagnerError {
        let pending = self
            .order
            .iter()
            .filter(|name| !self.record.is_done(name))
            .cloned()
            .collect();
        ExecutionError::Stalled { pending }.into()
    }

    fn emit(&self, event: InvocationEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
