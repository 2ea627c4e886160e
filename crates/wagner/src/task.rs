//! Task definitions and producer abstractions

use std::any::Any;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use crate::context::{Args, Value};
use crate::error::BoxError;
use crate::BoxFuture;

/// Synchronous producer: computes its value directly from resolved arguments
pub trait SyncProducer: Send + Sync + 'static {
    fn produce(&self, args: &Args) -> Result<Value, BoxError>;
}

/// Asynchronous producer: its returned future is the completion continuation
///
/// Implement this for types that carry state across invocations; plain async
/// closures are accepted through [`crate::Module::register_async`].
#[async_trait::async_trait]
pub trait AsyncProducer: Send + Sync + 'static {
    async fn produce(&self, args: Args) -> Result<Value, BoxError>;
}

/// Adapts a typed closure into a [`SyncProducer`]
pub(crate) struct SyncFn<F>(pub(crate) F);

impl<F, T> SyncProducer for SyncFn<F>
where
    F: Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    fn produce(&self, args: &Args) -> Result<Value, BoxError> {
        (self.0)(args).map(|value| Arc::new(value) as Value)
    }
}

/// Adapts a closure returning a future into an [`AsyncProducer`]
pub(crate) struct AsyncFn<F>(pub(crate) F);

#[async_trait::async_trait]
impl<F, Fut, T> AsyncProducer for AsyncFn<F>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    T: Any + Send + Sync,
{
    async fn produce(&self, args: Args) -> Result<Value, BoxError> {
        (self.0)(args).await.map(|value| Arc::new(value) as Value)
    }
}

/// The body of a task
#[derive(Clone)]
pub enum Producer {
    /// Returns its value immediately
    Sync(Arc<dyn SyncProducer>),
    /// Signals completion through a future
    Async(Arc<dyn AsyncProducer>),
    /// A value fixed at registration time
    Constant(Value),
}

impl Producer {
    /// Whether this producer is declared asynchronous
    pub fn is_async(&self) -> bool {
        matches!(self, Producer::Async(_))
    }

    pub(crate) fn launch(&self, args: Args) -> Launch {
        match self {
            Producer::Sync(producer) => Launch::Ready(producer.produce(&args)),
            Producer::Async(producer) => {
                let producer = producer.clone();
                Launch::Pending(Box::pin(async move { producer.produce(args).await }))
            }
            Producer::Constant(value) => Launch::Ready(Ok(value.clone())),
        }
    }
}

impl Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producer::Sync(_) => f.write_str("Producer::Sync"),
            Producer::Async(_) => f.write_str("Producer::Async"),
            Producer::Constant(_) => f.write_str("Producer::Constant"),
        }
    }
}

/// Outcome of launching a producer
pub(crate) enum Launch {
    Ready(Result<Value, BoxError>),
    Pending(BoxFuture<Result<Value, BoxError>>),
}

/// How a task was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Sync,
    Async,
    Constant,
}

/// A registered task: name, ordered dependency names, body and service flag
#[derive(Debug, Clone)]
pub struct TaskDef {
    name: String,
    dependencies: Vec<String>,
    producer: Producer,
    service: bool,
}

impl TaskDef {
    pub fn new(name: impl Into<String>, dependencies: &[&str], producer: Producer) -> Self {
        let dependencies = match producer {
            Producer::Constant(_) => Vec::new(),
            _ => dependencies.iter().map(|dep| dep.to_string()).collect(),
        };
        Self {
            name: name.into(),
            dependencies,
            producer,
            service: false,
        }
    }

    /// Mark the result of this task as memoized for the module lifetime
    pub fn into_service(mut self) -> Self {
        self.service = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn is_service(&self) -> bool {
        self.service
    }

    pub(crate) fn set_service(&mut self) {
        self.service = true;
    }

    pub fn kind(&self) -> TaskKind {
        match self.producer {
            Producer::Sync(_) => TaskKind::Sync,
            Producer::Async(_) => TaskKind::Async,
            Producer::Constant(_) => TaskKind::Constant,
        }
    }
}
