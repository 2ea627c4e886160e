//! Error types for the Wagner dependency injector and task scheduler

use std::any::Any;

use thiserror::Error;

/// Boxed error returned by task producers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for Wagner operations
#[derive(Error, Debug)]
pub enum WagnerError {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Argument error: {0}")]
    Argument(#[from] ArgumentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Structural errors found while resolving the working graph.
///
/// These are always reported before any producer runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No such dependency: {name}{}", .requested_by.as_ref().map(|by| format!(" (required by {by})")).unwrap_or_default())]
    MissingDependency {
        name: String,
        requested_by: Option<String>,
    },

    #[error("Cycle detected: {}", .path.join(" <- "))]
    Cycle { path: Vec<String> },

    #[error("Called invoke() with async dependency {name}")]
    AsyncDependency { name: String },
}

/// Errors raised while producers run
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task {task_name} failed: {source}")]
    TaskFailed {
        task_name: String,
        #[source]
        source: BoxError,
    },

    #[error("Task {task_name} panicked: {message}")]
    TaskPanicked { task_name: String, message: String },

    #[error("Invocation stalled with {} task(s) pending: {}", .pending.len(), .pending.join(", "))]
    Stalled { pending: Vec<String> },
}

/// Errors related to module and registry bookkeeping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("Module {0} is not declared")]
    UnknownModule(String),

    #[error("Task {0} is not registered")]
    UnknownTask(String),
}

/// Errors produced by the typed accessors on [`crate::Args`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("No argument named {name}")]
    Missing { name: String },

    #[error("Argument {name} was not resolved")]
    Unresolved { name: String },

    #[error("Argument {name} is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Errors related to configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Parameter name {name} is reserved for the error argument")]
    ReservedParameter { name: String },

    #[error("Duplicate parameter name {name}")]
    DuplicateParameter { name: String },

    #[error("Error parameter names must not be empty strings")]
    EmptyErrorParameter,
}

/// Result type alias for Wagner operations
pub type WagnerResult<T> = Result<T, WagnerError>;

/// Result type alias for resolution
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type alias for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

impl WagnerError {
    /// Wrap a producer failure for the named task
    pub fn task_failed<S: Into<String>>(task_name: S, source: BoxError) -> Self {
        WagnerError::Execution(ExecutionError::TaskFailed {
            task_name: task_name.into(),
            source,
        })
    }

    /// The producer error carried by this error, if any
    pub fn task_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            WagnerError::Execution(ExecutionError::TaskFailed { source, .. }) => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Name of the task whose producer failed or panicked
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            WagnerError::Execution(ExecutionError::TaskFailed { task_name, .. })
            | WagnerError::Execution(ExecutionError::TaskPanicked { task_name, .. }) => Some(task_name),
            _ => None,
        }
    }

    /// Check if this error is a dependency cycle
    pub fn is_cycle(&self) -> bool {
        matches!(self, WagnerError::Resolve(ResolveError::Cycle { .. }))
    }

    /// Check if this error is a missing dependency
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, WagnerError::Resolve(ResolveError::MissingDependency { .. }))
    }

    /// Check if this error rejects an async task inside `invoke()`
    pub fn is_async_dependency(&self) -> bool {
        matches!(self, WagnerError::Resolve(ResolveError::AsyncDependency { .. }))
    }

    /// Check if this error is structural, i.e. raised before anything ran
    pub fn is_structural(&self) -> bool {
        matches!(self, WagnerError::Resolve(_) | WagnerError::Config(_))
    }
}

impl ResolveError {
    /// Create a missing dependency error
    pub fn missing<S: Into<String>>(name: S, requested_by: Option<&str>) -> Self {
        ResolveError::MissingDependency {
            name: name.into(),
            requested_by: requested_by.map(str::to_string),
        }
    }

    /// Create a cycle error from the names on the traversal stack
    pub fn cycle(path: Vec<String>) -> Self {
        ResolveError::Cycle { path }
    }
}

/// Text of a caught panic payload, if it carried one
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl ArgumentError {
    pub(crate) fn type_mismatch<T>(name: &str) -> Self {
        ArgumentError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }
}
