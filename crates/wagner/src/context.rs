//! Resolved arguments handed to producers and targets

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::ArgumentError;

/// A type-erased task value
pub type Value = Arc<dyn Any + Send + Sync>;

/// Positional, named arguments resolved for one producer or target call.
///
/// Entries follow the declared dependency order of the callee. On a failed
/// asynchronous invocation an error-aware target receives unresolved entries
/// as `None`.
#[derive(Clone, Default)]
pub struct Args {
    entries: Vec<(String, Option<Value>)>,
}

impl Args {
    pub(crate) fn from_entries(entries: Vec<(String, Option<Value>)>) -> Self {
        Self { entries }
    }

    /// Get a clone of the named argument
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self.resolved(name)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ArgumentError::type_mismatch::<T>(name))
    }

    /// Get the named argument as a shared pointer, without cloning the value
    pub fn get_arc<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ArgumentError> {
        let value = self.resolved(name)?.clone();
        value
            .downcast::<T>()
            .map_err(|_| ArgumentError::type_mismatch::<T>(name))
    }

    /// Get a clone of the argument at `index`, in declaration order
    pub fn at<T: Clone + Send + Sync + 'static>(&self, index: usize) -> Result<T, ArgumentError> {
        let Some((name, _)) = self.entries.get(index) else {
            return Err(ArgumentError::Missing {
                name: format!("#{index}"),
            });
        };
        self.get(name)
    }

    /// Get the named argument if it is resolved and has type `T`
    pub fn try_get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.get(name).ok()
    }

    /// Raw access to the named argument
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Check whether the named argument carries a value
    pub fn is_resolved(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolved(&self, name: &str) -> Result<&Value, ArgumentError> {
        match self.entries.iter().find(|(entry, _)| entry == name) {
            Some((_, Some(value))) => Ok(value),
            Some((_, None)) => Err(ArgumentError::Unresolved {
                name: name.to_string(),
            }),
            None => Err(ArgumentError::Missing {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(name, value)| (name, if value.is_some() { "resolved" } else { "unresolved" })),
            )
            .finish()
    }
}

/// Per-invocation override values that shadow registered tasks
#[derive(Clone, Default)]
pub struct Locals {
    entries: Vec<(String, Value)>,
}

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local, replacing an earlier one with the same name
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.insert_value(name, Arc::new(value));
    }

    /// Add an already type-erased value
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(entry, _)| *entry == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry, _)| entry == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl fmt::Debug for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(name, _)| name)).finish()
    }
}
