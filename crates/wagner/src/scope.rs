//! Error-forwarding scope for completion continuations

use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{panic_message, BoxError};

/// An error delivered to every subscriber of an [`ErrorScope`]
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

const DEFAULT_CAPACITY: usize = 64;

/// Republishes failures of wrapped continuations to its subscribers instead of
/// returning them to the caller of the continuation
#[derive(Debug, Clone)]
pub struct ErrorScope {
    sender: broadcast::Sender<SharedError>,
}

impl Default for ErrorScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorScope {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a scope that buffers up to `capacity` errors per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every error emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SharedError> {
        self.sender.subscribe()
    }

    /// Publish an error, returning how many subscribers received it
    pub fn emit(&self, error: impl Into<BoxError>) -> usize {
        let error: SharedError = Arc::from(error.into());
        match self.sender.send(error) {
            Ok(receivers) => receivers,
            Err(unheard) => {
                debug!(error = %unheard.0, "Error emitted without subscribers");
                0
            }
        }
    }

    /// Wrap `f` into a continuation taking a `Result`.
    ///
    /// An `Err` argument, an error returned by `f` and a panic inside `f` are
    /// all emitted on this scope.
    pub fn wrap<T, E, F>(&self, f: F) -> impl FnOnce(Result<T, E>) + Send + 'static
    where
        E: Into<BoxError>,
        F: FnOnce(T) -> Result<(), BoxError> + Send + 'static,
    {
        let scope = self.clone();
        move |result| {
            let value = match result {
                Ok(value) => value,
                Err(error) => {
                    scope.emit(error);
                    return;
                }
            };
            match panic::catch_unwind(AssertUnwindSafe(|| f(value))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    scope.emit(error);
                }
                Err(payload) => {
                    scope.emit(format!("panicked: {}", panic_message(payload.as_ref())));
                }
            }
        }
    }
}
