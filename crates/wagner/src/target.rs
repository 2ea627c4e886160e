//! The function an invocation resolves its values for

use std::collections::HashSet;
use std::fmt;

use crate::context::Args;
use crate::error::{ConfigError, ConfigResult, WagnerError};
use crate::types::ModuleConfig;

type TargetBody<R> = Box<dyn FnOnce(Option<WagnerError>, Args) -> R + Send>;

/// Declared parameter names plus a body, called once with the resolved values.
///
/// A target built with [`Target::with_error`] receives the invocation error as
/// a leading argument instead of having it returned to the caller.
pub struct Target<R> {
    params: Vec<String>,
    takes_error: bool,
    body: TargetBody<R>,
}

impl<R> Target<R> {
    /// A target that is only called when every parameter resolved
    pub fn new<F>(params: &[&str], body: F) -> Self
    where
        F: FnOnce(Args) -> R + Send + 'static,
    {
        Self {
            params: params.iter().map(|param| param.to_string()).collect(),
            takes_error: false,
            body: Box::new(move |_: Option<WagnerError>, args: Args| body(args)),
        }
    }

    /// A target that also receives the first error and the partially resolved values
    pub fn with_error<F>(params: &[&str], body: F) -> Self
    where
        F: FnOnce(Option<WagnerError>, Args) -> R + Send + 'static,
    {
        Self {
            params: params.iter().map(|param| param.to_string()).collect(),
            takes_error: true,
            body: Box::new(body),
        }
    }

    /// Dependency names in declaration order
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn takes_error(&self) -> bool {
        self.takes_error
    }

    /// Reject reserved error names and duplicates among the dependency names
    pub(crate) fn validate_params(&self, config: &ModuleConfig) -> ConfigResult<()> {
        let mut seen = HashSet::with_capacity(self.params.len());
        for param in &self.params {
            if config.is_error_param(param) {
                return Err(ConfigError::ReservedParameter { name: param.clone() });
            }
            if !seen.insert(param.as_str()) {
                return Err(ConfigError::DuplicateParameter { name: param.clone() });
            }
        }
        Ok(())
    }

    pub(crate) fn call(self, error: Option<WagnerError>, args: Args) -> R {
        (self.body)(error, args)
    }
}

impl<R> fmt::Debug for Target<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("params", &self.params)
            .field("takes_error", &self.takes_error)
            .finish_non_exhaustive()
    }
}
