//! Common types and configuration for Wagner modules

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Parameter names that mark a target's leading error argument by default
pub const DEFAULT_ERROR_PARAM_NAMES: [&str; 2] = ["error", "err"];

/// Configuration for a [`crate::Module`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Yield to the runtime between scheduling passes that ran producers inline
    pub yield_between_passes: bool,

    /// Turn producer panics inside `invoke_async` into [`crate::ExecutionError::TaskPanicked`].
    /// `invoke` always lets them unwind.
    pub catch_panics: bool,

    /// Send [`crate::InvocationEvent`]s for asynchronous invocations
    pub report_events: bool,

    /// Names reserved for a target's error argument
    pub error_param_names: Vec<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            yield_between_passes: true,
            catch_panics: true,
            report_events: true,
            error_param_names: DEFAULT_ERROR_PARAM_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl ModuleConfig {
    /// Create a new module configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the yield between scheduling passes
    pub fn with_yield_between_passes(mut self, enabled: bool) -> Self {
        self.yield_between_passes = enabled;
        self
    }

    /// Enable or disable panic capture
    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Enable or disable invocation events
    pub fn with_event_reporting(mut self, enabled: bool) -> Self {
        self.report_events = enabled;
        self
    }

    /// Replace the reserved error parameter names
    pub fn with_error_param_names<I, S>(mut self, names: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_param_names = names.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    /// Check whether `name` is reserved for the error argument
    pub fn is_error_param(&self, name: &str) -> bool {
        self.error_param_names.iter().any(|reserved| reserved == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        for (index, name) in self.error_param_names.iter().enumerate() {
            if name.is_empty() {
                return Err(ConfigError::EmptyErrorParameter);
            }
            if self.error_param_names[..index].contains(name) {
                return Err(ConfigError::DuplicateParameter { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Create a configuration for deterministic tests: panics propagate and
    /// no events are sent
    pub fn for_testing() -> Self {
        Self {
            yield_between_passes: true,
            catch_panics: false,
            report_events: false,
            error_param_names: DEFAULT_ERROR_PARAM_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// Statistics of one finished invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationStats {
    /// Names the invocation needed
    pub required_tasks: usize,

    /// Producers that ran to success
    pub executed_tasks: usize,

    /// Values taken from the service cache
    pub cache_hits: usize,

    /// Producers that failed or panicked
    pub failed_tasks: usize,

    /// Scheduling passes over the ready set
    pub passes: usize,

    /// Largest number of asynchronous producers in flight at once
    pub peak_in_flight: usize,

    /// Wall-clock time from the first pass to completion
    pub total_duration: Duration,
}

impl InvocationStats {
    /// Check if the invocation completed without a failure
    pub fn is_successful(&self) -> bool {
        self.failed_tasks == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModuleConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.yield_between_passes);
        assert!(config.catch_panics);
        assert!(config.is_error_param("err"));
        assert!(!config.is_error_param("eggs"));
    }

    #[test]
    fn test_config_builder() {
        let config = ModuleConfig::new()
            .with_catch_panics(false)
            .with_event_reporting(false)
            .with_error_param_names(["failure"])
            .unwrap();

        assert!(!config.catch_panics);
        assert!(!config.report_events);
        assert!(config.is_error_param("failure"));
        assert!(!config.is_error_param("error"));
    }

    #[test]
    fn test_invalid_config() {
        let result = ModuleConfig::new().with_error_param_names(["error", "error"]);
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateParameter { name: "error".to_string() }
        );

        let result = ModuleConfig::new().with_error_param_names([""]);
        assert_eq!(result.unwrap_err(), ConfigError::EmptyErrorParameter);
    }

    #[test]
    fn test_testing_preset() {
        let config = ModuleConfig::for_testing();
        assert!(config.validate().is_ok());
        assert!(!config.catch_panics);
        assert!(!config.report_events);
    }

    #[test]
    fn test_invocation_stats() {
        let stats = InvocationStats::default();
        assert_eq!(stats.executed_tasks, 0);
        assert!(stats.is_successful());
    }
}
