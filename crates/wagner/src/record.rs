//! Per-invocation resolution record

use std::collections::HashMap;

use crate::context::{Args, Value};

/// Progress of one name within an invocation.
///
/// Moves `Pending -> Running -> Succeeded | Failed`; terminal slots never change.
#[derive(Clone, Default)]
pub enum Slot {
    #[default]
    Pending,
    Running,
    Succeeded(Value),
    Failed,
}

impl Slot {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Slot::Succeeded(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Slot::Succeeded(_) | Slot::Failed)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Pending => f.write_str("Pending"),
            Slot::Running => f.write_str("Running"),
            Slot::Succeeded(_) => f.write_str("Succeeded"),
            Slot::Failed => f.write_str("Failed"),
        }
    }
}

/// Tracks execution progress of every name touched by one invocation
#[derive(Debug, Default)]
pub struct ResolutionRecord {
    slots: HashMap<String, Slot>,
    failed: bool,
}

impl ResolutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value that needs no producer call (local, constant or cache hit)
    pub fn resolved(&mut self, name: &str, value: Value) {
        self.slots.insert(name.to_string(), Slot::Succeeded(value));
    }

    /// Move a pending task to running. Returns `false` if it was already started.
    pub fn start(&mut self, name: &str) -> bool {
        let slot = self.slots.entry(name.to_string()).or_default();
        if !slot.is_pending() || self.failed {
            return false;
        }
        *slot = Slot::Running;
        true
    }

    /// Record a successful result. Ignored once the invocation failed or the slot is finished.
    pub fn succeed(&mut self, name: &str, value: Value) -> bool {
        if self.failed {
            return false;
        }
        match self.slots.get_mut(name) {
            Some(slot @ Slot::Running) => {
                *slot = Slot::Succeeded(value);
                true
            }
            _ => false,
        }
    }

    /// Record a failure. Only the first failure of an invocation is accepted.
    pub fn fail(&mut self, name: &str) -> bool {
        if self.failed {
            return false;
        }
        self.failed = true;
        if let Some(slot) = self.slots.get_mut(name) {
            if !slot.is_finished() {
                *slot = Slot::Failed;
            }
        }
        true
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn is_done(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(Slot::is_done)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).and_then(Slot::value)
    }

    /// Check whether every dependency is done
    pub fn is_ready(&self, dependencies: &[String]) -> bool {
        dependencies.iter().all(|dep| self.is_done(dep))
    }

    /// Check whether all the given names are done
    pub fn all_done<'a>(&self, mut names: impl Iterator<Item = &'a str>) -> bool {
        names.all(|name| self.is_done(name))
    }

    /// Build arguments in the given order, leaving unresolved names empty
    pub fn args<S: AsRef<str>>(&self, names: &[S]) -> Args {
        Args::from_entries(
            names
                .iter()
                .map(|name| (name.as_ref().to_string(), self.value(name.as_ref()).cloned()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slot_transitions() {
        let mut record = ResolutionRecord::new();

        assert!(record.start("eggs"));
        assert!(!record.start("eggs"));
        assert!(record.slot("eggs").is_some_and(|slot| !slot.is_finished()));

        assert!(record.succeed("eggs", Arc::new(2)));
        assert!(record.is_done("eggs"));
        assert!(!record.succeed("eggs", Arc::new(3)));
        assert_eq!(record.value("eggs").and_then(|v| v.downcast_ref::<i32>()), Some(&2));
    }

    #[test]
    fn test_cannot_succeed_without_start() {
        let mut record = ResolutionRecord::new();
        assert!(!record.succeed("bacon", Arc::new(1)));
        assert!(record.slot("bacon").is_none());
    }

    #[test]
    fn test_first_failure_wins() {
        let mut record = ResolutionRecord::new();
        record.start("eggs");
        record.start("bacon");

        assert!(record.fail("eggs"));
        assert!(!record.fail("bacon"));
        assert!(!record.succeed("bacon", Arc::new(1)));
        assert!(!record.start("toast"));

        assert!(matches!(record.slot("eggs"), Some(Slot::Failed)));
        assert!(matches!(record.slot("bacon"), Some(Slot::Running)));
    }

    #[test]
    fn test_readiness_and_args() {
        let mut record = ResolutionRecord::new();
        record.resolved("pan", Arc::new("cast iron"));
        record.start("eggs");

        assert!(record.is_ready(&["pan".to_string()]));
        assert!(!record.is_ready(&["pan".to_string(), "eggs".to_string()]));
        assert!(record.all_done(["pan"].into_iter()));

        let args = record.args(&["pan", "eggs"]);
        assert_eq!(args.get::<&str>("pan"), Ok("cast iron"));
        assert!(!args.is_resolved("eggs"));
    }
}
