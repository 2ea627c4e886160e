//! Fan-out and series helpers for independent asynchronous operations

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

use futures::future::{self, FutureExt};
use thiserror::Error;

use crate::error::{panic_message, BoxError};

/// Outcome of [`parallel`]: every key ends up in exactly one of the two collections
#[derive(Debug)]
pub struct FanOut<K, O> {
    pub results: HashMap<K, O>,
    /// Failures in input order
    pub errors: Vec<(K, BoxError)>,
}

impl<K: Eq + Hash, O> FanOut<K, O> {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fail with every collected error, or return all results
    pub fn into_result(self) -> Result<HashMap<K, O>, ParallelError<K>> {
        if self.errors.is_empty() {
            Ok(self.results)
        } else {
            Err(ParallelError { errors: self.errors })
        }
    }
}

/// One or more operations of a [`parallel`] call failed
#[derive(Debug)]
pub struct ParallelError<K> {
    pub errors: Vec<(K, BoxError)>,
}

impl<K> fmt::Display for ParallelError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Errors in parallel(): ")?;
        for (index, (_, error)) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl<K: fmt::Debug> Error for ParallelError<K> {}

/// An item of a [`series`] call failed; later items never ran
#[derive(Error, Debug)]
#[error("Item {index} failed: {error}")]
pub struct SeriesError {
    pub index: usize,
    #[source]
    pub error: BoxError,
}

fn caught<O>(payload: Box<dyn std::any::Any + Send>) -> Result<O, BoxError> {
    Err(format!("panicked: {}", panic_message(payload.as_ref())).into())
}

/// Run `op(value, key)` for every item concurrently and wait for all of them.
///
/// Failures never short-circuit the others. A panic inside `op` counts as a
/// failure of that key.
pub async fn parallel<K, V, O, F, Fut, I>(items: I, op: F) -> FanOut<K, O>
where
    I: IntoIterator<Item = (K, V)>,
    K: Eq + Hash + Clone,
    F: Fn(V, K) -> Fut,
    Fut: Future<Output = Result<O, BoxError>>,
{
    let pending = items.into_iter().map(|(key, value)| {
        let started = panic::catch_unwind(AssertUnwindSafe(|| op(value, key.clone())));
        async move {
            let outcome = match started {
                Ok(future) => AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(caught),
                Err(payload) => caught(payload),
            };
            (key, outcome)
        }
    });

    let mut fan_out = FanOut {
        results: HashMap::new(),
        errors: Vec::new(),
    };
    for (key, outcome) in future::join_all(pending).await {
        match outcome {
            Ok(result) => {
                fan_out.results.insert(key, result);
            }
            Err(error) => fan_out.errors.push((key, error)),
        }
    }
    fan_out
}

/// Run `op(value, index)` for every item, one at a time, stopping at the first failure
pub async fn series<V, O, F, Fut, I>(items: I, mut op: F) -> Result<Vec<O>, SeriesError>
where
    I: IntoIterator<Item = V>,
    F: FnMut(V, usize) -> Fut,
    Fut: Future<Output = Result<O, BoxError>>,
{
    let mut results = Vec::new();
    for (index, value) in items.into_iter().enumerate() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| op(value, index))) {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(caught),
            Err(payload) => caught(payload),
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(error) => return Err(SeriesError { index, error }),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::*;

    #[tokio::test]
    async fn test_parallel_collects_results_and_errors() {
        let items = vec![("eggs", 1u64), ("bacon", 2), ("toast", 3)];
        let fan_out = parallel(items, |minutes, food| async move {
            if food == "toast" {
                return Err::<String, BoxError>("burnt".into());
            }
            tokio::time::sleep(Duration::from_millis(minutes)).await;
            Ok(format!("{food} ready"))
        })
        .await;

        assert!(!fan_out.is_ok());
        assert_eq!(fan_out.results.len(), 2);
        assert_eq!(fan_out.results["eggs"], "eggs ready");
        assert_eq!(fan_out.errors.len(), 1);
        assert_eq!(fan_out.errors[0].0, "toast");

        let error = fan_out.into_result().unwrap_err();
        assert_eq!(error.to_string(), "Errors in parallel(): burnt");
    }

    #[tokio::test]
    async fn test_parallel_runs_concurrently() {
        let start = Instant::now();
        let fan_out = parallel((0..4).map(|key| (key, key)), |_, _| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok::<_, BoxError>(())
        })
        .await;

        assert!(fan_out.into_result().is_ok());
        assert!(start.elapsed() < Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_parallel_catches_panics() {
        let fan_out = parallel(vec![("eggs", ()), ("bacon", ())], |_, food| async move {
            if food == "eggs" {
                panic!("dropped");
            }
            Ok::<_, BoxError>(food)
        })
        .await;

        assert_eq!(fan_out.results.len(), 1);
        assert_eq!(fan_out.errors[0].1.to_string(), "panicked: dropped");
    }

    #[tokio::test]
    async fn test_series_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let results = series(vec!["eggs", "bacon"], move |food, index| {
            log.lock().unwrap().push(index);
            async move { Ok::<_, BoxError>(food.len()) }
        })
        .await
        .unwrap();

        assert_eq!(results, [4, 5]);
        assert_eq!(*seen.lock().unwrap(), [0, 1]);
    }

    #[tokio::test]
    async fn test_series_stops_at_first_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let error = series(vec![1, 2, 3], move |value, index| {
            log.lock().unwrap().push(index);
            async move {
                if value == 2 {
                    Err::<(), BoxError>("no more eggs".into())
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap_err();

        assert_eq!(error.index, 1);
        assert_eq!(error.to_string(), "Item 1 failed: no more eggs");
        assert_eq!(*seen.lock().unwrap(), [0, 1]);
    }
}
