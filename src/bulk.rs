//! Bulk fan-out of independent record operations.
//!
//! [dispatch] runs N single-record operations with bounded concurrency and
//! collects one [Outcome] per input, in input order, no matter in which
//! order the underlying requests complete. A failed item never disturbs its
//! siblings; the whole batch always runs to completion (or to the optional
//! overall deadline).

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt as _};
use tokio::sync::Semaphore;

use crate::async_client::Error;

/// The default bound on in-flight requests.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Options for a bulk dispatch.
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    /// The maximum number of operations in flight at once. Must be positive.
    pub concurrency: usize,

    /// An overall deadline for the whole batch. On expiry, outcomes already
    /// resolved are kept and every unresolved item fails with
    /// [Error::Timeout].
    pub timeout: Option<Duration>,

    /// Fail the batch with [BulkError::TotalFailure] if every single item
    /// fails. Off by default; the all-failure result is returned like any
    /// other.
    pub fail_on_total_failure: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: None,
            fail_on_total_failure: false,
        }
    }
}

/// The result of one item in a bulk dispatch.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation succeeded.
    Success(T),
    /// The operation failed. Sibling items are unaffected.
    Failure(Error),
}

impl<T> Outcome<T> {
    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether the operation failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// The success value, if there is one.
    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    /// The error, if the operation failed.
    pub fn failure(&self) -> Option<&Error> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(e) => Some(e),
        }
    }

    /// Convert into a plain [Result].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(e) => Err(e),
        }
    }
}

/// The aggregate result of a bulk dispatch. Always holds exactly one
/// [Outcome] per input item, at the input's position.
#[derive(Debug)]
pub struct BulkResult<T> {
    outcomes: Vec<Outcome<T>>,
}

impl<T> BulkResult<T> {
    /// The per-item outcomes, in input order.
    pub fn outcomes(&self) -> &[Outcome<T>] {
        &self.outcomes
    }

    /// Consume the result, yielding the per-item outcomes in input order.
    pub fn into_outcomes(self) -> Vec<Outcome<T>> {
        self.outcomes
    }

    /// Consume the result, yielding one [Result] per input item.
    pub fn into_results(self) -> Vec<Result<T, Error>> {
        self.outcomes.into_iter().map(Outcome::into_result).collect()
    }

    /// The number of items in the batch.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The number of items that succeeded.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// The number of items that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Whether every item succeeded. Vacuously true for an empty batch.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    /// Whether every item in a non-empty batch failed.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.is_failure())
    }

    /// The successful items, with their input positions.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.success().map(|v| (i, v)))
    }

    /// The failed items, with their input positions.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.failure().map(|e| (i, e)))
    }
}

/// A batch-level contract violation. Per-item failures are reported through
/// [BulkResult], never through this type, except for the opt-in
/// total-failure mode.
#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    /// The concurrency limit was zero.
    #[error("Concurrency limit must be positive")]
    InvalidConcurrency,

    /// Every item in the batch failed, and
    /// [BulkOptions::fail_on_total_failure] was set.
    #[error("All {} operations in the batch failed", errors.len())]
    TotalFailure {
        /// The per-item errors, with their input positions.
        errors: Vec<(usize, Error)>,
    },
}

/// Run one operation per item, with at most [BulkOptions::concurrency]
/// operations in flight at once.
///
/// The operation is any async closure from a payload to a value, so the same
/// dispatcher serves inserts, updates, and deletes. Items are launched
/// eagerly; item *i + 1* never waits on the completion of item *i*, only on
/// a free permit. Each outcome is recorded at the item's input position.
///
/// No retries happen at this level; retry policy belongs to the transport.
pub async fn dispatch<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    options: &BulkOptions,
    op: F,
) -> Result<BulkResult<R>, BulkError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    if options.concurrency == 0 {
        return Err(BulkError::InvalidConcurrency);
    }

    let deadline = options.timeout.map(|t| tokio::time::Instant::now() + t);
    let semaphore = Semaphore::new(options.concurrency);

    // All item futures are driven on the current task; the semaphore, not
    // task scheduling, bounds how many requests are actually in flight.
    let mut in_flight: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let semaphore = &semaphore;
            let op = &op;
            async move {
                // Released on every exit path when the guard drops.
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("permit semaphore is never closed");
                (index, op(item).await)
            }
        })
        .collect();

    let mut slots: Vec<Option<Outcome<R>>> = Vec::new();
    slots.resize_with(in_flight.len(), || None);

    loop {
        let completed = match deadline {
            Some(d) => match tokio::time::timeout_at(d, in_flight.next()).await {
                Ok(completed) => completed,
                // Deadline expired; unresolved slots become timeouts below.
                Err(_) => break,
            },
            None => in_flight.next().await,
        };

        match completed {
            Some((index, Ok(value))) => slots[index] = Some(Outcome::Success(value)),
            Some((index, Err(e))) => slots[index] = Some(Outcome::Failure(e)),
            None => break,
        }
    }

    drop(in_flight);

    let result = BulkResult {
        outcomes: slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Outcome::Failure(Error::Timeout)))
            .collect(),
    };

    if options.fail_on_total_failure && result.all_failed() {
        let errors = result
            .into_outcomes()
            .into_iter()
            .enumerate()
            .filter_map(|(i, o)| match o {
                Outcome::Failure(e) => Some((i, e)),
                Outcome::Success(_) => None,
            })
            .collect();

        return Err(BulkError::TotalFailure { errors });
    }

    Ok(result)
}
