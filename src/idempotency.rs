//! Idempotent mutation layer.
//!
//! Every mutating route runs its work through [`IdempotencyLayer::run`] keyed
//! by the client's `Idempotency-Key` header. Within the retention window two
//! calls with the same key observe exactly one execution: a cached terminal
//! outcome is replayed as-is, and concurrent callers for an in-flight key all
//! await the same result over a watch channel.
//!
//! Infrastructure failures are retried with exponential backoff and jitter;
//! domain outcomes (validation errors, not-found) are terminal immediately and
//! cached like successes so a replayed request cannot flip its answer.

use crate::cache::Clock;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Terminal result of a mutation: HTTP status plus the JSON body to replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Outcome {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
        }
    }
}

/// Failure modes a unit of work can report.
#[derive(Debug)]
pub enum WorkError {
    /// Infrastructure failure worth retrying (pool exhaustion, upstream I/O).
    Retryable(anyhow::Error),
    /// Domain outcome that must be cached and replayed, never retried.
    Terminal(Outcome),
}

/// Per-call execution limits.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Hard timeout per attempt; a timed-out attempt counts as retryable.
    pub timeout: Duration,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
}

enum Entry {
    InFlight(watch::Receiver<Option<Outcome>>),
    Done {
        outcome: Outcome,
        expires_at: Instant,
    },
}

enum Claim {
    Cached(Outcome),
    Wait(watch::Receiver<Option<Outcome>>),
    Execute(watch::Sender<Option<Outcome>>),
}

/// Derive the stored key from a route scope and the client-supplied key, so
/// the same client key on different routes never collides.
pub fn scoped_key(scope: &str, client_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(client_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct IdempotencyLayer {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl IdempotencyLayer {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Execute `work` at most once per key within the retention window.
    ///
    /// `work` is a factory so each retry attempt gets a fresh future. With no
    /// key the work still runs under the timeout/retry policy but nothing is
    /// cached or deduplicated.
    pub async fn run<F, Fut>(&self, key: Option<&str>, opts: RunOptions, mut work: F) -> Outcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Outcome, WorkError>>,
    {
        let Some(key) = key else {
            return self.execute(opts, &mut work).await;
        };

        loop {
            // The cache check and in-flight registration happen under one
            // synchronous lock with no await point in between, so two callers
            // racing on a fresh key cannot both claim execution.
            let claim = {
                let mut entries = self.entries.lock().expect("idempotency lock poisoned");
                match entries.get(key) {
                    Some(Entry::Done {
                        outcome,
                        expires_at,
                    }) if *expires_at > self.clock.now() => Claim::Cached(outcome.clone()),
                    Some(Entry::InFlight(rx)) => Claim::Wait(rx.clone()),
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        entries.insert(key.to_string(), Entry::InFlight(rx));
                        Claim::Execute(tx)
                    }
                }
            };

            match claim {
                Claim::Cached(outcome) => {
                    debug!(key, status = outcome.status, "Replaying cached outcome");
                    return outcome;
                }
                Claim::Wait(mut rx) => {
                    loop {
                        let published = rx.borrow().clone();
                        if let Some(outcome) = published {
                            return outcome;
                        }
                        if rx.changed().await.is_err() {
                            // The executing caller was cancelled before
                            // publishing; drop its stale entry and retake.
                            break;
                        }
                    }
                    let mut entries = self.entries.lock().expect("idempotency lock poisoned");
                    if matches!(entries.get(key), Some(Entry::InFlight(_))) {
                        entries.remove(key);
                    }
                    continue;
                }
                Claim::Execute(tx) => {
                    let outcome = self.execute(opts, &mut work).await;
                    {
                        let mut entries =
                            self.entries.lock().expect("idempotency lock poisoned");
                        entries.insert(
                            key.to_string(),
                            Entry::Done {
                                outcome: outcome.clone(),
                                expires_at: self.clock.now() + self.ttl,
                            },
                        );
                    }
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    async fn execute<F, Fut>(&self, opts: RunOptions, work: &mut F) -> Outcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Outcome, WorkError>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match tokio::time::timeout(opts.timeout, work()).await {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(WorkError::Terminal(outcome))) => return outcome,
                Ok(Err(WorkError::Retryable(err))) => err.to_string(),
                Err(_) => format!("attempt timed out after {:?}", opts.timeout),
            };

            if attempt > opts.max_retries {
                warn!(attempt, error = %failure, "Mutation failed after exhausting retries");
                return Outcome::error(500, "Operation failed after retries");
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(Duration::from_millis(200));
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retrying mutation"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drop expired terminal entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("idempotency lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| match entry {
            Entry::InFlight(_) => true,
            Entry::Done { expires_at, .. } => *expires_at > now,
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("idempotency lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
