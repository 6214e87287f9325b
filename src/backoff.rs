// Copyright 2026, the Meshpilot authors
// SPDX-License-Identifier: Apache-2.0

//! Constant-delay retry primitive used for readiness and deletion waits.

use crate::error::{MeshError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Bounded constant-delay backoff policy.
///
/// Each attempt invokes the probe once. Errors are retried after `delay`
/// unless the error reports itself permanent, which aborts the loop
/// immediately. The loop terminates after `max_retries` attempts or once
/// `max_elapsed` has passed, whichever comes first. The returned future is
/// cancellation-safe: dropping it stops the loop at the current suspension
/// point.
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    delay: Duration,
    max_retries: u32,
    max_elapsed: Option<Duration>,
}

impl Waiter {
    pub const fn new(delay: Duration, max_retries: u32) -> Self {
        Self {
            delay,
            max_retries,
            max_elapsed: None,
        }
    }

    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Run `probe` until it succeeds or the retry budget is exhausted.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut last: Option<MeshError> = None;

        for attempt in 1..=self.max_retries {
            match probe().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    debug!(what, attempt, error = %e, "attempt failed");
                    last = Some(e);
                }
            }

            if let Some(max_elapsed) = self.max_elapsed {
                if started.elapsed() >= max_elapsed {
                    return Err(self.exhausted(what, attempt, last));
                }
            }

            if attempt < self.max_retries {
                sleep(self.delay).await;
            }
        }

        Err(self.exhausted(what, self.max_retries, last))
    }

    fn exhausted(&self, what: &str, attempts: u32, last: Option<MeshError>) -> MeshError {
        match last {
            Some(source) => MeshError::RetriesExhausted {
                what: what.to_string(),
                attempts,
                source: Box::new(source),
            },
            None => MeshError::Deadline(what.to_string()),
        }
    }
}
