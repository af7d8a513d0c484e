//! Detached background work with per-task deadlines.
//!
//! View recording and search index maintenance must never add latency to the
//! request that triggered them. They are handed to [`BackgroundTasks`], which
//! runs each future on the runtime under its own deadline. Nothing awaits the
//! outcome: failures and timeouts are logged and dropped. [`BackgroundTasks::drain`]
//! waits for everything in flight and is used on shutdown and in tests.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub(crate) const METRIC_TASK_TIMEOUT_TOTAL: &str = "folio_background_task_timeout_total";

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inflight: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached. It is cancelled once `deadline` elapses.
    pub fn spawn<F>(&self, name: &'static str, deadline: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.lock("spawn");
        // reap finished tasks so the set does not grow without bound
        while let Some(result) = set.try_join_next() {
            log_join_error(result);
        }

        set.spawn(async move {
            if tokio::time::timeout(deadline, task).await.is_err() {
                counter!(METRIC_TASK_TIMEOUT_TOTAL, "task" => name).increment(1);
                warn!(
                    task = name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Background task exceeded its deadline"
                );
            }
        });
    }

    /// Number of tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.lock("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far, including ones spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock("drain"));
            if batch.is_empty() {
                return;
            }
            debug!(pending = batch.len(), "Draining background tasks");
            while let Some(result) = batch.join_next().await {
                log_join_error(result);
            }
        }
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, JoinSet<()>> {
        match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    op,
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned background task set"
                );
                poisoned.into_inner()
            }
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            warn!(error = %err, "Background task panicked");
        }
    }
}
