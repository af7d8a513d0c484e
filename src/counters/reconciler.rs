//! Periodic reconciliation of buffered counters into the durable store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::accelerator::{Accelerator, AcceleratorError, decode_counter, with_deadline};
use crate::application::repos::{ArticlesRepo, RepoError};
use crate::cache::Keyspace;
use crate::domain::types::CounterKind;

pub(crate) const METRIC_RECONCILE_APPLIED_TOTAL: &str = "folio_reconcile_applied_total";
pub(crate) const METRIC_RECONCILE_FAILED_TOTAL: &str = "folio_reconcile_failed_total";
pub(crate) const METRIC_RECONCILE_FLUSH_MS: &str = "folio_reconcile_flush_ms";

const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// Keys requested per scan page.
    pub batch_size: usize,
    /// Deadline for each accelerator call made during a flush.
    pub operation_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl From<&crate::config::ReconcilerSettings> for ReconcilerConfig {
    fn from(settings: &crate::config::ReconcilerSettings) -> Self {
        Self {
            interval: settings.interval,
            batch_size: settings.batch_size.get() as usize,
            operation_timeout: settings.operation_timeout,
        }
    }
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Keys returned by the scans.
    pub scanned: usize,
    /// Keys whose delta was written to the store.
    pub applied: usize,
    /// Keys removed without a store write (zero, malformed, or orphaned).
    pub cleaned: usize,
    /// Keys left in place for the next cycle.
    pub failed: usize,
    pub view_delta: i64,
    pub like_delta: i64,
    /// Set when a scan failed and the cycle stopped early.
    pub aborted: bool,
}

impl FlushReport {
    pub fn delta(&self, kind: CounterKind) -> i64 {
        match kind {
            CounterKind::View => self.view_delta,
            CounterKind::Like => self.like_delta,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.scanned == 0
    }

    fn add_delta(&mut self, kind: CounterKind, delta: i64) {
        match kind {
            CounterKind::View => self.view_delta += delta,
            CounterKind::Like => self.like_delta += delta,
        }
    }
}

enum KeyOutcome {
    Applied(i64),
    Cleaned,
    Failed,
    Vanished,
}

pub struct Reconciler {
    accelerator: Option<Arc<dyn Accelerator>>,
    repo: Arc<dyn ArticlesRepo>,
    keys: Keyspace,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        accelerator: Option<Arc<dyn Accelerator>>,
        repo: Arc<dyn ArticlesRepo>,
        keys: Keyspace,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            accelerator,
            repo,
            keys,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Drain every buffered counter into the store.
    ///
    /// Only the delta that was applied is subtracted from a key, so increments
    /// that land mid-flush survive until the next cycle.
    pub async fn flush_all(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let Some(accelerator) = self.accelerator.as_ref() else {
            return report;
        };

        let started_at = Instant::now();
        for kind in CounterKind::ALL {
            if let Err(err) = self.flush_kind(accelerator.as_ref(), kind, &mut report).await {
                report.aborted = true;
                debug!(%kind, error = %err, "Counter scan failed; skipping this cycle");
                break;
            }
        }
        histogram!(METRIC_RECONCILE_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }

    async fn flush_kind(
        &self,
        accelerator: &dyn Accelerator,
        kind: CounterKind,
        report: &mut FlushReport,
    ) -> Result<(), AcceleratorError> {
        let prefix = self.keys.counter_prefix(kind);
        let mut cursor = 0_u64;

        loop {
            let page = with_deadline(
                "scan_prefix",
                self.config.operation_timeout,
                accelerator.scan_prefix(cursor, &prefix, self.config.batch_size),
            )
            .await?;

            for key in page.keys {
                report.scanned += 1;
                match self.reconcile_key(accelerator, kind, &key).await {
                    KeyOutcome::Applied(delta) => {
                        report.applied += 1;
                        report.add_delta(kind, delta);
                    }
                    KeyOutcome::Cleaned => report.cleaned += 1,
                    KeyOutcome::Failed => report.failed += 1,
                    KeyOutcome::Vanished => {}
                }
            }

            if page.next_cursor == 0 {
                return Ok(());
            }
            cursor = page.next_cursor;
        }
    }

    async fn reconcile_key(
        &self,
        accelerator: &dyn Accelerator,
        kind: CounterKind,
        key: &str,
    ) -> KeyOutcome {
        let Some(article_id) = self.keys.parse_counter_key(kind, key) else {
            warn!(key, %kind, "Removing malformed counter key");
            return self.discard(accelerator, key).await;
        };

        let raw = match self.call("get", accelerator.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return KeyOutcome::Vanished,
            Err(err) => {
                warn!(key, error = %err, "Failed to read counter delta");
                return KeyOutcome::Failed;
            }
        };

        let delta = match decode_counter(key, &raw) {
            Ok(delta) => delta,
            Err(err) => {
                warn!(key, error = %err, "Removing unreadable counter delta");
                return self.discard(accelerator, key).await;
            }
        };

        if delta == 0 {
            return self.discard(accelerator, key).await;
        }

        match self.repo.increment_counter(article_id, kind, delta).await {
            Ok(()) => {}
            Err(RepoError::NotFound) => {
                warn!(%article_id, %kind, delta, "Dropping counter delta for missing article");
                return self.discard(accelerator, key).await;
            }
            Err(err) => {
                counter!(METRIC_RECONCILE_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
                warn!(%article_id, %kind, delta, error = %err, "Store rejected counter delta; will retry");
                return KeyOutcome::Failed;
            }
        }
        counter!(METRIC_RECONCILE_APPLIED_TOTAL, "kind" => kind.as_str()).increment(delta.unsigned_abs());

        match self.call("incr_by", accelerator.incr_by(key, -delta)).await {
            Ok(0) => {
                self.discard(accelerator, key).await;
            }
            Ok(remaining) => {
                debug!(key, remaining, "Counter received increments during flush");
            }
            Err(err) => {
                // the store already has this delta; the next cycle would apply it again
                error!(
                    %article_id,
                    %kind,
                    delta,
                    key,
                    error = %err,
                    "Applied counter delta could not be subtracted from buffer"
                );
            }
        }

        KeyOutcome::Applied(delta)
    }

    async fn discard(&self, accelerator: &dyn Accelerator, key: &str) -> KeyOutcome {
        match self
            .call("delete", accelerator.delete(&[key.to_string()]))
            .await
        {
            Ok(()) => KeyOutcome::Cleaned,
            Err(err) => {
                warn!(key, error = %err, "Failed to remove counter key");
                KeyOutcome::Failed
            }
        }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, AcceleratorError>
    where
        F: std::future::Future<Output = Result<T, AcceleratorError>>,
    {
        with_deadline(op, self.config.operation_timeout, fut).await
    }

    /// Run [`Self::flush_all`] every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                let report = self.flush_all().await;
                log_report(&report);
            }
        })
    }
}

pub fn log_report(report: &FlushReport) {
    if report.aborted {
        debug!(
            scanned = report.scanned,
            applied = report.applied,
            "Counter reconciliation stopped early; accelerator unavailable"
        );
    } else if report.is_idle() {
        debug!("Counter reconciliation found nothing to flush");
    } else {
        info!(
            scanned = report.scanned,
            applied = report.applied,
            cleaned = report.cleaned,
            failed = report.failed,
            views = report.view_delta,
            likes = report.like_delta,
            "Counter reconciliation finished"
        );
    }
}
