//! View and like counters.
//!
//! Increments land in the accelerator under `{kind}:{article-id}` keys
//! ([`CounterBuffer`]) and are periodically folded into the store's counter
//! columns ([`Reconciler`]). Without an accelerator every increment goes
//! straight to the store.

mod buffer;
mod reconciler;

pub use buffer::{CounterBuffer, CounterError, RecordedVia};
pub(crate) use buffer::{
    METRIC_COUNTER_BUFFERED_TOTAL, METRIC_COUNTER_DROPPED_TOTAL, METRIC_COUNTER_FALLBACK_TOTAL,
};
pub use reconciler::{FlushReport, Reconciler, ReconcilerConfig, log_report};
pub(crate) use reconciler::{
    METRIC_RECONCILE_APPLIED_TOTAL, METRIC_RECONCILE_FAILED_TOTAL, METRIC_RECONCILE_FLUSH_MS,
};
