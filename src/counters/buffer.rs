//! Write-behind buffering for view and like counters.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::accelerator::{Accelerator, with_deadline};
use crate::application::repos::{ArticlesRepo, RepoError};
use crate::cache::Keyspace;
use crate::domain::types::CounterKind;

pub(crate) const METRIC_COUNTER_BUFFERED_TOTAL: &str = "folio_counter_buffered_total";
pub(crate) const METRIC_COUNTER_FALLBACK_TOTAL: &str = "folio_counter_fallback_total";
pub(crate) const METRIC_COUNTER_DROPPED_TOTAL: &str = "folio_counter_dropped_total";

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("could not record {kind} for article `{article_id}`: {source}")]
    Unavailable {
        article_id: Uuid,
        kind: CounterKind,
        #[source]
        source: RepoError,
    },
}

/// Where an increment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedVia {
    /// Accumulated in the accelerator; applied to the store on the next flush.
    Buffer,
    /// Written straight to the store because the accelerator was absent or failing.
    Store,
}

/// Absorbs counter increments in the accelerator so hot articles do not turn
/// into a row-update storm. Falls back to a direct store increment.
#[derive(Clone)]
pub struct CounterBuffer {
    accelerator: Option<Arc<dyn Accelerator>>,
    repo: Arc<dyn ArticlesRepo>,
    keys: Keyspace,
    operation_timeout: Duration,
}

impl CounterBuffer {
    pub fn new(
        accelerator: Option<Arc<dyn Accelerator>>,
        repo: Arc<dyn ArticlesRepo>,
        keys: Keyspace,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            accelerator,
            repo,
            keys,
            operation_timeout,
        }
    }

    /// Record one view. Failures are logged and swallowed.
    pub async fn record_view(&self, id: Uuid) {
        if let Err(err) = self.record(CounterKind::View, id).await {
            counter!(METRIC_COUNTER_DROPPED_TOTAL, "kind" => CounterKind::View.as_str())
                .increment(1);
            warn!(article_id = %id, error = %err, "Dropped view increment");
        }
    }

    /// Record one like, surfacing the failure when neither path works.
    pub async fn record_like(&self, id: Uuid) -> Result<RecordedVia, CounterError> {
        self.record(CounterKind::Like, id).await.inspect_err(|_| {
            counter!(METRIC_COUNTER_DROPPED_TOTAL, "kind" => CounterKind::Like.as_str())
                .increment(1);
        })
    }

    pub async fn record(&self, kind: CounterKind, id: Uuid) -> Result<RecordedVia, CounterError> {
        if let Some(accelerator) = self.accelerator.as_ref() {
            let key = self.keys.counter_key(kind, id);
            match with_deadline(
                "incr_by",
                self.operation_timeout,
                accelerator.incr_by(&key, 1),
            )
            .await
            {
                Ok(pending) => {
                    counter!(METRIC_COUNTER_BUFFERED_TOTAL, "kind" => kind.as_str()).increment(1);
                    debug!(article_id = %id, %kind, pending, "Buffered counter increment");
                    return Ok(RecordedVia::Buffer);
                }
                Err(err) => {
                    warn!(
                        article_id = %id,
                        %kind,
                        key = %key,
                        error = %err,
                        "Counter buffer unavailable; writing through to store"
                    );
                }
            }
        }

        counter!(METRIC_COUNTER_FALLBACK_TOTAL, "kind" => kind.as_str()).increment(1);
        self.repo
            .increment_counter(id, kind, 1)
            .await
            .map(|()| RecordedVia::Store)
            .map_err(|source| CounterError::Unavailable {
                article_id: id,
                kind,
                source,
            })
    }
}
