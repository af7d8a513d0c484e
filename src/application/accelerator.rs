//! Key-value accelerator port.
//!
//! The accelerator backs both the read cache and the counter buffer. It is
//! optional everywhere: callers hold an `Option<Arc<dyn Accelerator>>` and
//! treat `None` as a permanent miss.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcceleratorError {
    #[error("accelerator unavailable: {0}")]
    Unavailable(String),
    #[error("accelerator operation `{op}` timed out after {elapsed_ms} ms")]
    Timeout { op: &'static str, elapsed_ms: u128 },
    #[error("accelerator value for `{key}` is not usable: {reason}")]
    Decode { key: String, reason: String },
}

impl AcceleratorError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn decode(key: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// One page of a prefix scan. A `next_cursor` of zero means the scan is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub next_cursor: u64,
}

#[async_trait]
pub trait Accelerator: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AcceleratorError>;

    /// Store `value`; a `ttl` of `None` keeps the key until deleted.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), AcceleratorError>;

    async fn delete(&self, keys: &[String]) -> Result<(), AcceleratorError>;

    /// Atomically add `delta` (possibly negative) and return the new value.
    /// Missing keys start at zero.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, AcceleratorError>;

    /// Start with cursor `0`; keep calling with `next_cursor` until it is `0`.
    async fn scan_prefix(
        &self,
        cursor: u64,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, AcceleratorError>;

    async fn ping(&self) -> Result<(), AcceleratorError>;

    fn backend_name(&self) -> &'static str;
}

/// Run an accelerator call under a deadline, mapping expiry to `Timeout`.
pub async fn with_deadline<T, F>(
    op: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T, AcceleratorError>
where
    F: Future<Output = Result<T, AcceleratorError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AcceleratorError::Timeout {
            op,
            elapsed_ms: deadline.as_millis(),
        }),
    }
}

/// Parse an integer counter stored as decimal text (the Redis `INCR` format).
pub fn decode_counter(key: &str, raw: &[u8]) -> Result<i64, AcceleratorError> {
    let text = std::str::from_utf8(raw).map_err(|err| AcceleratorError::decode(key, err.to_string()))?;
    text.trim()
        .parse::<i64>()
        .map_err(|err| AcceleratorError::decode(key, err.to_string()))
}
