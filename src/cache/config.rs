//! Cache configuration.

use std::time::Duration;

const DEFAULT_DETAIL_TTL_SECS: u64 = 30;
const DEFAULT_LIST_TTL_SECS: u64 = 120;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_SCAN_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of detail snapshots and slug pointers.
    pub detail_ttl: Duration,
    /// Lifetime of list pages. Longer than detail since every write drops them anyway.
    pub list_ttl: Duration,
    /// Deadline for a single accelerator call.
    pub operation_timeout: Duration,
    /// Keys requested per SCAN page during list invalidation.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            detail_ttl: Duration::from_secs(DEFAULT_DETAIL_TTL_SECS),
            list_ttl: Duration::from_secs(DEFAULT_LIST_TTL_SECS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            detail_ttl: settings.detail_ttl,
            list_ttl: settings.list_ttl,
            operation_timeout: settings.operation_timeout,
            scan_batch: settings.scan_batch.get() as usize,
        }
    }
}
