//! Folio Cache Layer
//!
//! Read-through caching of article detail snapshots and list pages in the
//! accelerator (memory or Redis), keyed by [`Keyspace`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! detail_ttl_seconds = 30
//! list_ttl_seconds = 120
//! operation_timeout_ms = 250
//! scan_batch = 100
//! ```

mod config;
pub mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::Keyspace;
pub use store::{ArticleCache, FillTicket};
pub(crate) use store::{METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL};
