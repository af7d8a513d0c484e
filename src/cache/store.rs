//! Read-through cache for article detail snapshots and list pages.
//!
//! Entries live in the accelerator as JSON envelopes tagged with the
//! generation they were filled under. Every write to an article bumps its
//! generation key (and every write at all bumps the list generation), and a
//! reader only accepts an envelope whose generation still matches. That
//! closes the window where a slow read-miss fill lands after an
//! invalidation and re-caches a pre-write snapshot.
//!
//! Nothing here returns an error. Accelerator failures, timeouts and
//! undecodable entries all degrade to a miss or a skipped write.

use std::sync::Arc;

use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::accelerator::{
    Accelerator, AcceleratorError, decode_counter, with_deadline,
};
use crate::domain::entities::{ArticlePage, ArticleRecord};

use super::config::CacheConfig;
use super::keys::Keyspace;

pub(crate) const METRIC_CACHE_HIT_TOTAL: &str = "folio_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS_TOTAL: &str = "folio_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR_TOTAL: &str = "folio_cache_error_total";

const ENTRY_DETAIL: &str = "detail";
const ENTRY_SLUG: &str = "slug";
const ENTRY_LIST: &str = "list";

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    generation: i64,
    value: T,
}

/// Generation observed before a read-miss goes to the store.
///
/// Hand it back to [`ArticleCache::complete_fill`] (or
/// [`ArticleCache::complete_list_fill`]) with the value that was read; the
/// write-back is dropped if a writer bumped the generation in between.
#[derive(Debug, Clone)]
#[must_use]
pub struct FillTicket {
    generation_key: String,
    generation: Option<i64>,
}

impl FillTicket {
    /// False when the generation could not be read; completing such a ticket is a no-op.
    pub fn is_armed(&self) -> bool {
        self.generation.is_some()
    }
}

#[derive(Clone)]
pub struct ArticleCache {
    accelerator: Option<Arc<dyn Accelerator>>,
    keys: Keyspace,
    config: CacheConfig,
}

impl ArticleCache {
    pub fn new(
        accelerator: Option<Arc<dyn Accelerator>>,
        keys: Keyspace,
        config: CacheConfig,
    ) -> Self {
        Self {
            accelerator,
            keys,
            config,
        }
    }

    /// A cache that never hits and never stores anything.
    pub fn disabled() -> Self {
        Self::new(None, Keyspace::default(), CacheConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.accelerator.is_some()
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    // ========================================================================
    // Detail entries
    // ========================================================================

    pub async fn get_detail(&self, id: Uuid) -> Option<ArticleRecord> {
        let key = self.keys.detail_key(id);
        let generation_key = self.keys.generation_key(id);
        let article = self
            .read_envelope::<ArticleRecord>(ENTRY_DETAIL, &key, &generation_key)
            .await;
        record_lookup(ENTRY_DETAIL, article.is_some());
        article
    }

    /// Store a snapshot under the article's current generation.
    pub async fn put_detail(&self, article: &ArticleRecord) {
        let ticket = self.begin_fill(article.id).await;
        self.complete_fill(ticket, article).await;
    }

    pub async fn begin_fill(&self, id: Uuid) -> FillTicket {
        let generation_key = self.keys.generation_key(id);
        let generation = self.read_generation(&generation_key).await;
        FillTicket {
            generation_key,
            generation,
        }
    }

    pub async fn complete_fill(&self, ticket: FillTicket, article: &ArticleRecord) {
        let Some(generation) = self.confirm_generation(&ticket).await else {
            debug!(article_id = %article.id, "Skipping detail fill; generation moved");
            return;
        };

        let key = self.keys.detail_key(article.id);
        let envelope = Envelope {
            generation,
            value: article,
        };
        if !self
            .write_json(ENTRY_DETAIL, &key, &envelope, self.config.detail_ttl)
            .await
        {
            return;
        }

        self.remember_slug(&article.slug, article.id).await;
    }

    /// Bump the article's generation and drop its snapshot.
    pub async fn invalidate_detail(&self, id: Uuid) {
        let Some(accelerator) = self.accelerator.as_ref() else {
            return;
        };

        let generation_key = self.keys.generation_key(id);
        if let Err(err) = self
            .deadline("incr_by", accelerator.incr_by(&generation_key, 1))
            .await
        {
            record_error("invalidate_detail");
            warn!(article_id = %id, error = %err, "Failed to bump article cache generation");
        }

        self.delete_keys("invalidate_detail", vec![self.keys.detail_key(id)])
            .await;
    }

    // ========================================================================
    // Slug pointers
    // ========================================================================

    pub async fn get_slug(&self, slug: &str) -> Option<Uuid> {
        let key = self.keys.slug_key(slug);
        let raw = self.read_raw(ENTRY_SLUG, &key).await;
        let id = raw.and_then(|bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| Uuid::parse_str(text.trim()).ok())
        });
        record_lookup(ENTRY_SLUG, id.is_some());
        id
    }

    /// Point `slug` at `id`. Slugs never change for a live article, so the
    /// pointer needs no generation guard.
    pub async fn remember_slug(&self, slug: &str, id: Uuid) {
        let key = self.keys.slug_key(slug);
        self.write_raw(
            ENTRY_SLUG,
            &key,
            id.to_string().into_bytes(),
            self.config.detail_ttl,
        )
        .await;
    }

    pub async fn forget_slug(&self, slug: &str) {
        self.delete_keys("forget_slug", vec![self.keys.slug_key(slug)])
            .await;
    }

    // ========================================================================
    // List pages
    // ========================================================================

    pub async fn get_list(&self, signature: &str) -> Option<ArticlePage> {
        let key = self.keys.list_key(signature);
        let generation_key = self.list_generation_key();
        let page = self
            .read_envelope::<ArticlePage>(ENTRY_LIST, &key, &generation_key)
            .await;
        record_lookup(ENTRY_LIST, page.is_some());
        page
    }

    pub async fn put_list(&self, signature: &str, page: &ArticlePage) {
        let ticket = self.begin_list_fill().await;
        self.complete_list_fill(ticket, signature, page).await;
    }

    pub async fn begin_list_fill(&self) -> FillTicket {
        let generation_key = self.list_generation_key();
        let generation = self.read_generation(&generation_key).await;
        FillTicket {
            generation_key,
            generation,
        }
    }

    pub async fn complete_list_fill(
        &self,
        ticket: FillTicket,
        signature: &str,
        page: &ArticlePage,
    ) {
        let Some(generation) = self.confirm_generation(&ticket).await else {
            debug!(signature, "Skipping list fill; generation moved");
            return;
        };

        let key = self.keys.list_key(signature);
        let envelope = Envelope {
            generation,
            value: page,
        };
        self.write_json(ENTRY_LIST, &key, &envelope, self.config.list_ttl)
            .await;
    }

    /// Drop every cached list page.
    ///
    /// The list generation is bumped first so concurrent fills are discarded,
    /// then the `article:list:` keyspace is scanned page by page and deleted.
    /// Returns the number of keys removed.
    pub async fn invalidate_all_lists(&self) -> usize {
        let Some(accelerator) = self.accelerator.as_ref() else {
            return 0;
        };

        let generation_key = self.list_generation_key();
        if let Err(err) = self
            .deadline("incr_by", accelerator.incr_by(&generation_key, 1))
            .await
        {
            record_error("invalidate_lists");
            warn!(error = %err, "Failed to bump list cache generation");
        }

        let prefix = self.keys.list_prefix();
        let mut cursor = 0_u64;
        let mut removed = 0_usize;
        loop {
            let page = match self
                .deadline(
                    "scan_prefix",
                    accelerator.scan_prefix(cursor, &prefix, self.config.scan_batch),
                )
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    record_error("invalidate_lists");
                    warn!(error = %err, removed, "List invalidation scan aborted");
                    return removed;
                }
            };

            if !page.keys.is_empty() {
                let count = page.keys.len();
                if self.delete_keys("invalidate_lists", page.keys).await {
                    removed += count;
                }
            }

            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }

        debug!(removed, "Invalidated cached list pages");
        removed
    }

    // ========================================================================
    // Accelerator plumbing
    // ========================================================================

    fn list_generation_key(&self) -> String {
        self.keys.list_generation_key()
    }

    async fn deadline<T, F>(&self, op: &'static str, fut: F) -> Result<T, AcceleratorError>
    where
        F: std::future::Future<Output = Result<T, AcceleratorError>>,
    {
        with_deadline(op, self.config.operation_timeout, fut).await
    }

    async fn read_generation(&self, key: &str) -> Option<i64> {
        let accelerator = self.accelerator.as_ref()?;
        match self.deadline("get", accelerator.get(key)).await {
            Ok(None) => Some(0),
            Ok(Some(raw)) => match decode_counter(key, &raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    record_error("read_generation");
                    warn!(key, error = %err, "Unreadable cache generation");
                    None
                }
            },
            Err(err) => {
                record_error("read_generation");
                debug!(key, error = %err, "Failed to read cache generation");
                None
            }
        }
    }

    async fn confirm_generation(&self, ticket: &FillTicket) -> Option<i64> {
        let expected = ticket.generation?;
        let current = self.read_generation(&ticket.generation_key).await?;
        (current == expected).then_some(expected)
    }

    async fn read_raw(&self, entry: &'static str, key: &str) -> Option<Vec<u8>> {
        let accelerator = self.accelerator.as_ref()?;
        match self.deadline("get", accelerator.get(key)).await {
            Ok(value) => value,
            Err(err) => {
                record_error(entry);
                debug!(key, error = %err, "Cache read failed; treating as miss");
                None
            }
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        entry: &'static str,
        key: &str,
        generation_key: &str,
    ) -> Option<T> {
        let raw = self.read_raw(entry, key).await?;
        let envelope = match serde_json::from_slice::<Envelope<T>>(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                record_error(entry);
                warn!(key, error = %err, "Dropping undecodable cache entry");
                self.delete_keys(entry, vec![key.to_string()]).await;
                return None;
            }
        };

        let current = self.read_generation(generation_key).await?;
        if current != envelope.generation {
            debug!(
                key,
                cached = envelope.generation,
                current,
                "Discarding cache entry from an older generation"
            );
            self.delete_keys(entry, vec![key.to_string()]).await;
            return None;
        }

        Some(envelope.value)
    }

    async fn write_json<T: Serialize>(
        &self,
        entry: &'static str,
        key: &str,
        value: &T,
        ttl: std::time::Duration,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.write_raw(entry, key, bytes, ttl).await,
            Err(err) => {
                record_error(entry);
                warn!(key, error = %err, "Failed to encode cache entry");
                false
            }
        }
    }

    async fn write_raw(
        &self,
        entry: &'static str,
        key: &str,
        bytes: Vec<u8>,
        ttl: std::time::Duration,
    ) -> bool {
        let Some(accelerator) = self.accelerator.as_ref() else {
            return false;
        };
        match self
            .deadline("set", accelerator.set(key, bytes, Some(ttl)))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                record_error(entry);
                debug!(key, error = %err, "Cache write failed");
                false
            }
        }
    }

    async fn delete_keys(&self, op: &'static str, keys: Vec<String>) -> bool {
        let Some(accelerator) = self.accelerator.as_ref() else {
            return false;
        };
        match self.deadline("delete", accelerator.delete(&keys)).await {
            Ok(()) => true,
            Err(err) => {
                record_error(op);
                warn!(op, keys = keys.len(), error = %err, "Cache delete failed");
                false
            }
        }
    }
}

fn record_lookup(entry: &'static str, hit: bool) {
    let name = if hit {
        METRIC_CACHE_HIT_TOTAL
    } else {
        METRIC_CACHE_MISS_TOTAL
    };
    counter!(name, "entry" => entry).increment(1);
}

fn record_error(op: &'static str) {
    counter!(METRIC_CACHE_ERROR_TOTAL, "op" => op).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::accelerator::MemoryAccelerator;

    fn cache() -> (Arc<MemoryAccelerator>, ArticleCache) {
        let accelerator = Arc::new(MemoryAccelerator::new());
        let cache = ArticleCache::new(
            Some(accelerator.clone()),
            Keyspace::new(Some("unit")),
            CacheConfig::default(),
        );
        (accelerator, cache)
    }

    #[tokio::test]
    async fn undecodable_entries_are_evicted() {
        let (accelerator, cache) = cache();
        let id = Uuid::new_v4();
        let key = cache.keys().detail_key(id);
        accelerator
            .set(&key, b"{not json".to_vec(), None)
            .await
            .expect("set");

        assert!(cache.get_detail(id).await.is_none());
        assert!(accelerator.get(&key).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn list_fill_is_skipped_after_invalidation() {
        let (_, cache) = cache();
        let page = ArticlePage::empty(1, 20);

        let ticket = cache.begin_list_fill().await;
        cache.invalidate_all_lists().await;
        cache.complete_list_fill(ticket, "sig", &page).await;
        assert!(cache.get_list("sig").await.is_none());

        cache.put_list("sig", &page).await;
        assert_eq!(cache.get_list("sig").await, Some(page));
    }

    #[tokio::test]
    async fn list_invalidation_only_touches_list_pages() {
        let (accelerator, cache) = cache();
        for i in 0..5 {
            cache
                .put_list(&format!("sig-{i}"), &ArticlePage::empty(1, 20))
                .await;
        }
        let counter_key = cache
            .keys()
            .counter_key(crate::domain::types::CounterKind::View, Uuid::nil());
        accelerator.incr_by(&counter_key, 3).await.expect("incr");

        let config = CacheConfig {
            scan_batch: 2,
            ..CacheConfig::default()
        };
        let paged = ArticleCache::new(Some(accelerator.clone()), cache.keys().clone(), config);

        assert_eq!(paged.invalidate_all_lists().await, 5);
        assert_eq!(
            accelerator.get(&counter_key).await.expect("get"),
            Some(b"3".to_vec())
        );
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = ArticleCache::disabled();
        let ticket = cache.begin_fill(Uuid::nil()).await;

        assert!(!cache.is_enabled());
        assert!(!ticket.is_armed());
        assert_eq!(cache.invalidate_all_lists().await, 0);
        assert!(cache.get_list("sig").await.is_none());
    }
}
