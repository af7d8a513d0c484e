//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use folio::application::accelerator::{Accelerator, AcceleratorError, ScanPage};
use folio::application::articles::{ArticleService, CreateArticleCommand};
use folio::application::repos::{
    ArticleQuery, ArticlesRepo, CreateArticleParams, RepoError, SearchRequest,
    UpdateArticleParams,
};
use folio::application::tasks::BackgroundTasks;
use folio::cache::{ArticleCache, CacheConfig, Keyspace};
use folio::counters::CounterBuffer;
use folio::domain::entities::{ArticlePage, ArticleRecord};
use folio::domain::types::{ArticleSortField, ArticleStatus, CounterKind, SortDirection};
use folio::infra::accelerator::MemoryAccelerator;
use folio::search::{SearchConfig, SearchEngine, SearchEngineError, SearchFacade, SearchHits};
use time::OffsetDateTime;
use tokio::sync::Notify;
use uuid::Uuid;

// ============================================================================
// Store
// ============================================================================

/// Pauses the next `find_by_id` after it has read its row.
pub struct ReadGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct MemoryRepo {
    rows: Mutex<HashMap<Uuid, ArticleRecord>>,
    fail_increments: AtomicBool,
    fail_searches: AtomicBool,
    increment_calls: AtomicUsize,
    find_by_id_calls: AtomicUsize,
    find_by_slug_calls: AtomicUsize,
    search_calls: AtomicUsize,
    read_gate: Mutex<Option<ReadGate>>,
}

impl MemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<Uuid, ArticleRecord>> {
        self.rows.lock().expect("repo rows")
    }

    /// Insert a published article with the given title and return it.
    pub fn seed(&self, title: &str, body: &str) -> ArticleRecord {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let article = ArticleRecord {
            id,
            slug: format!("{}-{}", slug::slugify(title), &id.simple().to_string()[..8]),
            title: title.to_string(),
            body: body.to_string(),
            excerpt: String::new(),
            cover: None,
            status: ArticleStatus::Published,
            author_id: Uuid::nil(),
            category_id: None,
            tags: Vec::new(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.rows().insert(id, article.clone());
        article
    }

    /// Current row, including soft-deleted ones.
    pub fn row(&self, id: Uuid) -> Option<ArticleRecord> {
        self.rows().get(&id).cloned()
    }

    pub fn counter(&self, id: Uuid, kind: CounterKind) -> i64 {
        self.row(id).map(|row| row.counter(kind)).unwrap_or_default()
    }

    pub fn remove_row(&self, id: Uuid) {
        self.rows().remove(&id);
    }

    pub fn set_fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn increment_calls(&self) -> usize {
        self.increment_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_id_calls(&self) -> usize {
        self.find_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_slug_calls(&self) -> usize {
        self.find_by_slug_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn gate_next_read(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.read_gate.lock().expect("read gate") = Some(ReadGate {
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    /// Park a single-row read after it has fetched its row.
    async fn pass_read_gate(&self) {
        let gate = self.read_gate.lock().expect("read gate").take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn visible(&self) -> Vec<ArticleRecord> {
        self.rows()
            .values()
            .filter(|row| !row.is_deleted())
            .cloned()
            .collect()
    }
}

fn sort_key_cmp(
    field: ArticleSortField,
    a: &ArticleRecord,
    b: &ArticleRecord,
) -> std::cmp::Ordering {
    match field {
        ArticleSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        ArticleSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        ArticleSortField::PublishedAt => a.published_at.cmp(&b.published_at),
        ArticleSortField::ViewCount => a.view_count.cmp(&b.view_count),
        ArticleSortField::LikeCount => a.like_count.cmp(&b.like_count),
        ArticleSortField::Title => a.title.cmp(&b.title),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn rank(article: &ArticleRecord, term: &str) -> u32 {
    let term = term.to_lowercase();
    let mut score = 0;
    if article.title.to_lowercase().contains(&term) {
        score += 3;
    }
    if article.excerpt.to_lowercase().contains(&term) {
        score += 2;
    }
    if article.body.to_lowercase().contains(&term) {
        score += 1;
    }
    score
}

fn paginate(mut rows: Vec<ArticleRecord>, page: u32, page_size: u32) -> ArticlePage {
    let total = rows.len() as u64;
    let offset = (u64::from(page - 1) * u64::from(page_size)) as usize;
    let items = if offset >= rows.len() {
        Vec::new()
    } else {
        rows.drain(offset..).take(page_size as usize).collect()
    };
    ArticlePage {
        items,
        total,
        page,
        page_size,
    }
}

#[async_trait]
impl ArticlesRepo for MemoryRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        let row = self.rows().get(&id).filter(|row| !row.is_deleted()).cloned();
        self.pass_read_gate().await;
        Ok(row)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError> {
        self.find_by_slug_calls.fetch_add(1, Ordering::SeqCst);
        let row = self
            .rows()
            .values()
            .find(|row| row.slug == slug && !row.is_deleted())
            .cloned();
        self.pass_read_gate().await;
        Ok(row)
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<ArticleRecord>, RepoError> {
        let rows = self.rows();
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|row| !row.is_deleted())
            .cloned()
            .collect())
    }

    async fn create(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError> {
        let mut rows = self.rows();
        if rows.values().any(|row| row.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "articles_slug_key".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let article = ArticleRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            body: params.body,
            excerpt: params.excerpt,
            cover: params.cover,
            status: params.status,
            author_id: params.author_id,
            category_id: params.category_id,
            tags: params.tags,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            published_at: params.published_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        rows.insert(article.id, article.clone());
        Ok(article)
    }

    async fn update(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError> {
        let mut rows = self.rows();
        let row = rows
            .get_mut(&params.id)
            .filter(|row| !row.is_deleted())
            .ok_or(RepoError::NotFound)?;
        row.title = params.title;
        row.body = params.body;
        row.excerpt = params.excerpt;
        row.cover = params.cover;
        row.status = params.status;
        row.category_id = params.category_id;
        row.tags = params.tags;
        row.published_at = params.published_at;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<ArticleRecord, RepoError> {
        let mut rows = self.rows();
        let row = rows
            .get_mut(&id)
            .filter(|row| !row.is_deleted())
            .ok_or(RepoError::NotFound)?;
        row.deleted_at = Some(OffsetDateTime::now_utc());
        Ok(row.clone())
    }

    async fn increment_counter(
        &self,
        id: Uuid,
        kind: CounterKind,
        delta: i64,
    ) -> Result<(), RepoError> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }

        let mut rows = self.rows();
        let row = rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        match kind {
            CounterKind::View => row.view_count += delta,
            CounterKind::Like => row.like_count += delta,
        }
        Ok(())
    }

    async fn list(&self, query: &ArticleQuery) -> Result<ArticlePage, RepoError> {
        let query = query.normalized();
        let mut rows: Vec<ArticleRecord> = self
            .visible()
            .into_iter()
            .filter(|row| query.status.is_none_or(|status| row.status == status))
            .filter(|row| query.category_id.is_none_or(|id| row.category_id == Some(id)))
            .filter(|row| query.author_id.is_none_or(|id| row.author_id == id))
            .filter(|row| {
                query
                    .tag
                    .as_ref()
                    .is_none_or(|tag| row.tags.iter().any(|candidate| candidate == tag))
            })
            .filter(|row| {
                query
                    .search
                    .as_ref()
                    .is_none_or(|term| rank(row, term) > 0)
            })
            .collect();

        rows.sort_by(|a, b| sort_key_cmp(query.sort, a, b));
        if query.direction == SortDirection::Desc {
            rows.reverse();
        }
        Ok(paginate(rows, query.page, query.page_size))
    }

    async fn search_ranked(&self, request: &SearchRequest) -> Result<ArticlePage, RepoError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("search unavailable".to_string()));
        }

        let request = request.normalized();
        let mut ranked: Vec<(u32, ArticleRecord)> = self
            .visible()
            .into_iter()
            .filter(|row| request.status.is_none_or(|status| row.status == status))
            .map(|row| (rank(&row, &request.term), row))
            .filter(|(score, _)| *score > 0)
            .collect();
        ranked.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| b.created_at.cmp(&a.created_at)));

        let rows = ranked.into_iter().map(|(_, row)| row).collect();
        Ok(paginate(rows, request.page, request.page_size))
    }
}

// ============================================================================
// Accelerator
// ============================================================================

/// Memory accelerator that can be switched off to simulate an outage.
#[derive(Default)]
pub struct FlakyAccelerator {
    inner: MemoryAccelerator,
    down: AtomicBool,
}

impl FlakyAccelerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AcceleratorError> {
        if self.down.load(Ordering::SeqCst) {
            Err(AcceleratorError::unavailable("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Accelerator for FlakyAccelerator {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AcceleratorError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), AcceleratorError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), AcceleratorError> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, AcceleratorError> {
        self.check()?;
        self.inner.incr_by(key, delta).await
    }

    async fn scan_prefix(
        &self,
        cursor: u64,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, AcceleratorError> {
        self.check()?;
        self.inner.scan_prefix(cursor, prefix, count).await
    }

    async fn ping(&self) -> Result<(), AcceleratorError> {
        self.check()
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

// ============================================================================
// Search engines
// ============================================================================

/// Engine that keeps indexed documents in memory and matches by substring.
#[derive(Default)]
pub struct MemoryEngine {
    docs: Mutex<Vec<ArticleRecord>>,
    /// When set, search returns these ids verbatim instead of matching.
    pinned: Mutex<Option<SearchHits>>,
    searches: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pin_hits(&self, ids: Vec<Uuid>, total: u64) {
        *self.pinned.lock().expect("pinned hits") = Some(SearchHits { ids, total });
    }

    pub fn indexed_ids(&self) -> Vec<Uuid> {
        self.docs
            .lock()
            .expect("docs")
            .iter()
            .map(|doc| doc.id)
            .collect()
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn health(&self) -> Result<(), SearchEngineError> {
        Ok(())
    }

    async fn index(&self, article: &ArticleRecord) -> Result<(), SearchEngineError> {
        let mut docs = self.docs.lock().expect("docs");
        docs.retain(|doc| doc.id != article.id);
        docs.push(article.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), SearchEngineError> {
        self.docs.lock().expect("docs").retain(|doc| doc.id != id);
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchHits, SearchEngineError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(hits) = self.pinned.lock().expect("pinned hits").clone() {
            return Ok(hits);
        }

        let docs = self.docs.lock().expect("docs");
        let matched: Vec<Uuid> = docs
            .iter()
            .filter(|doc| rank(doc, &request.term) > 0)
            .map(|doc| doc.id)
            .collect();
        let total = matched.len() as u64;
        let ids = matched
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size as usize)
            .collect();
        Ok(SearchHits { ids, total })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Engine that passes the startup probe and then fails every call.
pub struct FailingEngine;

#[async_trait]
impl SearchEngine for FailingEngine {
    async fn health(&self) -> Result<(), SearchEngineError> {
        Ok(())
    }

    async fn index(&self, _article: &ArticleRecord) -> Result<(), SearchEngineError> {
        Err(SearchEngineError::transport("connection reset"))
    }

    async fn remove(&self, _id: Uuid) -> Result<(), SearchEngineError> {
        Err(SearchEngineError::transport("connection reset"))
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchHits, SearchEngineError> {
        Err(SearchEngineError::Status {
            status: 503,
            body: "cluster unavailable".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Engine whose health probe never answers.
pub struct UnreachableEngine;

#[async_trait]
impl SearchEngine for UnreachableEngine {
    async fn health(&self) -> Result<(), SearchEngineError> {
        Err(SearchEngineError::transport("no route to host"))
    }

    async fn index(&self, _article: &ArticleRecord) -> Result<(), SearchEngineError> {
        Ok(())
    }

    async fn remove(&self, _id: Uuid) -> Result<(), SearchEngineError> {
        Ok(())
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchHits, SearchEngineError> {
        Ok(SearchHits::default())
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub repo: Arc<MemoryRepo>,
    pub accelerator: Option<Arc<dyn Accelerator>>,
    pub keys: Keyspace,
    pub tasks: BackgroundTasks,
    pub cache: ArticleCache,
    pub service: ArticleService,
}

impl Harness {
    pub async fn new(
        accelerator: Option<Arc<dyn Accelerator>>,
        engine: Option<Arc<dyn SearchEngine>>,
    ) -> Self {
        let repo = MemoryRepo::new();
        let keys = Keyspace::new(Some("test"));
        let tasks = BackgroundTasks::new();
        let store: Arc<dyn ArticlesRepo> = repo.clone();

        let cache = ArticleCache::new(accelerator.clone(), keys.clone(), CacheConfig::default());
        let counters = CounterBuffer::new(
            accelerator.clone(),
            store.clone(),
            keys.clone(),
            Duration::from_millis(250),
        );
        let search =
            SearchFacade::connect(engine, store.clone(), tasks.clone(), SearchConfig::default())
                .await;
        let service = ArticleService::new(store, cache.clone(), counters, search, tasks.clone());

        Self {
            repo,
            accelerator,
            keys,
            tasks,
            cache,
            service,
        }
    }

    pub async fn with_memory() -> Self {
        Self::new(Some(Arc::new(MemoryAccelerator::new())), None).await
    }
}

pub fn create_command(title: &str, body: &str) -> CreateArticleCommand {
    CreateArticleCommand {
        title: title.to_string(),
        body: body.to_string(),
        excerpt: None,
        cover: None,
        status: ArticleStatus::Published,
        author_id: Uuid::new_v4(),
        category_id: None,
        tags: Vec::new(),
        published_at: None,
    }
}
