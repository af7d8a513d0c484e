//! Repository traits describing persistence adapters.

use std::fmt::Write as _;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ArticlePage, ArticleRecord};
use crate::domain::types::{ArticleSortField, ArticleStatus, CounterKind, SortDirection};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// True when the violated constraint guards article slugs.
    pub fn is_slug_conflict(&self) -> bool {
        matches!(self, RepoError::Duplicate { constraint } if constraint.contains("slug"))
    }
}

/// Filters, sort and pagination for article listings.
///
/// Two queries that differ only in non-canonical ways (blank search terms,
/// out-of-range page sizes) normalize to the same [`ArticleQuery::signature`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArticleQuery {
    pub page: u32,
    pub page_size: u32,
    pub status: Option<ArticleStatus>,
    pub sort: ArticleSortField,
    pub direction: SortDirection,
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub author_id: Option<Uuid>,
    pub search: Option<String>,
}

impl ArticleQuery {
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: normalize_page_size(self.page_size),
            status: self.status,
            sort: self.sort,
            direction: self.direction,
            category_id: self.category_id,
            tag: normalize_term(self.tag.as_deref()),
            author_id: self.author_id,
            search: normalize_term(self.search.as_deref()),
        }
    }

    pub fn offset(&self) -> u64 {
        let normalized = self.normalized();
        u64::from(normalized.page - 1) * u64::from(normalized.page_size)
    }

    /// Canonical text form of the query, used to key list-page cache entries.
    pub fn signature(&self) -> String {
        let q = self.normalized();
        let mut out = String::with_capacity(96);
        let _ = write!(
            out,
            "p={}|ps={}|st={}|sort={}:{}|cat={}|tag={}|author={}|q={}",
            q.page,
            q.page_size,
            q.status.map(ArticleStatus::as_str).unwrap_or("-"),
            q.sort.as_str(),
            q.direction.as_str(),
            q.category_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            free_text(q.tag.as_deref()),
            q.author_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            free_text(q.search.as_deref()),
        );
        out
    }
}

/// Length-prefixed so user text containing `|` cannot forge another field.
fn free_text(value: Option<&str>) -> String {
    match value {
        Some(text) => format!("{}:{text}", text.len()),
        None => "-".to_string(),
    }
}

/// Free-text search with the same pagination contract as listings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub term: String,
    pub page: u32,
    pub page_size: u32,
    pub status: Option<ArticleStatus>,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
}

impl SearchRequest {
    pub fn normalized(&self) -> Self {
        Self {
            term: self.term.trim().to_string(),
            page: self.page.max(1),
            page_size: normalize_page_size(self.page_size),
            status: self.status,
            category_id: self.category_id,
            author_id: self.author_id,
        }
    }

    pub fn offset(&self) -> u64 {
        let normalized = self.normalized();
        u64::from(normalized.page - 1) * u64::from(normalized.page_size)
    }
}

fn normalize_page_size(page_size: u32) -> u32 {
    if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    }
}

fn normalize_term(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub cover: Option<String>,
    pub status: ArticleStatus,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpdateArticleParams {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub cover: Option<String>,
    pub status: ArticleStatus,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub published_at: Option<OffsetDateTime>,
}

/// Durable store for articles. Soft-deleted rows are invisible to every read.
#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError>;

    /// Rows for `ids`, in no particular order; missing ids are skipped.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<ArticleRecord>, RepoError>;

    async fn create(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn update(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError>;

    async fn soft_delete(&self, id: Uuid) -> Result<ArticleRecord, RepoError>;

    /// Atomic `column = column + delta`. `NotFound` when the row is gone.
    async fn increment_counter(
        &self,
        id: Uuid,
        kind: CounterKind,
        delta: i64,
    ) -> Result<(), RepoError>;

    async fn list(&self, query: &ArticleQuery) -> Result<ArticlePage, RepoError>;

    /// Weighted multi-field match ordered by relevance.
    async fn search_ranked(&self, request: &SearchRequest) -> Result<ArticlePage, RepoError>;
}
