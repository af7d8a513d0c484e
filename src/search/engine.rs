//! External search engine port.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::SearchRequest;
use crate::domain::entities::ArticleRecord;

#[derive(Debug, Error)]
pub enum SearchEngineError {
    #[error("search engine request failed: {0}")]
    Transport(String),
    #[error("search engine answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("search engine response is malformed: {0}")]
    Decode(String),
    #[error("search engine call `{op}` timed out after {elapsed_ms} ms")]
    Timeout { op: &'static str, elapsed_ms: u128 },
}

impl SearchEngineError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Ranked article ids for one page plus the engine's total hit count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHits {
    pub ids: Vec<Uuid>,
    pub total: u64,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn health(&self) -> Result<(), SearchEngineError>;

    /// Insert or replace the document for `article`.
    async fn index(&self, article: &ArticleRecord) -> Result<(), SearchEngineError>;

    /// Remove the document; removing an unknown id succeeds.
    async fn remove(&self, id: Uuid) -> Result<(), SearchEngineError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchHits, SearchEngineError>;

    fn name(&self) -> &'static str;
}
