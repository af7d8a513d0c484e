//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{ArticleStatus, CounterKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub cover: Option<String>,
    pub status: ArticleStatus,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl ArticleRecord {
    pub fn counter(&self, kind: CounterKind) -> i64 {
        match kind {
            CounterKind::View => self.view_count,
            CounterKind::Like => self.like_count,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// One page of articles plus the total number of matches for the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub items: Vec<ArticleRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl ArticlePage {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            page_size,
        }
    }
}
