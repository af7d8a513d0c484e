//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "article_status", rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    InReview,
    Published,
    Archived,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::InReview => "in_review",
            ArticleStatus::Published => "published",
            ArticleStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ArticleStatus::Draft),
            "in_review" => Ok(ArticleStatus::InReview),
            "published" => Ok(ArticleStatus::Published),
            "archived" => Ok(ArticleStatus::Archived),
            other => Err(format!("unknown article status `{other}`")),
        }
    }
}

/// Buffered engagement counters. Each kind maps to one counter column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    View,
    Like,
}

impl CounterKind {
    pub const ALL: [CounterKind; 2] = [CounterKind::View, CounterKind::Like];

    /// Key segment used in the accelerator keyspace.
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::View => "view",
            CounterKind::Like => "like",
        }
    }

    /// Column on the `articles` table that absorbs this counter.
    pub fn column(self) -> &'static str {
        match self {
            CounterKind::View => "view_count",
            CounterKind::Like => "like_count",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sortable columns for article listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    PublishedAt,
    ViewCount,
    LikeCount,
    Title,
}

impl ArticleSortField {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleSortField::CreatedAt => "created_at",
            ArticleSortField::UpdatedAt => "updated_at",
            ArticleSortField::PublishedAt => "published_at",
            ArticleSortField::ViewCount => "view_count",
            ArticleSortField::LikeCount => "like_count",
            ArticleSortField::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}
