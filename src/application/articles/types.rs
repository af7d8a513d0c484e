use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::counters::CounterError;
use crate::domain::types::ArticleStatus;

/// Excerpts derived from the body are cut at this many characters.
pub const EXCERPT_MAX_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article not found")]
    NotFound,
    #[error("`{0}` must not be empty")]
    Validation(&'static str),
    #[error("no free slug derived from `{base}` after {attempts} attempts")]
    Conflict { base: String, attempts: usize },
    #[error(transparent)]
    Unavailable(#[from] CounterError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ArticleError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ArticleError::NotFound,
            other => ArticleError::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateArticleCommand {
    pub title: String,
    pub body: String,
    /// Derived from the body when blank.
    pub excerpt: Option<String>,
    pub cover: Option<String>,
    pub status: ArticleStatus,
    pub author_id: Uuid,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpdateArticleCommand {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub cover: Option<String>,
    pub status: ArticleStatus,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub published_at: Option<OffsetDateTime>,
}

pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), ArticleError> {
    if value.trim().is_empty() {
        return Err(ArticleError::Validation(field));
    }
    Ok(())
}

/// Published articles always carry a publication time.
pub fn normalize_published_at(
    status: ArticleStatus,
    published_at: Option<OffsetDateTime>,
) -> Option<OffsetDateTime> {
    match (status, published_at) {
        (ArticleStatus::Published, None) => Some(OffsetDateTime::now_utc()),
        (_, value) => value,
    }
}

pub fn resolve_excerpt(excerpt: Option<&str>, body: &str) -> String {
    match excerpt.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => {
            let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
            if collapsed.chars().count() <= EXCERPT_MAX_CHARS {
                collapsed
            } else {
                let mut cut: String = collapsed.chars().take(EXCERPT_MAX_CHARS).collect();
                cut.push('…');
                cut
            }
        }
    }
}

/// Trim tags, drop blanks and duplicates, keep first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect()
}
