//! Postgres-backed repository implementations.

mod articles;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::types::ArticleStatus;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

/// Filters shared by listings and ranked search.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ArticleFilter<'q> {
    pub status: Option<ArticleStatus>,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub tag: Option<&'q str>,
    pub search: Option<&'q str>,
}

impl ArticleFilter<'_> {
    /// Appends ` AND …` clauses; the builder must already hold a `WHERE`.
    pub(crate) fn apply<'q>(&self, qb: &mut QueryBuilder<'q, Postgres>) {
        if let Some(status) = self.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }

        if let Some(category_id) = self.category_id {
            qb.push(" AND category_id = ");
            qb.push_bind(category_id);
        }

        if let Some(author_id) = self.author_id {
            qb.push(" AND author_id = ");
            qb.push_bind(author_id);
        }

        if let Some(tag) = self.tag {
            qb.push(" AND ");
            qb.push_bind(tag.to_string());
            qb.push(" = ANY(tags)");
        }

        if let Some(search) = self.search {
            let pattern = like_pattern(search);
            qb.push(" AND (title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR slug ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR excerpt ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }
}

/// `%term%` with LIKE metacharacters escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation() || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.is_check_violation() || db.message().contains("violates") => {
            RepoError::Integrity {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}
