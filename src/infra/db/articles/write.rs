use uuid::Uuid;

use crate::application::repos::{CreateArticleParams, RepoError, UpdateArticleParams};
use crate::domain::entities::ArticleRecord;
use crate::domain::types::CounterKind;
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

use super::types::{ARTICLE_COLUMNS, ArticleRow};

impl PostgresRepositories {
    pub(super) async fn insert_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let CreateArticleParams {
            slug,
            title,
            body,
            excerpt,
            cover,
            status,
            author_id,
            category_id,
            tags,
            published_at,
        } = params;

        let sql = format!(
            "INSERT INTO articles (
                id, slug, title, body, excerpt, cover, status,
                author_id, category_id, tags, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ARTICLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(slug)
            .bind(title)
            .bind(body)
            .bind(excerpt)
            .bind(cover)
            .bind(status)
            .bind(author_id)
            .bind(category_id)
            .bind(tags)
            .bind(published_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    pub(super) async fn update_article(
        &self,
        params: UpdateArticleParams,
    ) -> Result<ArticleRecord, RepoError> {
        let UpdateArticleParams {
            id,
            title,
            body,
            excerpt,
            cover,
            status,
            category_id,
            tags,
            published_at,
        } = params;

        let sql = format!(
            "UPDATE articles
             SET title = $2, body = $3, excerpt = $4, cover = $5, status = $6,
                 category_id = $7, tags = $8, published_at = $9, updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {ARTICLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .bind(title)
            .bind(body)
            .bind(excerpt)
            .bind(cover)
            .bind(status)
            .bind(category_id)
            .bind(tags)
            .bind(published_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    pub(super) async fn soft_delete_article(&self, id: Uuid) -> Result<ArticleRecord, RepoError> {
        let sql = format!(
            "UPDATE articles SET deleted_at = now(), updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {ARTICLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    /// Soft-deleted rows still absorb counter deltas; only a missing row is `NotFound`.
    pub(super) async fn add_to_counter(
        &self,
        id: Uuid,
        kind: CounterKind,
        delta: i64,
    ) -> Result<(), RepoError> {
        let column = kind.column();
        let sql = format!("UPDATE articles SET {column} = {column} + $2 WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(delta)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
