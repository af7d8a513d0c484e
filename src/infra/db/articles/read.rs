use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::repos::{ArticleQuery, RepoError, SearchRequest};
use crate::domain::entities::{ArticlePage, ArticleRecord};
use crate::infra::db::{ArticleFilter, PostgresRepositories, like_pattern, map_sqlx_error};

use super::types::{ARTICLE_COLUMNS, ArticleRow};

/// Relevance of a single row: title matches weigh 3, excerpt 2, body 1.
fn push_rank_expr<'q>(qb: &mut QueryBuilder<'q, Postgres>, pattern: &str) {
    qb.push("(CASE WHEN title ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" THEN 3 ELSE 0 END + CASE WHEN excerpt ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" THEN 2 ELSE 0 END + CASE WHEN body ILIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" THEN 1 ELSE 0 END)");
}

impl PostgresRepositories {
    pub(super) async fn fetch_article_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ArticleRecord::from))
    }

    pub(super) async fn fetch_article_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let sql =
            format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ArticleRecord::from))
    }

    pub(super) async fn fetch_articles_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<ArticleRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ANY($1) AND deleted_at IS NULL"
        );
        let rows = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    pub(super) async fn list_articles(
        &self,
        query: &ArticleQuery,
    ) -> Result<ArticlePage, RepoError> {
        let query = query.normalized();
        let filter = ArticleFilter {
            status: query.status,
            category_id: query.category_id,
            author_id: query.author_id,
            tag: query.tag.as_deref(),
            search: query.search.as_deref(),
        };

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles WHERE deleted_at IS NULL");
        filter.apply(&mut count_qb);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE deleted_at IS NULL"
        ));
        filter.apply(&mut qb);
        let direction = query.direction.as_sql();
        qb.push(format!(
            " ORDER BY {} {direction} NULLS LAST, id {direction}",
            query.sort.as_str()
        ));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(query.page_size));
        qb.push(" OFFSET ");
        qb.push_bind(query.offset() as i64);

        let rows = qb
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ArticlePage {
            items: rows.into_iter().map(ArticleRecord::from).collect(),
            total: Self::convert_count(total)?,
            page: query.page,
            page_size: query.page_size,
        })
    }

    pub(super) async fn search_articles_ranked(
        &self,
        request: &SearchRequest,
    ) -> Result<ArticlePage, RepoError> {
        let request = request.normalized();
        if request.term.is_empty() {
            return Ok(ArticlePage::empty(request.page, request.page_size));
        }

        let pattern = like_pattern(&request.term);
        let filter = ArticleFilter {
            status: request.status,
            category_id: request.category_id,
            author_id: request.author_id,
            ..Default::default()
        };

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles WHERE deleted_at IS NULL");
        filter.apply(&mut count_qb);
        count_qb.push(" AND ");
        push_rank_expr(&mut count_qb, &pattern);
        count_qb.push(" > 0");
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ARTICLE_COLUMNS}, "));
        push_rank_expr(&mut qb, &pattern);
        qb.push(" AS rank FROM articles WHERE deleted_at IS NULL");
        filter.apply(&mut qb);
        qb.push(" AND ");
        push_rank_expr(&mut qb, &pattern);
        qb.push(" > 0 ORDER BY rank DESC, published_at DESC NULLS LAST, id DESC LIMIT ");
        qb.push_bind(i64::from(request.page_size));
        qb.push(" OFFSET ");
        qb.push_bind(request.offset() as i64);

        let rows = qb
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ArticlePage {
            items: rows.into_iter().map(ArticleRecord::from).collect(),
            total: Self::convert_count(total)?,
            page: request.page,
            page_size: request.page_size,
        })
    }
}
