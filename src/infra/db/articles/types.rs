use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::ArticleRecord;
use crate::domain::types::ArticleStatus;

pub(crate) const ARTICLE_COLUMNS: &str = "id, slug, title, body, excerpt, cover, status, \
    author_id, category_id, tags, view_count, like_count, comment_count, \
    published_at, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub(crate) id: Uuid,
    pub(crate) slug: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) excerpt: String,
    pub(crate) cover: Option<String>,
    pub(crate) status: ArticleStatus,
    pub(crate) author_id: Uuid,
    pub(crate) category_id: Option<Uuid>,
    pub(crate) tags: Vec<String>,
    pub(crate) view_count: i64,
    pub(crate) like_count: i64,
    pub(crate) comment_count: i64,
    pub(crate) published_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
    pub(crate) deleted_at: Option<OffsetDateTime>,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            body: row.body,
            excerpt: row.excerpt,
            cover: row.cover,
            status: row.status,
            author_id: row.author_id,
            category_id: row.category_id,
            tags: row.tags,
            view_count: row.view_count,
            like_count: row.like_count,
            comment_count: row.comment_count,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}
