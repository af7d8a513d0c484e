use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{CreateArticleParams, UpdateArticleParams};
use crate::domain::entities::ArticleRecord;
use crate::domain::slug::{MAX_SUFFIX_ATTEMPTS, SlugCandidates};

use super::service::ArticleService;
use super::types::{
    ArticleError, CreateArticleCommand, UpdateArticleCommand, ensure_non_empty,
    normalize_published_at, normalize_tags, resolve_excerpt,
};

impl ArticleService {
    pub async fn create(&self, command: CreateArticleCommand) -> Result<ArticleRecord, ArticleError> {
        ensure_non_empty(&command.title, "title")?;
        ensure_non_empty(&command.body, "body")?;

        let candidates =
            SlugCandidates::from_title(&command.title).map_err(|_| ArticleError::Validation("title"))?;
        let base = candidates.base().to_string();

        let template = CreateArticleParams {
            slug: String::new(),
            title: command.title.trim().to_string(),
            excerpt: resolve_excerpt(command.excerpt.as_deref(), &command.body),
            body: command.body,
            cover: command.cover,
            status: command.status,
            author_id: command.author_id,
            category_id: command.category_id,
            tags: normalize_tags(command.tags),
            published_at: normalize_published_at(command.status, command.published_at),
        };

        for slug in candidates {
            let params = CreateArticleParams {
                slug,
                ..template.clone()
            };
            match self.repo.create(params).await {
                Ok(article) => {
                    info!(article_id = %article.id, slug = %article.slug, "Article created");
                    self.cache.invalidate_all_lists().await;
                    self.search.index_article(article.clone());
                    return Ok(article);
                }
                Err(err) if err.is_slug_conflict() => {
                    debug!(base = %base, "Slug taken; trying next candidate");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ArticleError::Conflict {
            base,
            attempts: MAX_SUFFIX_ATTEMPTS + 1,
        })
    }

    pub async fn update(&self, command: UpdateArticleCommand) -> Result<ArticleRecord, ArticleError> {
        ensure_non_empty(&command.title, "title")?;
        ensure_non_empty(&command.body, "body")?;

        let params = UpdateArticleParams {
            id: command.id,
            title: command.title.trim().to_string(),
            excerpt: resolve_excerpt(command.excerpt.as_deref(), &command.body),
            body: command.body,
            cover: command.cover,
            status: command.status,
            category_id: command.category_id,
            tags: normalize_tags(command.tags),
            published_at: normalize_published_at(command.status, command.published_at),
        };

        let article = self.repo.update(params).await?;
        self.cache.invalidate_detail(article.id).await;
        self.cache.invalidate_all_lists().await;
        self.search.index_article(article.clone());

        info!(article_id = %article.id, "Article updated");
        Ok(article)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ArticleError> {
        let article = self.repo.soft_delete(id).await?;
        self.cache.invalidate_detail(id).await;
        self.cache.forget_slug(&article.slug).await;
        self.cache.invalidate_all_lists().await;
        self.search.remove_article(id);

        info!(article_id = %id, "Article deleted");
        Ok(())
    }

    /// Record a like. Unlike views, a like that could not be stored anywhere
    /// is reported back as [`ArticleError::Unavailable`].
    pub async fn like(&self, id: Uuid) -> Result<(), ArticleError> {
        if self.cache.get_detail(id).await.is_none() {
            self.repo.find_by_id(id).await?.ok_or(ArticleError::NotFound)?;
        }

        self.counters.record_like(id).await?;
        Ok(())
    }
}
