use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{ArticleQuery, SearchRequest};
use crate::domain::entities::{ArticlePage, ArticleRecord};

use super::service::ArticleService;
use super::types::ArticleError;

impl ArticleService {
    pub async fn get_by_id(&self, id: Uuid) -> Result<ArticleRecord, ArticleError> {
        let article = match self.cache.get_detail(id).await {
            Some(article) => article,
            None => self.load_detail(id).await?,
        };

        self.dispatch_view(article.id);
        Ok(article)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<ArticleRecord, ArticleError> {
        let mut known_id = None;
        if let Some(id) = self.cache.get_slug(slug).await {
            match self.cache.get_detail(id).await {
                Some(article) if article.slug == slug => {
                    self.dispatch_view(article.id);
                    return Ok(article);
                }
                Some(_) => {
                    debug!(slug, article_id = %id, "Slug pointer is stale");
                    self.cache.forget_slug(slug).await;
                }
                None => known_id = Some(id),
            }
        }

        // the ticket must predate the read; without a pointer only the pointer is cached
        let ticket = match known_id {
            Some(id) => Some(self.cache.begin_fill(id).await),
            None => None,
        };
        let Some(article) = self.repo.find_by_slug(slug).await? else {
            if known_id.is_some() {
                self.cache.forget_slug(slug).await;
            }
            return Err(ArticleError::NotFound);
        };

        match ticket {
            Some(ticket) if known_id == Some(article.id) => {
                self.cache.complete_fill(ticket, &article).await;
            }
            _ => self.cache.remember_slug(slug, article.id).await,
        }

        self.dispatch_view(article.id);
        Ok(article)
    }

    pub async fn list(&self, query: &ArticleQuery) -> Result<ArticlePage, ArticleError> {
        let query = query.normalized();
        let signature = query.signature();

        if let Some(page) = self.cache.get_list(&signature).await {
            return Ok(page);
        }

        let ticket = self.cache.begin_list_fill().await;
        let page = self.repo.list(&query).await?;
        self.cache.complete_list_fill(ticket, &signature, &page).await;
        Ok(page)
    }

    /// Blank terms return an empty page without touching either backend.
    pub async fn search(&self, request: &SearchRequest) -> Result<ArticlePage, ArticleError> {
        let request = request.normalized();
        if request.term.is_empty() {
            return Ok(ArticlePage::empty(request.page, request.page_size));
        }

        self.search.search(&request).await.map_err(ArticleError::from)
    }

    async fn load_detail(&self, id: Uuid) -> Result<ArticleRecord, ArticleError> {
        let ticket = self.cache.begin_fill(id).await;
        let article = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(ArticleError::NotFound)?;
        self.cache.complete_fill(ticket, &article).await;
        Ok(article)
    }
}
