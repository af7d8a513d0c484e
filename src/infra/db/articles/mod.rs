mod read;
mod types;
mod write;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    ArticleQuery, ArticlesRepo, CreateArticleParams, RepoError, SearchRequest,
    UpdateArticleParams,
};
use crate::domain::entities::{ArticlePage, ArticleRecord};
use crate::domain::types::CounterKind;

use super::PostgresRepositories;

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        self.fetch_article_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ArticleRecord>, RepoError> {
        self.fetch_article_by_slug(slug).await
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<ArticleRecord>, RepoError> {
        self.fetch_articles_by_ids(ids).await
    }

    async fn create(&self, params: CreateArticleParams) -> Result<ArticleRecord, RepoError> {
        self.insert_article(params).await
    }

    async fn update(&self, params: UpdateArticleParams) -> Result<ArticleRecord, RepoError> {
        self.update_article(params).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<ArticleRecord, RepoError> {
        self.soft_delete_article(id).await
    }

    async fn increment_counter(
        &self,
        id: Uuid,
        kind: CounterKind,
        delta: i64,
    ) -> Result<(), RepoError> {
        self.add_to_counter(id, kind, delta).await
    }

    async fn list(&self, query: &ArticleQuery) -> Result<ArticlePage, RepoError> {
        self.list_articles(query).await
    }

    async fn search_ranked(&self, request: &SearchRequest) -> Result<ArticlePage, RepoError> {
        self.search_articles_ranked(request).await
    }
}
