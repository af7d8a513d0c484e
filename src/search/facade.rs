//! Search with graceful fallback to the store's ranked query.
//!
//! The engine is probed once at startup. If it answers, searches go to the
//! engine and fall back to the store per request whenever the engine call
//! fails; if it does not, every search goes to the store for the rest of the
//! process lifetime. Callers see the same [`ArticlePage`] either way.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::{ArticleQuery, ArticlesRepo, RepoError, SearchRequest};
use crate::application::tasks::BackgroundTasks;
use crate::domain::entities::{ArticlePage, ArticleRecord};
use crate::domain::types::{ArticleSortField, SortDirection};

use super::engine::{SearchEngine, SearchEngineError, SearchHits};

pub(crate) const METRIC_SEARCH_BACKEND_TOTAL: &str = "folio_search_backend_total";
pub(crate) const METRIC_SEARCH_ENGINE_ERROR_TOTAL: &str = "folio_search_engine_error_total";

const BACKEND_ENGINE: &str = "engine";
const BACKEND_STORE: &str = "store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Deadline for searches and index maintenance.
    pub timeout: Duration,
    /// Deadline for the startup health probe.
    pub startup_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            startup_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&crate::config::SearchSettings> for SearchConfig {
    fn from(settings: &crate::config::SearchSettings) -> Self {
        Self {
            timeout: settings.timeout,
            startup_timeout: settings.startup_timeout,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReindexError {
    #[error("search engine is disabled")]
    Disabled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub indexed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct SearchFacade {
    engine: Option<Arc<dyn SearchEngine>>,
    repo: Arc<dyn ArticlesRepo>,
    tasks: BackgroundTasks,
    config: SearchConfig,
}

impl SearchFacade {
    /// Probe `engine` and fix the search state for the process lifetime.
    pub async fn connect(
        engine: Option<Arc<dyn SearchEngine>>,
        repo: Arc<dyn ArticlesRepo>,
        tasks: BackgroundTasks,
        config: SearchConfig,
    ) -> Self {
        let engine = match engine {
            Some(engine) => {
                let probe = with_deadline("health", config.startup_timeout, engine.health()).await;
                match probe {
                    Ok(()) => {
                        info!(engine = engine.name(), "Search engine enabled");
                        Some(engine)
                    }
                    Err(err) => {
                        warn!(
                            engine = engine.name(),
                            error = %err,
                            "Search engine unreachable at startup; using store search"
                        );
                        None
                    }
                }
            }
            None => {
                info!("No search engine configured; using store search");
                None
            }
        };

        Self {
            engine,
            repo,
            tasks,
            config,
        }
    }

    /// A façade that always answers from the store.
    pub fn disabled(repo: Arc<dyn ArticlesRepo>, tasks: BackgroundTasks) -> Self {
        Self {
            engine: None,
            repo,
            tasks,
            config: SearchConfig::default(),
        }
    }

    pub fn state(&self) -> SearchState {
        if self.engine.is_some() {
            SearchState::Enabled
        } else {
            SearchState::Disabled
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<ArticlePage, RepoError> {
        let request = request.normalized();

        if let Some(engine) = self.engine.as_ref() {
            match with_deadline("search", self.config.timeout, engine.search(&request)).await {
                Ok(hits) => {
                    let page = self.hydrate(&request, hits).await?;
                    counter!(METRIC_SEARCH_BACKEND_TOTAL, "backend" => BACKEND_ENGINE)
                        .increment(1);
                    debug!(
                        backend = BACKEND_ENGINE,
                        term = %request.term,
                        total = page.total,
                        "Search answered"
                    );
                    return Ok(page);
                }
                Err(err) => {
                    counter!(METRIC_SEARCH_ENGINE_ERROR_TOTAL, "op" => "search").increment(1);
                    warn!(error = %err, term = %request.term, "Search engine failed; falling back to store");
                }
            }
        }

        let page = self.repo.search_ranked(&request).await?;
        counter!(METRIC_SEARCH_BACKEND_TOTAL, "backend" => BACKEND_STORE).increment(1);
        debug!(
            backend = BACKEND_STORE,
            term = %request.term,
            total = page.total,
            "Search answered"
        );
        Ok(page)
    }

    /// Load the hit ids from the store, keeping the engine's order.
    async fn hydrate(
        &self,
        request: &SearchRequest,
        hits: SearchHits,
    ) -> Result<ArticlePage, RepoError> {
        let SearchHits { mut ids, total } = hits;
        ids.truncate(request.page_size as usize);

        let mut by_id: HashMap<Uuid, ArticleRecord> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.repo
                .find_many(&ids)
                .await?
                .into_iter()
                .map(|article| (article.id, article))
                .collect()
        };

        // ids the store no longer returns were deleted after indexing
        let items: Vec<ArticleRecord> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        let total = total.max(items.len() as u64);

        Ok(ArticlePage {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }

    /// Queue an index update; a no-op when disabled.
    pub fn index_article(&self, article: ArticleRecord) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        self.tasks.spawn("search.index", self.config.timeout, async move {
            if let Err(err) = engine.index(&article).await {
                counter!(METRIC_SEARCH_ENGINE_ERROR_TOTAL, "op" => "index").increment(1);
                warn!(article_id = %article.id, error = %err, "Failed to index article");
            }
        });
    }

    /// Queue removal from the index; a no-op when disabled.
    pub fn remove_article(&self, id: Uuid) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        self.tasks.spawn("search.remove", self.config.timeout, async move {
            if let Err(err) = engine.remove(id).await {
                counter!(METRIC_SEARCH_ENGINE_ERROR_TOTAL, "op" => "remove").increment(1);
                warn!(article_id = %id, error = %err, "Failed to remove article from index");
            }
        });
    }

    /// Push every stored article to the engine, oldest first.
    pub async fn reindex_all(&self, page_size: u32) -> Result<ReindexReport, ReindexError> {
        let engine = self.engine.as_ref().ok_or(ReindexError::Disabled)?;
        let mut report = ReindexReport::default();
        let mut query = ArticleQuery {
            page: 1,
            page_size,
            sort: ArticleSortField::CreatedAt,
            direction: SortDirection::Asc,
            ..Default::default()
        }
        .normalized();

        loop {
            let page = self.repo.list(&query).await?;
            if page.items.is_empty() {
                break;
            }

            for article in &page.items {
                match with_deadline("index", self.config.timeout, engine.index(article)).await {
                    Ok(()) => report.indexed += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(article_id = %article.id, error = %err, "Failed to index article");
                    }
                }
            }

            let seen = u64::from(query.page) * u64::from(query.page_size);
            if seen >= page.total {
                break;
            }
            query.page += 1;
        }

        info!(
            indexed = report.indexed,
            failed = report.failed,
            "Search reindex finished"
        );
        Ok(report)
    }
}

async fn with_deadline<T, F>(
    op: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T, SearchEngineError>
where
    F: Future<Output = Result<T, SearchEngineError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(SearchEngineError::Timeout {
            op,
            elapsed_ms: deadline.as_millis(),
        }),
    }
}
