use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::application::repos::ArticlesRepo;
use crate::application::tasks::BackgroundTasks;
use crate::cache::ArticleCache;
use crate::counters::CounterBuffer;
use crate::search::SearchFacade;

const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(1);

/// Entry point for article reads and writes.
///
/// The store is always authoritative. The cache, counter buffer and search
/// engine sit beside it and only ever degrade freshness, never correctness.
#[derive(Clone)]
pub struct ArticleService {
    pub(crate) repo: Arc<dyn ArticlesRepo>,
    pub(crate) cache: ArticleCache,
    pub(crate) counters: CounterBuffer,
    pub(crate) search: SearchFacade,
    pub(crate) tasks: BackgroundTasks,
    pub(crate) task_timeout: Duration,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticlesRepo>,
        cache: ArticleCache,
        counters: CounterBuffer,
        search: SearchFacade,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            repo,
            cache,
            counters,
            search,
            tasks,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Deadline for detached view recording.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn search_facade(&self) -> &SearchFacade {
        &self.search
    }

    /// Record a view without making the caller wait for it.
    pub(crate) fn dispatch_view(&self, id: Uuid) {
        let counters = self.counters.clone();
        self.tasks
            .spawn("counter.view", self.task_timeout, async move {
                counters.record_view(id).await;
            });
    }
}
