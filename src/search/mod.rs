//! Article search: an optional external engine behind a store fallback.

mod engine;
mod facade;

pub use engine::{SearchEngine, SearchEngineError, SearchHits};
pub use facade::{ReindexError, ReindexReport, SearchConfig, SearchFacade, SearchState};
pub(crate) use facade::{METRIC_SEARCH_BACKEND_TOTAL, METRIC_SEARCH_ENGINE_ERROR_TOTAL};
