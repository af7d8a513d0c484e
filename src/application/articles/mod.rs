mod commands;
mod queries;
mod service;
pub mod types;

pub use service::*;
pub use types::{
    ArticleError, CreateArticleCommand, UpdateArticleCommand, ensure_non_empty,
    normalize_published_at,
};
