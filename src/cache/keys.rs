//! Accelerator key layout.
//!
//! Every key the cache layer and the counter buffer write is built here, so the
//! reconciler's prefix scans and the writers can never disagree on a format.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::types::CounterKind;

const DETAIL: &str = "article:detail:";
const SLUG: &str = "article:slug:";
const GENERATION: &str = "article:gen:";
const LIST: &str = "article:list:";
const LIST_GENERATION: &str = "article:gen:lists";

/// Builds accelerator keys, optionally under a shared namespace.
///
/// With namespace `blog`, the view counter for an article is
/// `blog:view:{id}`; without one it is `view:{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(namespace: Option<&str>) -> Self {
        let prefix = match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => format!("{}:", ns.trim_end_matches(':')),
            _ => String::new(),
        };
        Self { prefix }
    }

    pub fn detail_key(&self, id: Uuid) -> String {
        format!("{}{DETAIL}{id}", self.prefix)
    }

    pub fn slug_key(&self, slug: &str) -> String {
        format!("{}{SLUG}{slug}", self.prefix)
    }

    pub fn generation_key(&self, id: Uuid) -> String {
        format!("{}{GENERATION}{id}", self.prefix)
    }

    /// List pages are keyed by a digest of the canonical query signature.
    pub fn list_key(&self, signature: &str) -> String {
        format!("{}{LIST}{}", self.prefix, hash_signature(signature))
    }

    /// Bumped on every write; lives outside the list prefix so invalidation scans skip it.
    pub fn list_generation_key(&self) -> String {
        format!("{}{LIST_GENERATION}", self.prefix)
    }

    pub fn list_prefix(&self) -> String {
        format!("{}{LIST}", self.prefix)
    }

    pub fn counter_key(&self, kind: CounterKind, id: Uuid) -> String {
        format!("{}{}:{id}", self.prefix, kind.as_str())
    }

    pub fn counter_prefix(&self, kind: CounterKind) -> String {
        format!("{}{}:", self.prefix, kind.as_str())
    }

    /// Extract the article id from a counter key produced by [`Self::counter_key`].
    pub fn parse_counter_key(&self, kind: CounterKind, key: &str) -> Option<Uuid> {
        key.strip_prefix(&self.counter_prefix(kind))
            .and_then(|rest| Uuid::parse_str(rest).ok())
    }
}

fn hash_signature(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    hex::encode(hasher.finalize())
}
