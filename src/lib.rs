//! Folio: article reads through an accelerator-backed cache, buffered view and
//! like counters reconciled into Postgres, and search with a store fallback.

pub mod application;
pub mod cache;
pub mod config;
pub mod counters;
pub mod domain;
pub mod infra;
pub mod search;
