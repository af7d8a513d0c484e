//! Application services layer.

pub mod accelerator;
pub mod articles;
pub mod error;
pub mod repos;
pub mod tasks;
