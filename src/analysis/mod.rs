//! Analysis of specialist results.
//!
//! This module scores and orders results (reranking) and groups them by
//! specialist type for the later stages.

pub mod grouping;
pub mod reranker;

pub use grouping::{group_payloads, of_kind};
pub use reranker::Reranker;
