//! kbqa-text
//!
//! Tantivy-backed BM25 keyword index over the corpus. The index is built once
//! in memory at startup and is read-only afterwards.

pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::TantivyKeywordIndex;
