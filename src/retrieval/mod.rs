//! Retrieval — the web-search grounding pipeline.
//!
//! Submodules:
//! - `query`: constrained LLM calls (query rewrite, relevance judging)
//! - `search`: DuckDuckGo HTML search behind the `SearchProvider` trait
//! - `fetch`: same-domain page crawling and readable-text extraction
//! - `index`: per-run chunk/embed/retrieve similarity index

pub mod fetch;
pub mod index;
pub mod query;
pub mod search;

pub use fetch::{normalize_url, PageFetcher};
pub use index::RetrievalIndex;
pub use query::{filter_relevant, rewrite_query};
pub use search::{DuckDuckGoSearch, SearchProvider, SearchResult};

use thiserror::Error;

/// Browser-like user agent for search and page fetches — some hosts reject
/// requests without one.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Errors from constructing retrieval components.
///
/// The pipeline operations themselves never raise — degradation always has a
/// defined fallback value.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}
