//! Top-level orchestration: query-driven search, the two-tier cache, and
//! the auto-discovery pipeline that runs on cache misses.

pub mod cache;
pub mod orchestrator;
pub mod rank;

pub use cache::{CacheStats, GeoCache, HotTier};
pub use orchestrator::{Oracle, SearchResult, SourceError};
pub use rank::{QueryKind, classify_query, rank_datasets};
