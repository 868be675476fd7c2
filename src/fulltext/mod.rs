//! Full-text acquisition: URL collection across every eligible source,
//! classification and priority ordering, the sequential download waterfall,
//! and the extraction seam.

pub mod candidate;
pub mod classify;
pub mod collect;
pub mod download;
pub mod extract;

pub use candidate::{UrlCandidate, UrlType, sort_candidates};
pub use classify::classify_url;
pub use collect::UrlCollector;
pub use download::{DownloadResult, Downloader};
pub use extract::{ContentExtractor, TextStatsExtractor};
