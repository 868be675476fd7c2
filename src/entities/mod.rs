pub mod aggregate;
pub mod dataset;
pub mod publication;

pub use aggregate::{
    AggregateStatistics, DownloadAttempt, DownloadStatus, ExtractionSummary, GeoAggregate,
    PaperGroups, PaperRecord,
};
pub use dataset::GeoDataset;
pub use publication::{Publication, Relationship};
