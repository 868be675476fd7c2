use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::GeoDataset;

/// The complete GEO-rooted view served by the cache: the dataset, its
/// original and citing papers, and rollup statistics. This is the value the
/// hot tier stores and `get_complete_geo_data` assembles from the warm tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoAggregate {
    pub geo: GeoDataset,
    pub papers: PaperGroups,
    pub statistics: AggregateStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperGroups {
    #[serde(default)]
    pub original: Vec<PaperRecord>,
    #[serde(default)]
    pub citing: Vec<PaperRecord>,
}

/// One publication as it appears inside an aggregate, with its download and
/// extraction history attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub identifier_key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download_history: Vec<DownloadAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Success,
    Failed,
    Retry,
    Skipped,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retry => "retry",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "retry" => Some(Self::Retry),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One row of `download_history`, surfaced in aggregates and in the
/// `DownloadResult` returned by the waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadAttempt {
    pub url: String,
    pub source: String,
    pub status: DownloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub attempt_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub has_fulltext: bool,
    pub word_count: i64,
    pub table_count: i64,
    pub figure_count: i64,
    pub section_count: i64,
    pub quality_score: f64,
    pub parser_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub original_papers: usize,
    pub citing_papers: usize,
    pub total_papers: usize,
    pub successful_downloads: usize,
    pub failed_downloads: usize,
    pub extracted_papers: usize,
    pub success_rate: f64,
}

impl AggregateStatistics {
    /// Rollups derived from the assembled paper groups; success rate is
    /// successful downloads over total papers, zero when there are none.
    pub fn from_groups(groups: &PaperGroups) -> Self {
        let original_papers = groups.original.len();
        let citing_papers = groups.citing.len();
        let total_papers = original_papers + citing_papers;
        let all = groups.original.iter().chain(groups.citing.iter());

        let mut successful_downloads = 0usize;
        let mut failed_downloads = 0usize;
        let mut extracted_papers = 0usize;
        for paper in all {
            if paper.pdf_path.is_some()
                || paper
                    .download_history
                    .iter()
                    .any(|a| a.status == DownloadStatus::Success)
            {
                successful_downloads += 1;
            } else if !paper.download_history.is_empty() {
                failed_downloads += 1;
            }
            if paper.extraction.is_some() {
                extracted_papers += 1;
            }
        }

        let success_rate = if total_papers == 0 {
            0.0
        } else {
            successful_downloads as f64 / total_papers as f64
        };

        Self {
            original_papers,
            citing_papers,
            total_papers,
            successful_downloads,
            failed_downloads,
            extracted_papers,
            success_rate,
        }
    }
}
