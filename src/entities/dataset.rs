use serde::{Deserialize, Serialize};

use crate::error::OracleError;

/// A Gene Expression Omnibus series record (`GSE\d+`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoDataset {
    pub geo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organism: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<i64>,
    /// PMIDs of the paper(s) announcing the dataset, as reported by GEO.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub original_pmids: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl GeoDataset {
    pub fn new(geo_id: impl Into<String>) -> Self {
        Self {
            geo_id: geo_id.into(),
            ..Default::default()
        }
    }
}

/// Accepts `GSE1234` (and the related `GSM`/`GPL` accessions the pipeline
/// recognizes but does not enrich). Returns the canonical uppercase form.
pub fn parse_geo_id(value: &str) -> Result<String, OracleError> {
    let value = value.trim().to_ascii_uppercase();
    let (prefix, digits) = value.split_at(value.len().min(3));
    if matches!(prefix, "GSE" | "GSM" | "GPL" | "GDS")
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
    {
        return Ok(value);
    }
    Err(OracleError::InvalidArgument(format!(
        "\"{value}\" is not a GEO accession (expected GSE/GSM/GPL/GDS followed by digits)"
    )))
}

pub fn is_geo_id(value: &str) -> bool {
    parse_geo_id(value).is_ok()
}
