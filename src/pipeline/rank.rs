//! Query classification and dataset ranking for the top-level search.

use serde::{Deserialize, Serialize};

use crate::entities::GeoDataset;
use crate::entities::dataset::parse_geo_id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryKind {
    GeoId(String),
    Pmid(String),
    Keyword(String),
}

pub fn classify_query(query: &str) -> QueryKind {
    let trimmed = query.trim();
    if let Ok(geo_id) = parse_geo_id(trimmed) {
        return QueryKind::GeoId(geo_id);
    }
    if !trimmed.is_empty() && trimmed.len() <= 9 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return QueryKind::Pmid(trimmed.to_string());
    }
    QueryKind::Keyword(trimmed.to_string())
}

fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_ascii_lowercase()
        })
        .filter(|t| t.len() > 2)
        .collect()
}

/// Fraction of query terms present in the dataset's title or summary.
fn term_overlap(terms: &[String], dataset: &GeoDataset) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {}",
        dataset.title.as_deref().unwrap_or_default(),
        dataset.summary.as_deref().unwrap_or_default()
    )
    .to_ascii_lowercase();
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched as f64 / terms.len() as f64
}

/// Mild recency preference from GEO's publication date (`pdat` in the
/// summary metadata); unknown dates score zero.
fn recency(dataset: &GeoDataset) -> f64 {
    let year = dataset
        .metadata
        .get("pdat")
        .and_then(|v| v.as_str())
        .and_then(|d| d.split(['/', '-', ' ']).next())
        .and_then(|y| y.parse::<i32>().ok());
    match year {
        Some(year) if year >= 2000 => ((year - 2000) as f64 / 30.0).min(1.0),
        _ => 0.0,
    }
}

/// Deterministic relevance score: term overlap dominates, recency breaks
/// near-ties, and GEO's own result order is preserved among equals (stable
/// sort). Monotonic in overlap and recency.
pub fn score_dataset(query: &str, dataset: &GeoDataset) -> f64 {
    let terms = query_terms(query);
    3.0 * term_overlap(&terms, dataset) + recency(dataset)
}

pub fn rank_datasets(query: &str, mut datasets: Vec<GeoDataset>) -> Vec<GeoDataset> {
    let terms = query_terms(query);
    datasets.sort_by(|a, b| {
        let score_a = 3.0 * term_overlap(&terms, a) + recency(a);
        let score_b = 3.0 * term_overlap(&terms, b) + recency(b);
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });
    datasets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(geo_id: &str, title: &str, pdat: Option<&str>) -> GeoDataset {
        GeoDataset {
            geo_id: geo_id.into(),
            title: Some(title.into()),
            metadata: pdat
                .map(|d| serde_json::json!({"pdat": d}))
                .unwrap_or(serde_json::Value::Null),
            ..Default::default()
        }
    }

    #[test]
    fn classify_recognizes_geo_pmid_and_keywords() {
        assert_eq!(classify_query("GSE12345"), QueryKind::GeoId("GSE12345".into()));
        assert_eq!(classify_query(" gse12345 "), QueryKind::GeoId("GSE12345".into()));
        assert_eq!(classify_query("19753302"), QueryKind::Pmid("19753302".into()));
        assert_eq!(
            classify_query("breast cancer single cell"),
            QueryKind::Keyword("breast cancer single cell".into())
        );
    }

    #[test]
    fn overlap_dominates_ranking() {
        let ranked = rank_datasets(
            "breast cancer expression",
            vec![
                dataset("GSE1", "Liver fibrosis atlas", Some("2024/01/01")),
                dataset("GSE2", "Breast cancer expression profiling", Some("2010/01/01")),
            ],
        );
        assert_eq!(ranked[0].geo_id, "GSE2");
    }

    #[test]
    fn recency_breaks_equal_overlap() {
        let ranked = rank_datasets(
            "breast cancer",
            vec![
                dataset("GSE1", "Breast cancer cohort", Some("2008/06/01")),
                dataset("GSE2", "Breast cancer cohort", Some("2023/06/01")),
            ],
        );
        assert_eq!(ranked[0].geo_id, "GSE2");
    }

    #[test]
    fn upstream_order_survives_exact_ties() {
        let ranked = rank_datasets(
            "breast cancer",
            vec![
                dataset("GSE1", "Breast cancer cohort", None),
                dataset("GSE2", "Breast cancer cohort", None),
            ],
        );
        assert_eq!(ranked[0].geo_id, "GSE1");
    }

    #[test]
    fn score_is_monotonic_in_overlap() {
        let none = dataset("GSE1", "Unrelated topic entirely", None);
        let partial = dataset("GSE2", "Breast tissue survey", None);
        let full = dataset("GSE3", "Breast cancer expression atlas", None);
        let q = "breast cancer expression";
        assert!(score_dataset(q, &full) > score_dataset(q, &partial));
        assert!(score_dataset(q, &partial) > score_dataset(q, &none));
    }
}
