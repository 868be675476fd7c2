use serde::{Deserialize, Serialize};

use crate::error::OracleError;

/// One publication record shared by every external client. Each boundary
/// (search, citation discovery, URL collection) produces this shape, so the
/// rest of the pipeline never sees per-source payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    /// Source-specific leftovers worth keeping (citation counts, OA flags).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Publication {
    pub fn is_empty(&self) -> bool {
        self.pmid.is_none()
            && self.doi.is_none()
            && self.pmc_id.is_none()
            && self.arxiv_id.is_none()
            && self.title.trim().is_empty()
    }

    /// Merge identifiers and metadata from another record describing the
    /// same paper. Existing fields win; gaps are filled.
    pub fn absorb(&mut self, other: &Publication) {
        if self.pmid.is_none() {
            self.pmid = other.pmid.clone();
        }
        if self.doi.is_none() {
            self.doi = other.doi.clone();
        }
        if self.pmc_id.is_none() {
            self.pmc_id = other.pmc_id.clone();
        }
        if self.arxiv_id.is_none() {
            self.arxiv_id = other.arxiv_id.clone();
        }
        if self.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.journal.is_none() {
            self.journal = other.journal.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.abstract_text.is_none() {
            self.abstract_text = other.abstract_text.clone();
        }
    }
}

/// How a publication relates to a GEO dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Original,
    Citing,
}

impl Relationship {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Citing => "citing",
        }
    }

    pub fn parse(value: &str) -> Result<Self, OracleError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "citing" => Ok(Self::Citing),
            _ => Err(OracleError::InvalidArgument(format!(
                "Unknown relationship \"{value}\". Expected original or citing"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_fills_gaps_without_clobbering() {
        let mut a = Publication {
            pmid: Some("19753302".into()),
            title: "Original title".into(),
            ..Default::default()
        };
        let b = Publication {
            pmid: Some("999".into()),
            doi: Some("10.1038/nature08460".into()),
            title: "Different title".into(),
            year: Some(2009),
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!(a.pmid.as_deref(), Some("19753302"));
        assert_eq!(a.doi.as_deref(), Some("10.1038/nature08460"));
        assert_eq!(a.title, "Original title");
        assert_eq!(a.year, Some(2009));
    }

    #[test]
    fn empty_means_no_identifiers_and_no_title() {
        assert!(Publication::default().is_empty());
        assert!(
            Publication {
                title: "  ".into(),
                ..Default::default()
            }
            .is_empty()
        );
        assert!(
            !Publication {
                doi: Some("10.1/x".into()),
                ..Default::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn relationship_round_trips() {
        assert_eq!(
            Relationship::parse("original").expect("should parse"),
            Relationship::Original
        );
        assert_eq!(
            Relationship::parse(" Citing ").expect("should parse"),
            Relationship::Citing
        );
        assert!(Relationship::parse("related").is_err());
    }
}
