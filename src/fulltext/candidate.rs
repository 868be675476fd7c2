//! URL candidates: what the collectors emit and the waterfall consumes.

use serde::{Deserialize, Serialize};

/// Payload shape behind a URL. Groups are attempted in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlType {
    PdfDirect,
    HtmlFulltext,
    LandingPage,
    DoiResolver,
    Unknown,
}

impl UrlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PdfDirect => "pdf_direct",
            Self::HtmlFulltext => "html_fulltext",
            Self::LandingPage => "landing_page",
            Self::DoiResolver => "doi_resolver",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf_direct" => Some(Self::PdfDirect),
            "html_fulltext" => Some(Self::HtmlFulltext),
            "landing_page" => Some(Self::LandingPage),
            "doi_resolver" => Some(Self::DoiResolver),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Priority adjustment applied on top of the source's base priority.
    pub fn priority_adjustment(self) -> i64 {
        match self {
            Self::PdfDirect => -2,
            Self::HtmlFulltext => 0,
            Self::LandingPage => 2,
            Self::DoiResolver => 3,
            Self::Unknown => 0,
        }
    }

    /// Attempt-order rank of the type group.
    pub fn group_rank(self) -> u8 {
        match self {
            Self::PdfDirect => 0,
            Self::HtmlFulltext => 1,
            Self::LandingPage => 2,
            Self::DoiResolver => 3,
            Self::Unknown => 4,
        }
    }
}

/// One discovered URL for a publication, annotated with where it came from
/// and how promising it looks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCandidate {
    pub url: String,
    pub source: String,
    /// Source base priority; lower is better.
    pub priority: i64,
    pub url_type: UrlType,
    pub confidence: f64,
    pub requires_auth: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl UrlCandidate {
    pub fn new(url: impl Into<String>, source: &str, priority: i64) -> Self {
        Self {
            url: url.into(),
            source: source.to_string(),
            priority,
            url_type: UrlType::Unknown,
            confidence: 0.5,
            requires_auth: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn effective_priority(&self) -> i64 {
        self.priority + self.url_type.priority_adjustment()
    }
}

/// Sort candidates into attempt order: url-type groups first, effective
/// priority within a group, original discovery order as the final tie-break.
pub fn sort_candidates(candidates: &mut [UrlCandidate]) {
    // Stable sort keeps earliest-seen first among equals.
    candidates.sort_by_key(|c| (c.url_type.group_rank(), c.effective_priority()));
}
