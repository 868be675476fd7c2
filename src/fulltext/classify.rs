//! URL classification. Rules apply in order: PDF-serving domain table, PDF
//! URL shapes, publisher landing pages, DOI resolvers, then unknown.

use std::sync::OnceLock;

use regex::Regex;

use crate::fulltext::UrlType;

/// Host paths that serve raw PDFs regardless of the URL tail.
const PDF_DOMAINS: &[&str] = &[
    "arxiv.org/pdf",
    "core.ac.uk/download",
    "citeseerx.ist.psu.edu/document",
];

/// Publisher hosts whose article URLs are landing pages unless a PDF shape
/// matches first.
const LANDING_DOMAINS: &[&str] = &[
    "nature.com",
    "sciencedirect.com",
    "link.springer.com",
    "onlinelibrary.wiley.com",
    "journals.plos.org",
    "academic.oup.com",
    "cell.com",
    "science.org",
    "frontiersin.org",
    "mdpi.com",
    "tandfonline.com",
];

fn pdf_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \.pdf($|\?) |          # explicit extension
            /pdf(/|$)   |          # PMC-style /pdf/ segments
            pdf=render  |          # Europe PMC render endpoint
            type=printable |       # PLOS printable form
            \.full\.pdf",
        )
        .expect("pdf shape regex")
    })
}

fn html_fulltext_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // PMC reader views and publisher "full" article renderings.
        Regex::new(r"(?i)(/articles?/PMC\d+/?$|/fulltext$|\.full$|/full/)").expect("html regex")
    })
}

fn host_of(url: &str) -> &str {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped.split(['/', '?']).next().unwrap_or(stripped)
}

pub fn classify_url(url: &str) -> UrlType {
    let url = url.trim();
    if url.is_empty() {
        return UrlType::Unknown;
    }
    let lower = url.to_ascii_lowercase();
    let host = host_of(&lower);

    if PDF_DOMAINS.iter().any(|d| lower.contains(d)) {
        return UrlType::PdfDirect;
    }
    if pdf_shape().is_match(&lower) {
        return UrlType::PdfDirect;
    }
    if html_fulltext_shape().is_match(&lower) {
        return UrlType::HtmlFulltext;
    }
    if host == "doi.org" || host == "dx.doi.org" || host.ends_with(".doi.org") {
        return UrlType::DoiResolver;
    }
    if LANDING_DOMAINS.iter().any(|d| host.ends_with(d)) {
        return UrlType::LandingPage;
    }
    UrlType::Unknown
}

/// Classify a candidate in place. A collector-provided hint (e.g. Europe
/// PMC's own document style) fills in when the URL shape is inconclusive.
pub fn classify_candidate(candidate: &mut crate::fulltext::UrlCandidate, hint: Option<UrlType>) {
    let classified = classify_url(&candidate.url);
    candidate.url_type = match (classified, hint) {
        (UrlType::Unknown, Some(hinted)) => hinted,
        (found, _) => found,
    };
    candidate.confidence = match candidate.url_type {
        UrlType::PdfDirect => 0.9,
        UrlType::HtmlFulltext => 0.6,
        UrlType::LandingPage => 0.4,
        UrlType::DoiResolver => 0.3,
        UrlType::Unknown => 0.2,
    };
}
