use std::fmt;

use sha2::{Digest, Sha256};

use crate::entities::Publication;
use crate::error::OracleError;

/// Identifier kinds in fallback order: the first populated field of a
/// publication wins. `Hash` is the total fallback for papers carrying no
/// standard identifier at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    Pmid,
    Doi,
    Pmc,
    Arxiv,
    Hash,
}

impl IdType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pmid => "pmid",
            Self::Doi => "doi",
            Self::Pmc => "pmc",
            Self::Arxiv => "arxiv",
            Self::Hash => "hash",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pmid" => Some(Self::Pmid),
            "doi" => Some(Self::Doi),
            "pmc" => Some(Self::Pmc),
            "arxiv" => Some(Self::Arxiv),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A publication's canonical identity, `{type}:{value}`. Derived, never
/// stored independently; equality on this value is publication identity
/// everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UniversalId {
    pub id_type: IdType,
    pub value: String,
}

impl fmt::Display for UniversalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id_type, self.value)
    }
}

impl UniversalId {
    pub fn new(id_type: IdType, value: impl Into<String>) -> Self {
        Self {
            id_type,
            value: value.into(),
        }
    }

    /// Parse a stored `{type}:{value}` key. DOI values keep their slashes,
    /// so only the first colon separates type from value.
    pub fn parse_key(key: &str) -> Result<Self, OracleError> {
        let (type_part, value) = key
            .split_once(':')
            .ok_or_else(|| OracleError::InvalidArgument(format!("Malformed key \"{key}\"")))?;
        let id_type = IdType::parse(type_part).ok_or_else(|| {
            OracleError::InvalidArgument(format!("Unknown identifier type \"{type_part}\""))
        })?;
        if value.is_empty() {
            return Err(OracleError::InvalidArgument(format!(
                "Empty identifier value in \"{key}\""
            )));
        }
        Ok(Self::new(id_type, value))
    }
}

fn clean_pmid(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty() && v.chars().all(|c| c.is_ascii_digit())).then(|| v.to_string())
}

fn clean_doi(value: &str) -> Option<String> {
    let mut v = value.trim();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi:", "DOI:"] {
        if let Some(rest) = v.strip_prefix(prefix) {
            v = rest;
        }
    }
    let v = v.trim().to_ascii_lowercase();
    (v.starts_with("10.") && v.contains('/')).then_some(v)
}

fn clean_pmc(value: &str) -> Option<String> {
    let v = value.trim();
    let digits = v
        .strip_prefix("PMC")
        .or_else(|| v.strip_prefix("pmc"))
        .unwrap_or(v);
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("PMC{digits}"))
}

fn clean_arxiv(value: &str) -> Option<String> {
    let v = value.trim();
    let v = v
        .strip_prefix("arXiv:")
        .or_else(|| v.strip_prefix("arxiv:"))
        .unwrap_or(v)
        .trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Lowercase, keep alphanumerics, collapse everything else to single
/// spaces. Two renderings of the same title hash identically.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_space = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

fn title_hash(title: &str) -> String {
    let digest = Sha256::digest(normalize_title(title).as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Walk the fallback list PMID → DOI → PMC → arXiv → title hash. Fails only
/// for a record with no identifiers and no title.
pub fn canonical_key(publication: &Publication) -> Result<UniversalId, OracleError> {
    if let Some(pmid) = publication.pmid.as_deref().and_then(clean_pmid) {
        return Ok(UniversalId::new(IdType::Pmid, pmid));
    }
    if let Some(doi) = publication.doi.as_deref().and_then(clean_doi) {
        return Ok(UniversalId::new(IdType::Doi, doi));
    }
    if let Some(pmc) = publication.pmc_id.as_deref().and_then(clean_pmc) {
        return Ok(UniversalId::new(IdType::Pmc, pmc));
    }
    if let Some(arxiv) = publication.arxiv_id.as_deref().and_then(clean_arxiv) {
        return Ok(UniversalId::new(IdType::Arxiv, arxiv));
    }
    if !publication.title.trim().is_empty() {
        return Ok(UniversalId::new(IdType::Hash, title_hash(&publication.title)));
    }
    Err(OracleError::InvalidArgument(
        "Publication has no identifiers and no title".into(),
    ))
}

/// `{type}:{value}` string for database keys. DOI slashes are preserved.
pub fn key_string(publication: &Publication) -> Result<String, OracleError> {
    Ok(canonical_key(publication)?.to_string())
}

const MAX_SANITIZED_LEN: usize = 100;

/// Replace `/`, `:`, whitespace, and anything outside `[A-Za-z0-9._-]` with
/// `_`; cap at 100 characters.
pub fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_SANITIZED_LEN));
    for ch in value.chars() {
        if out.len() >= MAX_SANITIZED_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

/// Slash-preserving encoding for identifier values that legitimately
/// contain `/` (DOI suffixes are free-form; old arXiv ids are
/// `archive/NNNNNNN`). Literal underscores escape to `__` before every
/// slash collapses to `_`, so [`decode_slashes`] recovers each one — not
/// just the registrant boundary.
fn encode_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '_' => out.push_str("__"),
            '/' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

fn decode_slashes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '_' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'_') {
            chars.next();
            out.push('_');
        } else {
            out.push('/');
        }
    }
    out
}

/// Filesystem-safe `{type}_{sanitized_value}.pdf`.
pub fn filename(publication: &Publication) -> Result<String, OracleError> {
    Ok(filename_for(&canonical_key(publication)?))
}

pub fn filename_for(id: &UniversalId) -> String {
    let value = match id.id_type {
        IdType::Doi | IdType::Arxiv => sanitize_value(&encode_slashes(&id.value)),
        _ => sanitize_value(&id.value),
    };
    format!("{}_{value}.pdf", id.id_type)
}

/// Inverse of [`filename`] for recognized types: DOI and arXiv values run
/// back through the slash decoding, so every `/` the encoding collapsed
/// comes back and the canonical key survives the disk round-trip.
pub fn parse_filename(name: &str) -> Result<UniversalId, OracleError> {
    let stem = name.strip_suffix(".pdf").unwrap_or(name);
    let (type_part, value) = stem.split_once('_').ok_or_else(|| {
        OracleError::InvalidArgument(format!("Unrecognized artifact filename \"{name}\""))
    })?;
    let id_type = IdType::parse(type_part).ok_or_else(|| {
        OracleError::InvalidArgument(format!("Unknown identifier type in filename \"{name}\""))
    })?;
    if value.is_empty() {
        return Err(OracleError::InvalidArgument(format!(
            "Empty identifier value in filename \"{name}\""
        )));
    }

    let value = match id_type {
        IdType::Doi | IdType::Arxiv => decode_slashes(value),
        _ => value.to_string(),
    };
    Ok(UniversalId::new(id_type, value))
}

/// Human-readable form, e.g. `DOI 10.1234/abc`.
pub fn display_name(publication: &Publication) -> Result<String, OracleError> {
    let id = canonical_key(publication)?;
    let label = match id.id_type {
        IdType::Pmid => "PMID",
        IdType::Doi => "DOI",
        IdType::Pmc => "PMC",
        IdType::Arxiv => "arXiv",
        IdType::Hash => "Hash",
    };
    Ok(format!("{label} {}", id.value))
}
