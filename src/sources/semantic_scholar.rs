//! Semantic Scholar graph API: paper lookup and citation listing.
//!
//! Ids are passed in the `PMID:`/`DOI:`/`ARXIV:` prefixed forms the graph
//! API resolves natively. An API key raises the budget from 1 to 5 rps.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const S2_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const S2_API: &str = "semantic_scholar";
const S2_BASE_ENV: &str = "OMICS_ORACLE_S2_BASE";
const API_KEY_HEADER: &str = "x-api-key";

const PAPER_FIELDS: &str = "paperId,externalIds,title,abstract,year,authors,venue,citationCount,isOpenAccess,openAccessPdf";

const DEFAULT_RPS: f64 = 1.0;
const KEYED_RPS: f64 = 5.0;

#[derive(Clone)]
pub struct SemanticScholarClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S2Paper {
    pub paper_id: Option<String>,
    #[serde(default)]
    pub external_ids: S2ExternalIds,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<S2Author>,
    pub venue: Option<String>,
    pub citation_count: Option<u64>,
    #[serde(default)]
    pub is_open_access: bool,
    pub open_access_pdf: Option<S2OpenAccessPdf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S2ExternalIds {
    #[serde(rename = "PubMed")]
    pub pubmed: Option<serde_json::Value>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    pub pub_med_central: Option<serde_json::Value>,
    #[serde(rename = "ArXiv")]
    pub arxiv: Option<String>,
}

impl S2ExternalIds {
    /// PubMed/PMC ids arrive as strings or numbers depending on the record.
    pub fn pmid(&self) -> Option<String> {
        id_value(self.pubmed.as_ref())
    }

    pub fn pmcid(&self) -> Option<String> {
        id_value(self.pub_med_central.as_ref())
    }
}

fn id_value(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S2Author {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct S2OpenAccessPdf {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CitationPage {
    #[serde(default)]
    data: Vec<CitationEdge>,
}

#[derive(Debug, Deserialize)]
struct CitationEdge {
    #[serde(rename = "citingPaper")]
    citing_paper: Option<S2Paper>,
}

impl SemanticScholarClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(S2_API);
        let api_key = source.api_key.clone();
        let default_rps = if api_key.is_some() { KEYED_RPS } else { DEFAULT_RPS };
        rate_limit::configure(S2_API, source.rate_limit_rps.unwrap_or(default_rps));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(S2_BASE, S2_BASE_ENV),
            api_key,
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(S2_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            api_key: None,
        })
    }

    fn request(&self, path: &str) -> reqwest_middleware::RequestBuilder {
        let url = crate::sources::join_endpoint(self.base.as_ref(), path);
        let mut req = self.client.get(url);
        if let Some(key) = self.api_key.as_deref() {
            req = req.header(API_KEY_HEADER, key);
        }
        req
    }

    /// One paper by a prefixed id (`PMID:19753302`, `DOI:10.1/x`).
    pub async fn get_paper(&self, id: &str) -> Result<S2Paper, OracleError> {
        rate_limit::acquire(S2_API).await;
        let req = self
            .request(&format!("paper/{id}"))
            .query(&[("fields", PAPER_FIELDS)]);
        crate::sources::get_json(S2_API, "paper", id, req).await
    }

    /// Papers citing the given one.
    pub async fn get_citations(&self, id: &str, limit: usize) -> Result<Vec<S2Paper>, OracleError> {
        rate_limit::acquire(S2_API).await;
        let limit = limit.clamp(1, 1000).to_string();
        let req = self
            .request(&format!("paper/{id}/citations"))
            .query(&[("fields", PAPER_FIELDS), ("limit", limit.as_str())]);
        let page: CitationPage =
            crate::sources::get_json(S2_API, "citations of paper", id, req).await?;
        Ok(page.data.into_iter().filter_map(|e| e.citing_paper).collect())
    }
}
