//! NCBI E-utilities client covering GEO (`db=gds`) and PubMed
//! (`db=pubmed`): `esearch`, `esummary`, and `elink` citation links.
//!
//! The esummary payload keys documents by UID, so those bodies are walked as
//! JSON values rather than fixed structs.

use std::borrow::Cow;

use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::entities::{GeoDataset, Publication};
use crate::error::OracleError;
use crate::sources::rate_limit;

const NCBI_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const NCBI_API: &str = "ncbi";
const NCBI_BASE_ENV: &str = "OMICS_ORACLE_NCBI_BASE";
const NCBI_TOOL: &str = "omics-oracle";

const DEFAULT_RPS: f64 = 3.0;
const KEYED_RPS: f64 = 10.0;

#[derive(Clone)]
pub struct NcbiClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsearchEnvelope {
    esearchresult: EsearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ElinkEnvelope {
    #[serde(default)]
    linksets: Vec<Linkset>,
}

#[derive(Debug, Deserialize)]
struct Linkset {
    #[serde(default)]
    linksetdbs: Vec<LinksetDb>,
}

#[derive(Debug, Deserialize)]
struct LinksetDb {
    #[serde(default)]
    linkname: String,
    #[serde(default)]
    links: Vec<Value>,
}

impl NcbiClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(NCBI_API);
        let api_key = source.api_key.clone();
        let default_rps = if api_key.is_some() { KEYED_RPS } else { DEFAULT_RPS };
        rate_limit::configure(NCBI_API, source.rate_limit_rps.unwrap_or(default_rps));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(NCBI_BASE, NCBI_BASE_ENV),
            api_key,
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(NCBI_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            api_key: None,
        })
    }

    fn request(&self, path: &str) -> reqwest_middleware::RequestBuilder {
        let url = crate::sources::join_endpoint(self.base.as_ref(), path);
        let mut req = self
            .client
            .get(url)
            .query(&[("retmode", "json"), ("tool", NCBI_TOOL)]);
        if let Some(key) = self.api_key.as_deref() {
            req = req.query(&[("api_key", key)]);
        }
        req
    }

    /// `esearch.fcgi`: UIDs matching a term in one NCBI database.
    pub async fn esearch(
        &self,
        db: &str,
        term: &str,
        retmax: usize,
    ) -> Result<Vec<String>, OracleError> {
        rate_limit::acquire(NCBI_API).await;
        let req = self.request("esearch.fcgi").query(&[
            ("db", db),
            ("term", term),
            ("retmax", &retmax.to_string()),
        ]);
        let envelope: EsearchEnvelope =
            crate::sources::get_json(NCBI_API, "esearch", term, req).await?;
        Ok(envelope.esearchresult.idlist)
    }

    /// `esummary.fcgi`: the raw per-UID document map.
    pub async fn esummary(&self, db: &str, uids: &[String]) -> Result<Vec<Value>, OracleError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        rate_limit::acquire(NCBI_API).await;
        let id_list = uids.join(",");
        let req = self
            .request("esummary.fcgi")
            .query(&[("db", db), ("id", &id_list)]);
        let body: Value = crate::sources::get_json(NCBI_API, "esummary", &id_list, req).await?;

        let result = body
            .get("result")
            .and_then(Value::as_object)
            .ok_or_else(|| OracleError::malformed(NCBI_API, "esummary response missing result"))?;
        let order: Vec<String> = result
            .get("uids")
            .and_then(Value::as_array)
            .map(|uids| {
                uids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(order
            .iter()
            .filter_map(|uid| result.get(uid).cloned())
            .collect())
    }

    /// `elink.fcgi` with `pubmed_pubmed_citedin`: PMIDs of papers citing the
    /// given one.
    pub async fn cited_in(&self, pmid: &str) -> Result<Vec<String>, OracleError> {
        rate_limit::acquire(NCBI_API).await;
        let req = self.request("elink.fcgi").query(&[
            ("dbfrom", "pubmed"),
            ("db", "pubmed"),
            ("linkname", "pubmed_pubmed_citedin"),
            ("id", pmid),
        ]);
        let envelope: ElinkEnvelope =
            crate::sources::get_json(NCBI_API, "citations of PMID", pmid, req).await?;

        let mut out = Vec::new();
        for linkset in envelope.linksets {
            for db in linkset.linksetdbs {
                if db.linkname != "pubmed_pubmed_citedin" {
                    continue;
                }
                for link in db.links {
                    match link {
                        Value::String(s) => out.push(s),
                        Value::Number(n) => out.push(n.to_string()),
                        // elink can nest {"id": "..."} objects on some mirrors.
                        Value::Object(map) => {
                            if let Some(id) = map.get("id").and_then(Value::as_str) {
                                out.push(id.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(out)
    }

    /// One GEO series by accession, via `esearch [ACCN]` then `esummary`.
    pub async fn fetch_geo_dataset(&self, geo_id: &str) -> Result<GeoDataset, OracleError> {
        let uids = self.esearch("gds", &format!("{geo_id}[ACCN]"), 5).await?;
        if uids.is_empty() {
            return Err(OracleError::not_found("GEO dataset", geo_id));
        }
        let docs = self.esummary("gds", &uids).await?;
        docs.iter()
            .filter_map(geo_dataset_from_summary)
            .find(|d| d.geo_id.eq_ignore_ascii_case(geo_id))
            .ok_or_else(|| OracleError::not_found("GEO dataset", geo_id))
    }

    /// Keyword search over GEO series.
    pub async fn search_geo(&self, term: &str, retmax: usize) -> Result<Vec<GeoDataset>, OracleError> {
        let scoped = format!("({term}) AND gse[ETYP]");
        let uids = self.esearch("gds", &scoped, retmax).await?;
        let docs = self.esummary("gds", &uids).await?;
        Ok(docs.iter().filter_map(geo_dataset_from_summary).collect())
    }

    /// PubMed search returning summary-level publications.
    pub async fn search_pubmed(
        &self,
        term: &str,
        retmax: usize,
    ) -> Result<Vec<Publication>, OracleError> {
        let pmids = self.esearch("pubmed", term, retmax).await?;
        self.fetch_pubmed_summaries(&pmids).await
    }

    pub async fn fetch_pubmed_summaries(
        &self,
        pmids: &[String],
    ) -> Result<Vec<Publication>, OracleError> {
        let docs = self.esummary("pubmed", pmids).await?;
        Ok(docs
            .iter()
            .map(crate::transform::publication::from_pubmed_summary)
            .filter(|p| !p.is_empty())
            .collect())
    }
}

/// GEO `esummary` document → dataset record. Returns `None` when the
/// document lacks an accession.
pub fn geo_dataset_from_summary(doc: &Value) -> Option<GeoDataset> {
    let accession = doc
        .get("accession")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())?;

    let str_field = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let sample_count = doc
        .get("n_samples")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));

    let original_pmids = doc
        .get("pubmedids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(GeoDataset {
        geo_id: accession.to_ascii_uppercase(),
        title: str_field("title"),
        summary: str_field("summary"),
        organism: str_field("taxon"),
        platform: str_field("gpl").map(|gpl| {
            if gpl.starts_with("GPL") {
                gpl
            } else {
                format!("GPL{gpl}")
            }
        }),
        sample_count,
        original_pmids,
        metadata: doc.clone(),
    })
}
