//! Europe PMC REST client: search, citation listing, and full-text URL
//! discovery via the `core` result type.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const EUROPEPMC_BASE: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const EUROPEPMC_API: &str = "europepmc";
const EUROPEPMC_BASE_ENV: &str = "OMICS_ORACLE_EUROPEPMC_BASE";
const DEFAULT_RPS: f64 = 5.0;

#[derive(Clone)]
pub struct EuropePmcClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EuropePmcSearchResponse {
    pub hit_count: Option<u64>,
    pub result_list: Option<EuropePmcResultList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EuropePmcResultList {
    #[serde(default)]
    pub result: Vec<EuropePmcResult>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EuropePmcResult {
    pub id: Option<String>,
    pub source: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub author_string: Option<String>,
    pub journal_title: Option<String>,
    pub pub_year: Option<String>,
    pub abstract_text: Option<String>,
    pub is_open_access: Option<String>,
    pub full_text_url_list: Option<FullTextUrlList>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextUrlList {
    #[serde(default)]
    pub full_text_url: Vec<FullTextUrl>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextUrl {
    pub availability: Option<String>,
    pub document_style: Option<String>,
    pub site: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationEnvelope {
    citation_list: Option<CitationList>,
}

#[derive(Debug, Default, Deserialize)]
struct CitationList {
    #[serde(default)]
    citation: Vec<EuropePmcResult>,
}

/// A discovered full-text link with Europe PMC's own style annotation
/// (`pdf`, `html`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullTextLink {
    pub url: String,
    pub document_style: Option<String>,
}

impl EuropePmcClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(EUROPEPMC_API);
        rate_limit::configure(EUROPEPMC_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(EUROPEPMC_BASE, EUROPEPMC_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(EUROPEPMC_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    async fn search_raw(
        &self,
        query: &str,
        result_type: &str,
        page_size: usize,
    ) -> Result<EuropePmcSearchResponse, OracleError> {
        rate_limit::acquire(EUROPEPMC_API).await;
        let url = crate::sources::join_endpoint(self.base.as_ref(), "search");
        let page_size = page_size.clamp(1, 100).to_string();
        let req = self.client.get(url).query(&[
            ("query", query),
            ("format", "json"),
            ("resultType", result_type),
            ("pageSize", page_size.as_str()),
        ]);
        crate::sources::get_json(EUROPEPMC_API, "search", query, req).await
    }

    /// Lightweight search over the whole corpus.
    pub async fn search(
        &self,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<EuropePmcResult>, OracleError> {
        let resp = self.search_raw(query, "lite", page_size).await?;
        Ok(resp.result_list.map(|l| l.result).unwrap_or_default())
    }

    /// Papers citing a PMID, via `/MED/{pmid}/citations`.
    pub async fn get_citations(
        &self,
        pmid: &str,
        page_size: usize,
    ) -> Result<Vec<EuropePmcResult>, OracleError> {
        rate_limit::acquire(EUROPEPMC_API).await;
        let path = format!("MED/{pmid}/citations");
        let url = crate::sources::join_endpoint(self.base.as_ref(), &path);
        let page_size = page_size.clamp(1, 100).to_string();
        let req = self.client.get(url).query(&[
            ("format", "json"),
            ("page", "1"),
            ("pageSize", page_size.as_str()),
        ]);
        let envelope: CitationEnvelope =
            crate::sources::get_json(EUROPEPMC_API, "citations of PMID", pmid, req).await?;
        Ok(envelope
            .citation_list
            .map(|l| l.citation)
            .unwrap_or_default())
    }

    /// Full-text URLs Europe PMC lists for one article, looked up by any
    /// external id (PMID, PMCID, or DOI).
    pub async fn get_fulltext_urls(&self, ext_id: &str) -> Result<Vec<FullTextLink>, OracleError> {
        let query = format!("EXT_ID:\"{ext_id}\" OR PMCID:\"{ext_id}\" OR DOI:\"{ext_id}\"");
        let resp = self.search_raw(&query, "core", 5).await?;
        let results = resp.result_list.map(|l| l.result).unwrap_or_default();
        let mut out = Vec::new();
        for result in results {
            let Some(list) = result.full_text_url_list else {
                continue;
            };
            for item in list.full_text_url {
                if let Some(url) = item.url.filter(|u| !u.trim().is_empty()) {
                    out.push(FullTextLink {
                        url,
                        document_style: item.document_style,
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_unwraps_result_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "GSE12345"))
            .and(query_param("resultType", "lite"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hitCount": 1,
                "resultList": {"result": [{
                    "id": "37081976",
                    "source": "MED",
                    "pmid": "37081976",
                    "doi": "10.1093/nar/gkad000",
                    "title": "A paper mentioning GSE12345",
                    "authorString": "Doe J, Roe R.",
                    "journalTitle": "Nucleic Acids Res",
                    "pubYear": "2023"
                }]}
            })))
            .mount(&server)
            .await;

        let client = EuropePmcClient::new_for_test(server.uri()).unwrap();
        let results = client.search("GSE12345", 25).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pmid.as_deref(), Some("37081976"));
        assert_eq!(results[0].pub_year.as_deref(), Some("2023"));
    }

    #[tokio::test]
    async fn citations_route_includes_source_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/MED/19753302/citations"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "citationList": {"citation": [
                    {"id": "30000001", "source": "MED", "title": "Citer", "pubYear": "2019"}
                ]}
            })))
            .mount(&server)
            .await;

        let client = EuropePmcClient::new_for_test(server.uri()).unwrap();
        let citations = client.get_citations("19753302", 50).await.unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].id.as_deref(), Some("30000001"));
    }

    #[tokio::test]
    async fn fulltext_urls_flatten_the_core_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("resultType", "core"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hitCount": 1,
                "resultList": {"result": [{
                    "id": "37081976",
                    "fullTextUrlList": {"fullTextUrl": [
                        {"availability": "Open access", "documentStyle": "pdf",
                         "url": "https://europepmc.org/articles/PMC10000001?pdf=render"},
                        {"availability": "Open access", "documentStyle": "html",
                         "url": "https://europepmc.org/articles/PMC10000001"},
                        {"documentStyle": "pdf", "url": ""}
                    ]}
                }]}
            })))
            .mount(&server)
            .await;

        let client = EuropePmcClient::new_for_test(server.uri()).unwrap();
        let links = client.get_fulltext_urls("37081976").await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].document_style.as_deref(), Some("pdf"));
        assert!(links[0].url.ends_with("pdf=render"));
    }

    #[tokio::test]
    async fn empty_result_list_yields_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"hitCount": 0})),
            )
            .mount(&server)
            .await;

        let client = EuropePmcClient::new_for_test(server.uri()).unwrap();
        assert!(client.search("nothing", 10).await.unwrap().is_empty());
    }
}
