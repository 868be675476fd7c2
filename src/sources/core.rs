//! CORE aggregator search: repository-hosted PDFs by DOI or title.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const CORE_BASE: &str = "https://api.core.ac.uk/v3";
const CORE_API: &str = "core";
const CORE_BASE_ENV: &str = "OMICS_ORACLE_CORE_BASE";
const DEFAULT_RPS: f64 = 2.0;

#[derive(Clone)]
pub struct CoreClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CoreSearchResponse {
    #[serde(default)]
    results: Vec<CoreWork>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreWork {
    pub id: Option<serde_json::Value>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub download_url: Option<String>,
    #[serde(default)]
    pub links: Vec<CoreLink>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreLink {
    #[serde(rename = "type")]
    pub link_type: Option<String>,
    pub url: Option<String>,
}

impl CoreWork {
    /// Download URL, falling back to any `download` typed link.
    pub fn pdf_url(&self) -> Option<String> {
        self.download_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| {
                self.links.iter().find_map(|l| {
                    (l.link_type.as_deref() == Some("download"))
                        .then(|| l.url.clone())
                        .flatten()
                })
            })
    }
}

impl CoreClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(CORE_API);
        rate_limit::configure(CORE_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(CORE_BASE, CORE_BASE_ENV),
            api_key: source.api_key,
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String, api_key: Option<String>) -> Result<Self, OracleError> {
        rate_limit::configure(CORE_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            api_key,
        })
    }

    /// Anonymous CORE access is heavily throttled, so the collector skips
    /// this source when no key is configured.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn search_by_doi(&self, doi: &str) -> Result<Vec<CoreWork>, OracleError> {
        self.search(&format!("doi:\"{doi}\"")).await
    }

    pub async fn search_by_title(&self, title: &str) -> Result<Vec<CoreWork>, OracleError> {
        self.search(&format!("title:\"{}\"", title.replace('"', ""))).await
    }

    async fn search(&self, query: &str) -> Result<Vec<CoreWork>, OracleError> {
        rate_limit::acquire(CORE_API).await;
        let url = crate::sources::join_endpoint(self.base.as_ref(), "search/works");
        let mut req = self.client.get(url).query(&[("q", query), ("limit", "5")]);
        if let Some(key) = self.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        let resp: CoreSearchResponse =
            crate::sources::get_json(CORE_API, "works search", query, req).await?;
        Ok(resp.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_by_doi_sends_bearer_and_parses_download_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/works"))
            .and(query_param("q", "doi:\"10.1371/journal.pone.0123456\""))
            .and(header("authorization", "Bearer core-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": 12345,
                    "doi": "10.1371/journal.pone.0123456",
                    "title": "X",
                    "downloadUrl": "https://core.ac.uk/download/12345.pdf",
                    "links": [{"type": "display", "url": "https://core.ac.uk/works/12345"}]
                }]
            })))
            .mount(&server)
            .await;

        let client = CoreClient::new_for_test(server.uri(), Some("core-key".into())).unwrap();
        let works = client
            .search_by_doi("10.1371/journal.pone.0123456")
            .await
            .unwrap();
        assert_eq!(works.len(), 1);
        assert_eq!(
            works[0].pdf_url().as_deref(),
            Some("https://core.ac.uk/download/12345.pdf")
        );
    }

    #[test]
    fn pdf_url_falls_back_to_download_link() {
        let work = CoreWork {
            download_url: Some("".into()),
            links: vec![
                CoreLink {
                    link_type: Some("display".into()),
                    url: Some("https://core.ac.uk/works/1".into()),
                },
                CoreLink {
                    link_type: Some("download".into()),
                    url: Some("https://core.ac.uk/download/1.pdf".into()),
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            work.pdf_url().as_deref(),
            Some("https://core.ac.uk/download/1.pdf")
        );
    }

    #[test]
    fn unkeyed_client_reports_unconfigured() {
        let client = CoreClient::new_for_test("http://127.0.0.1:1".into(), None).unwrap();
        assert!(!client.is_configured());
    }
}
