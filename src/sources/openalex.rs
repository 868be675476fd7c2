//! OpenAlex works API: lookup by PMID/DOI, citation listing via the
//! `cites:` filter, and keyword search.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const OPENALEX_BASE: &str = "https://api.openalex.org";
const OPENALEX_API: &str = "openalex";
const OPENALEX_BASE_ENV: &str = "OMICS_ORACLE_OPENALEX_BASE";
const MAILTO: &str = "contact@omics-oracle.org";
const DEFAULT_RPS: f64 = 10.0;

#[derive(Clone)]
pub struct OpenAlexClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkList {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexWork {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub ids: OpenAlexIds,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
    pub primary_location: Option<OpenAlexLocation>,
    pub best_oa_location: Option<OpenAlexLocation>,
    pub open_access: Option<OpenAlexOpenAccess>,
    pub relevance_score: Option<f64>,
    pub cited_by_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexIds {
    pub openalex: Option<String>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexAuthorship {
    pub author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexAuthor {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexLocation {
    pub pdf_url: Option<String>,
    pub landing_page_url: Option<String>,
    pub source: Option<OpenAlexVenue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexVenue {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAlexOpenAccess {
    #[serde(default)]
    pub is_oa: bool,
    pub oa_url: Option<String>,
}

impl OpenAlexWork {
    /// The bare `W...` id, stripped of the URL prefix.
    pub fn short_id(&self) -> Option<String> {
        self.id
            .as_deref()
            .or(self.ids.openalex.as_deref())
            .map(|id| id.rsplit('/').next().unwrap_or(id).to_string())
    }

    /// Best PDF URL OpenAlex knows about, preferring the OA location.
    pub fn pdf_url(&self) -> Option<String> {
        self.best_oa_location
            .as_ref()
            .and_then(|l| l.pdf_url.clone())
            .or_else(|| {
                self.primary_location
                    .as_ref()
                    .and_then(|l| l.pdf_url.clone())
            })
            .or_else(|| self.open_access.as_ref().and_then(|oa| oa.oa_url.clone()))
    }
}

impl OpenAlexClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(OPENALEX_API);
        rate_limit::configure(OPENALEX_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(OPENALEX_BASE, OPENALEX_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(OPENALEX_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    fn request(&self, path: &str) -> reqwest_middleware::RequestBuilder {
        let url = crate::sources::join_endpoint(self.base.as_ref(), path);
        self.client.get(url).query(&[("mailto", MAILTO)])
    }

    /// One work by any OpenAlex-resolvable id (`pmid:...`, `doi:...`, `W...`).
    pub async fn get_work(&self, id: &str) -> Result<OpenAlexWork, OracleError> {
        rate_limit::acquire(OPENALEX_API).await;
        let req = self.request(&format!("works/{id}"));
        crate::sources::get_json(OPENALEX_API, "work", id, req).await
    }

    pub async fn get_work_by_pmid(&self, pmid: &str) -> Result<OpenAlexWork, OracleError> {
        self.get_work(&format!("pmid:{pmid}")).await
    }

    pub async fn get_work_by_doi(&self, doi: &str) -> Result<OpenAlexWork, OracleError> {
        self.get_work(&format!("doi:{doi}")).await
    }

    /// Works citing the given work id.
    pub async fn get_citations(
        &self,
        work_id: &str,
        per_page: usize,
    ) -> Result<Vec<OpenAlexWork>, OracleError> {
        rate_limit::acquire(OPENALEX_API).await;
        let filter = format!("cites:{work_id}");
        let per_page = per_page.clamp(1, 200).to_string();
        let req = self
            .request("works")
            .query(&[("filter", filter.as_str()), ("per-page", per_page.as_str())]);
        let list: WorkList =
            crate::sources::get_json(OPENALEX_API, "citations of work", work_id, req).await?;
        Ok(list.results)
    }

    pub async fn search_works(
        &self,
        query: &str,
        per_page: usize,
    ) -> Result<Vec<OpenAlexWork>, OracleError> {
        rate_limit::acquire(OPENALEX_API).await;
        let per_page = per_page.clamp(1, 200).to_string();
        let req = self
            .request("works")
            .query(&[("search", query), ("per-page", per_page.as_str())]);
        let list: WorkList = crate::sources::get_json(OPENALEX_API, "works search", query, req).await?;
        Ok(list.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn work_body(short_id: &str, doi: &str, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("https://openalex.org/{short_id}"),
            "display_name": title,
            "publication_year": 2021,
            "ids": {
                "openalex": format!("https://openalex.org/{short_id}"),
                "doi": format!("https://doi.org/{doi}")
            },
            "authorships": [
                {"author": {"display_name": "A. Researcher"}},
                {"author": {"display_name": "B. Researcher"}}
            ],
            "best_oa_location": {
                "pdf_url": "https://repo.example.org/paper.pdf",
                "source": {"display_name": "Example Repo"}
            },
            "open_access": {"is_oa": true, "oa_url": "https://repo.example.org/paper"},
            "cited_by_count": 12
        })
    }

    #[tokio::test]
    async fn get_work_by_pmid_hits_the_id_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/pmid:19753302"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(work_body("W2100837269", "10.1038/nature08460", "Original")),
            )
            .mount(&server)
            .await;

        let client = OpenAlexClient::new_for_test(server.uri()).unwrap();
        let work = client.get_work_by_pmid("19753302").await.unwrap();
        assert_eq!(work.short_id().as_deref(), Some("W2100837269"));
        assert_eq!(
            work.pdf_url().as_deref(),
            Some("https://repo.example.org/paper.pdf")
        );
    }

    #[tokio::test]
    async fn get_citations_uses_the_cites_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("filter", "cites:W2100837269"))
            .and(query_param("per-page", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    work_body("W1", "10.1371/journal.pone.0000001", "Citing one"),
                    work_body("W2", "10.1371/journal.pone.0000002", "Citing two")
                ]
            })))
            .mount(&server)
            .await;

        let client = OpenAlexClient::new_for_test(server.uri()).unwrap();
        let works = client.get_citations("W2100837269", 50).await.unwrap();
        assert_eq!(works.len(), 2);
        assert_eq!(works[0].display_name.as_deref(), Some("Citing one"));
    }

    #[tokio::test]
    async fn missing_work_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/pmid:1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
            .mount(&server)
            .await;

        let client = OpenAlexClient::new_for_test(server.uri()).unwrap();
        let err = client.get_work_by_pmid("1").await.unwrap_err();
        assert_eq!(err.category(), "not_found");
    }
}
