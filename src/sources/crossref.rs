//! Crossref works lookup: publisher landing URL and registry metadata for a
//! DOI. Crossref rarely serves PDFs; its URLs enter the waterfall as
//! landing-page candidates.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const CROSSREF_BASE: &str = "https://api.crossref.org";
const CROSSREF_API: &str = "crossref";
const CROSSREF_BASE_ENV: &str = "OMICS_ORACLE_CROSSREF_BASE";
const MAILTO: &str = "contact@omics-oracle.org";
const DEFAULT_RPS: f64 = 2.0;

#[derive(Clone)]
pub struct CrossrefClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefEnvelope {
    message: CrossrefWork,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrossrefWork {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(rename = "container-title", default)]
    pub container_title: Vec<String>,
    #[serde(default)]
    pub link: Vec<CrossrefLink>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrossrefLink {
    #[serde(rename = "URL")]
    pub url: Option<String>,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
}

impl CrossrefWork {
    pub fn landing_url(&self) -> Option<String> {
        self.url.clone()
    }

    /// Publisher-declared PDF link, when one is registered.
    pub fn pdf_link(&self) -> Option<String> {
        self.link.iter().find_map(|l| {
            (l.content_type.as_deref() == Some("application/pdf"))
                .then(|| l.url.clone())
                .flatten()
        })
    }
}

impl CrossrefClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(CROSSREF_API);
        rate_limit::configure(CROSSREF_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(CROSSREF_BASE, CROSSREF_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(CROSSREF_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    pub async fn lookup(&self, doi: &str) -> Result<CrossrefWork, OracleError> {
        rate_limit::acquire(CROSSREF_API).await;
        let encoded = urlencoding::encode(doi);
        let url =
            crate::sources::join_endpoint(self.base.as_ref(), &format!("works/{encoded}"));
        let req = self.client.get(url).query(&[("mailto", MAILTO)]);
        let envelope: CrossrefEnvelope =
            crate::sources::get_json(CROSSREF_API, "DOI", doi, req).await?;
        Ok(envelope.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn lookup_returns_landing_and_declared_pdf() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works/10.1038%2Fnature08460"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {
                    "DOI": "10.1038/nature08460",
                    "URL": "https://doi.org/10.1038/nature08460",
                    "title": ["An original paper"],
                    "container-title": ["Nature"],
                    "link": [
                        {"URL": "https://www.nature.com/articles/nature08460.pdf",
                         "content-type": "application/pdf"},
                        {"URL": "https://www.nature.com/articles/nature08460",
                         "content-type": "text/html"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = CrossrefClient::new_for_test(server.uri()).unwrap();
        let work = client.lookup("10.1038/nature08460").await.unwrap();
        assert_eq!(
            work.landing_url().as_deref(),
            Some("https://doi.org/10.1038/nature08460")
        );
        assert_eq!(
            work.pdf_link().as_deref(),
            Some("https://www.nature.com/articles/nature08460.pdf")
        );
    }

    #[tokio::test]
    async fn unknown_doi_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Resource not found."))
            .mount(&server)
            .await;

        let client = CrossrefClient::new_for_test(server.uri()).unwrap();
        let err = client.lookup("10.0/missing").await.unwrap_err();
        assert_eq!(err.category(), "not_found");
    }
}
