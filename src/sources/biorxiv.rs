//! bioRxiv / medRxiv preprint lookup. One client serves both servers; the
//! details API reports the latest version, from which the content PDF URL
//! is derived.

use std::borrow::Cow;

use serde::Deserialize;

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const BIORXIV_BASE: &str = "https://api.biorxiv.org";
const BIORXIV_API: &str = "biorxiv";
const BIORXIV_BASE_ENV: &str = "OMICS_ORACLE_BIORXIV_BASE";
const BIORXIV_CONTENT: &str = "https://www.biorxiv.org";
const MEDRXIV_CONTENT: &str = "https://www.medrxiv.org";
const DEFAULT_RPS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprintServer {
    Biorxiv,
    Medrxiv,
}

impl PreprintServer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Biorxiv => "biorxiv",
            Self::Medrxiv => "medrxiv",
        }
    }

    fn content_base(self) -> &'static str {
        match self {
            Self::Biorxiv => BIORXIV_CONTENT,
            Self::Medrxiv => MEDRXIV_CONTENT,
        }
    }
}

#[derive(Clone)]
pub struct BiorxivClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    collection: Vec<PreprintDetail>,
}

#[derive(Debug, Default, Deserialize)]
struct PreprintDetail {
    doi: Option<String>,
    version: Option<String>,
}

impl BiorxivClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(BIORXIV_API);
        rate_limit::configure(BIORXIV_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(BIORXIV_BASE, BIORXIV_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(BIORXIV_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    /// PDF URL for a preprint DOI, trying bioRxiv then medRxiv. `None` when
    /// neither server knows the DOI.
    pub async fn lookup(&self, doi: &str) -> Result<Option<String>, OracleError> {
        for server in [PreprintServer::Biorxiv, PreprintServer::Medrxiv] {
            match self.lookup_on(server, doi).await {
                Ok(Some(url)) => return Ok(Some(url)),
                Ok(None) => {}
                Err(err) if err.category() == "not_found" => {}
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn lookup_on(
        &self,
        server: PreprintServer,
        doi: &str,
    ) -> Result<Option<String>, OracleError> {
        rate_limit::acquire(BIORXIV_API).await;
        let path = format!("details/{}/{doi}", server.as_str());
        let url = crate::sources::join_endpoint(self.base.as_ref(), &path);
        let req = self.client.get(url);
        let resp: DetailsResponse = crate::sources::get_json(BIORXIV_API, "DOI", doi, req).await?;

        let Some(detail) = resp
            .collection
            .iter()
            .filter(|d| d.doi.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(doi)))
            .last()
        else {
            return Ok(None);
        };
        let version = detail.version.as_deref().unwrap_or("1");
        Ok(Some(format!(
            "{}/content/{doi}v{version}.full.pdf",
            server.content_base()
        )))
    }
}
