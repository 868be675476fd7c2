//! Unpaywall DOI lookup: legal open-access locations for a paper.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const UNPAYWALL_BASE: &str = "https://api.unpaywall.org/v2";
const UNPAYWALL_API: &str = "unpaywall";
const UNPAYWALL_BASE_ENV: &str = "OMICS_ORACLE_UNPAYWALL_BASE";
const DEFAULT_EMAIL: &str = "contact@omics-oracle.org";
const DEFAULT_RPS: f64 = 3.0;

#[derive(Clone)]
pub struct UnpaywallClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    email: String,
}

#[derive(Debug, Default, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct OaLocation {
    url: Option<String>,
    url_for_pdf: Option<String>,
    url_for_landing_page: Option<String>,
}

/// What Unpaywall knows about a DOI's open-access state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnpaywallLookup {
    pub is_oa: bool,
    pub pdf_url: Option<String>,
    pub landing_url: Option<String>,
}

impl UnpaywallClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(UNPAYWALL_API);
        rate_limit::configure(UNPAYWALL_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(UNPAYWALL_BASE, UNPAYWALL_BASE_ENV),
            // Unpaywall requires a contact address on every call.
            email: source.api_key.unwrap_or_else(|| DEFAULT_EMAIL.to_string()),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(UNPAYWALL_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            email: DEFAULT_EMAIL.to_string(),
        })
    }

    pub async fn lookup(&self, doi: &str) -> Result<UnpaywallLookup, OracleError> {
        rate_limit::acquire(UNPAYWALL_API).await;
        let encoded = urlencoding::encode(doi);
        let url = crate::sources::join_endpoint(self.base.as_ref(), encoded.as_ref());
        let req = self.client.get(url).query(&[("email", self.email.as_str())]);
        let resp: UnpaywallResponse =
            crate::sources::get_json(UNPAYWALL_API, "DOI", doi, req).await?;

        let best = resp.best_oa_location.as_ref();
        let pdf_url = best
            .and_then(|l| l.url_for_pdf.clone())
            .or_else(|| {
                resp.oa_locations
                    .iter()
                    .find_map(|l| l.url_for_pdf.clone())
            });
        let landing_url = best
            .and_then(|l| l.url_for_landing_page.clone().or_else(|| l.url.clone()))
            .or_else(|| {
                resp.oa_locations
                    .iter()
                    .find_map(|l| l.url_for_landing_page.clone().or_else(|| l.url.clone()))
            });

        Ok(UnpaywallLookup {
            is_oa: resp.is_oa,
            pdf_url,
            landing_url,
        })
    }
}
