//! arXiv lookup: confirm an id against the export API's Atom feed and hand
//! back the canonical PDF URL.

use std::borrow::Cow;

use regex::Regex;

use crate::config::Config;
use crate::error::OracleError;
use crate::sources::rate_limit;

const ARXIV_BASE: &str = "https://export.arxiv.org/api";
const ARXIV_API: &str = "arxiv";
const ARXIV_BASE_ENV: &str = "OMICS_ORACLE_ARXIV_BASE";
const ARXIV_PDF_HOST: &str = "https://arxiv.org/pdf";
const DEFAULT_RPS: f64 = 1.0;

#[derive(Clone)]
pub struct ArxivClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl ArxivClient {
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let source = config.source(ARXIV_API);
        rate_limit::configure(ARXIV_API, source.rate_limit_rps.unwrap_or(DEFAULT_RPS));
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(ARXIV_BASE, ARXIV_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub fn new_for_test(base: String) -> Result<Self, OracleError> {
        rate_limit::configure(ARXIV_API, 50.0);
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    /// PDF URL for an arXiv id, `None` when the export API does not list it.
    pub async fn lookup(&self, arxiv_id: &str) -> Result<Option<String>, OracleError> {
        let arxiv_id = arxiv_id.trim();
        if arxiv_id.is_empty() {
            return Err(OracleError::InvalidArgument("arXiv id is required".into()));
        }

        rate_limit::acquire(ARXIV_API).await;
        let url = crate::sources::join_endpoint(self.base.as_ref(), "query");
        let req = self.client.get(url).query(&[("id_list", arxiv_id)]);
        let resp = req
            .send()
            .await
            .map_err(|err| OracleError::network(ARXIV_API, err))?;
        let status = resp.status();
        let retry_after = crate::sources::retry_after_header(&resp);
        let bytes = crate::sources::read_limited_body(resp, ARXIV_API).await?;
        if !status.is_success() {
            return Err(crate::sources::status_error(
                ARXIV_API,
                status,
                retry_after,
                "arXiv id",
                arxiv_id,
                &bytes,
            ));
        }

        let feed = String::from_utf8_lossy(&bytes);
        if !entry_matches(&feed, arxiv_id) {
            return Ok(None);
        }
        Ok(Some(format!("{ARXIV_PDF_HOST}/{arxiv_id}")))
    }
}

/// The feed lists matches as `<id>http://arxiv.org/abs/{id}vN</id>`; a
/// missing id still returns one entry whose title is `Error`.
fn entry_matches(feed: &str, arxiv_id: &str) -> bool {
    let pattern = format!(
        r"<id>https?://arxiv\.org/abs/{}(v\d+)?</id>",
        regex::escape(arxiv_id)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(feed),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_HIT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2101.12345v2</id>
    <title>A found preprint</title>
  </entry>
</feed>"#;

    const FEED_MISS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format</id>
    <title>Error</title>
  </entry>
</feed>"#;

    #[tokio::test]
    async fn lookup_returns_pdf_url_for_listed_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("id_list", "2101.12345"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_HIT))
            .mount(&server)
            .await;

        let client = ArxivClient::new_for_test(server.uri()).unwrap();
        let url = client.lookup("2101.12345").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://arxiv.org/pdf/2101.12345"));
    }

    #[tokio::test]
    async fn lookup_returns_none_for_error_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_MISS))
            .mount(&server)
            .await;

        let client = ArxivClient::new_for_test(server.uri()).unwrap();
        assert_eq!(client.lookup("bogus.00000").await.unwrap(), None);
    }

    #[test]
    fn entry_matching_requires_the_exact_id() {
        assert!(entry_matches(FEED_HIT, "2101.12345"));
        assert!(!entry_matches(FEED_HIT, "2101.1234"));
        assert!(!entry_matches(FEED_MISS, "bogus.00000"));
    }
}
