//! Institutional proxy URL builder. Config-gated: without a `ProxyConfig`
//! the source contributes nothing. This client never fetches metadata; it
//! only rewrites DOIs into proxied resolver URLs for the waterfall.

use crate::config::ProxyConfig;
use crate::error::OracleError;

#[derive(Clone, Debug)]
pub struct InstitutionalProxy {
    template: String,
}

impl InstitutionalProxy {
    pub fn new(config: &ProxyConfig) -> Result<Self, OracleError> {
        if !config.url_template.contains("{doi}") {
            return Err(OracleError::Config(
                "clients.proxy.url_template must contain a {doi} placeholder".into(),
            ));
        }
        Ok(Self {
            template: config.url_template.clone(),
        })
    }

    pub fn url_for(&self, doi: &str) -> String {
        self.template.replace("{doi}", doi)
    }
}
