//! URL collection: query every source that applies to a publication's
//! identifiers, in parallel, and return classified candidates.
//!
//! Per-source failures are soft: the collector logs them and keeps whatever
//! the other sources produced. Definitive upstream misses are cached
//! negatively so repeat enrichments skip the lookup for a day.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::Config;
use crate::entities::Publication;
use crate::error::OracleError;
use crate::fulltext::classify::classify_candidate;
use crate::fulltext::{UrlCandidate, UrlType};
use crate::sources::arxiv::ArxivClient;
use crate::sources::biorxiv::BiorxivClient;
use crate::sources::core::CoreClient;
use crate::sources::crossref::CrossrefClient;
use crate::sources::europepmc::EuropePmcClient;
use crate::sources::openalex::OpenAlexClient;
use crate::sources::proxy::InstitutionalProxy;
use crate::sources::unpaywall::UnpaywallClient;
use crate::store::Datastore;

/// Source base priorities; lower is better. URL-type adjustments are
/// applied on top during sorting.
pub mod priority {
    pub const PROXY: i64 = 1;
    pub const PMC: i64 = 2;
    pub const UNPAYWALL: i64 = 3;
    pub const PREPRINT: i64 = 4;
    pub const OPENALEX: i64 = 5;
    pub const CORE: i64 = 6;
    pub const CROSSREF: i64 = 7;
}

const BIORXIV_DOI_PREFIX: &str = "10.1101/";

pub struct UrlCollector {
    europepmc: EuropePmcClient,
    unpaywall: UnpaywallClient,
    openalex: OpenAlexClient,
    core: CoreClient,
    biorxiv: BiorxivClient,
    arxiv: ArxivClient,
    crossref: CrossrefClient,
    proxy: Option<InstitutionalProxy>,
    store: Datastore,
}

impl UrlCollector {
    pub fn new(config: &Config, store: Datastore) -> Result<Self, OracleError> {
        let proxy = config
            .clients
            .proxy
            .as_ref()
            .map(InstitutionalProxy::new)
            .transpose()?;
        Ok(Self {
            europepmc: EuropePmcClient::new(config)?,
            unpaywall: UnpaywallClient::new(config)?,
            openalex: OpenAlexClient::new(config)?,
            core: CoreClient::new(config)?,
            biorxiv: BiorxivClient::new(config)?,
            arxiv: ArxivClient::new(config)?,
            crossref: CrossrefClient::new(config)?,
            proxy,
            store,
        })
    }

    #[cfg(test)]
    #[allow(clippy::too_many_arguments)]
    pub fn with_clients(
        europepmc: EuropePmcClient,
        unpaywall: UnpaywallClient,
        openalex: OpenAlexClient,
        core: CoreClient,
        biorxiv: BiorxivClient,
        arxiv: ArxivClient,
        crossref: CrossrefClient,
        proxy: Option<InstitutionalProxy>,
        store: Datastore,
    ) -> Self {
        Self {
            europepmc,
            unpaywall,
            openalex,
            core,
            biorxiv,
            arxiv,
            crossref,
            proxy,
            store,
        }
    }

    /// All URL candidates for a publication, classified, deduplicated on the
    /// URL, in source-priority discovery order (unsorted by type; the
    /// waterfall sorts).
    pub async fn collect_urls(
        &self,
        publication: &Publication,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let doi = publication.doi.as_deref().map(str::trim).filter(|d| !d.is_empty());
        let (pmc, unpaywall, preprint, arxiv, openalex, core, crossref) = tokio::join!(
            self.pmc_candidates(publication),
            self.unpaywall_candidates(doi),
            self.preprint_candidates(doi),
            self.arxiv_candidates(publication.arxiv_id.as_deref()),
            self.openalex_candidates(publication),
            self.core_candidates(doi, &publication.title),
            self.crossref_candidates(doi),
        );

        let mut merged: Vec<UrlCandidate> = Vec::new();
        if let (Some(proxy), Some(doi)) = (self.proxy.as_ref(), doi) {
            let mut candidate = UrlCandidate::new(proxy.url_for(doi), "proxy", priority::PROXY);
            candidate.requires_auth = true;
            merged.push(candidate);
        }
        for (source, outcome) in [
            ("pmc", pmc),
            ("unpaywall", unpaywall),
            ("biorxiv", preprint),
            ("arxiv", arxiv),
            ("openalex", openalex),
            ("core", core),
            ("crossref", crossref),
        ] {
            match outcome {
                Ok(candidates) => merged.extend(candidates),
                Err(err) if err.category() == "not_found" => {
                    debug!(source, %err, "no full-text URLs");
                }
                Err(err) => warn!(source, %err, "URL collection source failed"),
            }
        }

        // First occurrence wins; collection order already encodes priority.
        let mut seen: HashSet<String> = HashSet::with_capacity(merged.len());
        let mut out = Vec::with_capacity(merged.len());
        for mut candidate in merged {
            if candidate.url.trim().is_empty() || !seen.insert(candidate.url.clone()) {
                continue;
            }
            if candidate.url_type == UrlType::Unknown {
                classify_candidate(&mut candidate, None);
            }
            out.push(candidate);
        }
        debug!(count = out.len(), "collected URL candidates");
        Ok(out)
    }

    /// The four PMC URL patterns plus whatever Europe PMC lists for the
    /// article. Requires a PMC id for the pattern set; the listing works off
    /// any identifier.
    async fn pmc_candidates(
        &self,
        publication: &Publication,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let mut out = Vec::new();
        if let Some(pmcid) = publication.pmc_id.as_deref().filter(|p| !p.is_empty()) {
            for (url, hint) in [
                (
                    format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmcid}/pdf/"),
                    UrlType::PdfDirect,
                ),
                (
                    format!("https://pmc.ncbi.nlm.nih.gov/articles/{pmcid}/pdf/"),
                    UrlType::PdfDirect,
                ),
                (
                    format!("https://europepmc.org/articles/{pmcid}?pdf=render"),
                    UrlType::PdfDirect,
                ),
                (
                    format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmcid}/"),
                    UrlType::HtmlFulltext,
                ),
            ] {
                let mut candidate = UrlCandidate::new(url, "pmc", priority::PMC);
                classify_candidate(&mut candidate, Some(hint));
                out.push(candidate);
            }
        }

        let lookup_id = publication
            .pmid
            .as_deref()
            .or(publication.pmc_id.as_deref())
            .or(publication.doi.as_deref());
        if let Some(id) = lookup_id {
            if self.store.not_found_check("europepmc", id).await? {
                return Ok(out);
            }
            match self.europepmc.get_fulltext_urls(id).await {
                Ok(links) if links.is_empty() && out.is_empty() => {
                    self.store.not_found_mark("europepmc", id).await?;
                }
                Ok(links) => {
                    for link in links {
                        let hint = match link.document_style.as_deref() {
                            Some("pdf") => Some(UrlType::PdfDirect),
                            Some("html") => Some(UrlType::HtmlFulltext),
                            _ => None,
                        };
                        let mut candidate = UrlCandidate::new(link.url, "pmc", priority::PMC);
                        classify_candidate(&mut candidate, hint);
                        out.push(candidate);
                    }
                }
                Err(err) if err.category() == "not_found" => {
                    self.store.not_found_mark("europepmc", id).await?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    async fn unpaywall_candidates(
        &self,
        doi: Option<&str>,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let Some(doi) = doi else {
            return Ok(Vec::new());
        };
        if self.store.not_found_check("unpaywall", doi).await? {
            return Ok(Vec::new());
        }
        let lookup = match self.unpaywall.lookup(doi).await {
            Ok(lookup) => lookup,
            Err(err) if err.category() == "not_found" => {
                self.store.not_found_mark("unpaywall", doi).await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut out = Vec::new();
        if let Some(url) = lookup.pdf_url {
            let mut candidate = UrlCandidate::new(url, "unpaywall", priority::UNPAYWALL);
            classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
            out.push(candidate);
        }
        if let Some(url) = lookup.landing_url {
            let mut candidate = UrlCandidate::new(url, "unpaywall", priority::UNPAYWALL);
            classify_candidate(&mut candidate, Some(UrlType::LandingPage));
            out.push(candidate);
        }
        Ok(out)
    }

    async fn preprint_candidates(
        &self,
        doi: Option<&str>,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let Some(doi) = doi.filter(|d| d.starts_with(BIORXIV_DOI_PREFIX)) else {
            return Ok(Vec::new());
        };
        if self.store.not_found_check("biorxiv", doi).await? {
            return Ok(Vec::new());
        }
        match self.biorxiv.lookup(doi).await? {
            Some(url) => {
                let mut candidate = UrlCandidate::new(url, "biorxiv", priority::PREPRINT);
                classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
                Ok(vec![candidate])
            }
            None => {
                self.store.not_found_mark("biorxiv", doi).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn arxiv_candidates(
        &self,
        arxiv_id: Option<&str>,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let Some(id) = arxiv_id.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Vec::new());
        };
        if self.store.not_found_check("arxiv", id).await? {
            return Ok(Vec::new());
        }
        match self.arxiv.lookup(id).await? {
            Some(url) => {
                let mut candidate = UrlCandidate::new(url, "arxiv", priority::PREPRINT);
                classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
                Ok(vec![candidate])
            }
            None => {
                self.store.not_found_mark("arxiv", id).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn openalex_candidates(
        &self,
        publication: &Publication,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let work = if let Some(doi) = publication.doi.as_deref() {
            if self.store.not_found_check("openalex", doi).await? {
                return Ok(Vec::new());
            }
            self.openalex.get_work_by_doi(doi).await
        } else if let Some(pmid) = publication.pmid.as_deref() {
            if self.store.not_found_check("openalex", pmid).await? {
                return Ok(Vec::new());
            }
            self.openalex.get_work_by_pmid(pmid).await
        } else {
            return Ok(Vec::new());
        };

        let work = match work {
            Ok(work) => work,
            Err(err) if err.category() == "not_found" => {
                let key = publication
                    .doi
                    .as_deref()
                    .or(publication.pmid.as_deref())
                    .unwrap_or_default();
                self.store.not_found_mark("openalex", key).await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        Ok(work
            .pdf_url()
            .map(|url| {
                let mut candidate = UrlCandidate::new(url, "openalex", priority::OPENALEX);
                classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
                vec![candidate]
            })
            .unwrap_or_default())
    }

    async fn core_candidates(
        &self,
        doi: Option<&str>,
        title: &str,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        if !self.core.is_configured() {
            return Ok(Vec::new());
        }
        let works = if let Some(doi) = doi {
            if self.store.not_found_check("core", doi).await? {
                return Ok(Vec::new());
            }
            self.core.search_by_doi(doi).await?
        } else if !title.trim().is_empty() {
            self.core.search_by_title(title).await?
        } else {
            return Ok(Vec::new());
        };

        if works.is_empty()
            && let Some(doi) = doi
        {
            self.store.not_found_mark("core", doi).await?;
        }
        Ok(works
            .iter()
            .filter_map(|w| w.pdf_url())
            .map(|url| {
                let mut candidate = UrlCandidate::new(url, "core", priority::CORE);
                classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
                candidate
            })
            .collect())
    }

    async fn crossref_candidates(
        &self,
        doi: Option<&str>,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let Some(doi) = doi else {
            return Ok(Vec::new());
        };
        if self.store.not_found_check("crossref", doi).await? {
            return Ok(Vec::new());
        }
        let work = match self.crossref.lookup(doi).await {
            Ok(work) => work,
            Err(err) if err.category() == "not_found" => {
                self.store.not_found_mark("crossref", doi).await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut out = Vec::new();
        if let Some(url) = work.pdf_link() {
            let mut candidate = UrlCandidate::new(url, "crossref", priority::CROSSREF);
            classify_candidate(&mut candidate, Some(UrlType::PdfDirect));
            out.push(candidate);
        }
        if let Some(url) = work.landing_url() {
            let mut candidate = UrlCandidate::new(url, "crossref", priority::CROSSREF);
            classify_candidate(&mut candidate, None);
            out.push(candidate);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn collector_with(server: &MockServer) -> UrlCollector {
        let base = server.uri();
        UrlCollector::with_clients(
            EuropePmcClient::new_for_test(base.clone()).unwrap(),
            UnpaywallClient::new_for_test(base.clone()).unwrap(),
            OpenAlexClient::new_for_test(base.clone()).unwrap(),
            CoreClient::new_for_test(base.clone(), None).unwrap(),
            BiorxivClient::new_for_test(base.clone()).unwrap(),
            ArxivClient::new_for_test(base.clone()).unwrap(),
            CrossrefClient::new_for_test(base).unwrap(),
            None,
            Datastore::in_memory().await.unwrap(),
        )
    }

    fn mock_miss(status: u16) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({}))
    }

    #[tokio::test]
    async fn collects_from_pmc_patterns_and_unpaywall() {
        let server = MockServer::start().await;
        // Europe PMC core listing.
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("resultType", "core"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hitCount": 1,
                "resultList": {"result": [{
                    "id": "19753302",
                    "fullTextUrlList": {"fullTextUrl": [
                        {"documentStyle": "pdf",
                         "url": "https://europepmc.org/articles/PMC2798000?pdf=render"}
                    ]}
                }]}
            })))
            .mount(&server)
            .await;
        // Unpaywall.
        Mock::given(method("GET"))
            .and(path("/10.1038%2Fnature08460"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_oa": true,
                "best_oa_location": {
                    "url": "https://www.nature.com/articles/nature08460",
                    "url_for_pdf": "https://www.nature.com/articles/nature08460.pdf"
                }
            })))
            .mount(&server)
            .await;
        // OpenAlex and Crossref know nothing.
        Mock::given(method("GET"))
            .and(path("/works/doi:10.1038/nature08460"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1038%2Fnature08460"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;

        let collector = collector_with(&server).await;
        let publication = Publication {
            pmid: Some("19753302".into()),
            doi: Some("10.1038/nature08460".into()),
            pmc_id: Some("PMC2798000".into()),
            title: "Original".into(),
            ..Default::default()
        };
        let candidates = collector.collect_urls(&publication).await.unwrap();

        // Four PMC patterns (one duplicated by the Europe PMC listing and
        // collapsed) plus two Unpaywall URLs.
        let pmc_count = candidates.iter().filter(|c| c.source == "pmc").count();
        assert_eq!(pmc_count, 4);
        assert!(candidates.iter().any(|c| c.source == "unpaywall"
            && c.url_type == UrlType::PdfDirect
            && c.url.ends_with(".pdf")));
        // URLs are unique.
        let mut urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        urls.sort_unstable();
        urls.dedup();
        assert_eq!(urls.len(), candidates.len());
    }

    #[tokio::test]
    async fn doi_only_paper_skips_pmc_patterns_and_caches_misses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"hitCount": 0})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/10.1371%2Fjournal.pone.0123456"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/doi:10.1371/journal.pone.0123456"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/10.1371%2Fjournal.pone.0123456"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;

        let collector = collector_with(&server).await;
        let publication = Publication {
            doi: Some("10.1371/journal.pone.0123456".into()),
            title: "DOI-only".into(),
            ..Default::default()
        };
        let candidates = collector.collect_urls(&publication).await.unwrap();
        assert!(candidates.is_empty());

        // Second collection hits the negative cache, not the servers.
        let requests_before = server.received_requests().await.unwrap().len();
        let candidates = collector.collect_urls(&publication).await.unwrap();
        assert!(candidates.is_empty());
        let requests_after = server.received_requests().await.unwrap().len();
        assert_eq!(requests_before, requests_after);
    }

    #[tokio::test]
    async fn proxy_candidate_is_emitted_first_and_requires_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(mock_miss(404))
            .mount(&server)
            .await;

        let base = server.uri();
        let collector = UrlCollector::with_clients(
            EuropePmcClient::new_for_test(base.clone()).unwrap(),
            UnpaywallClient::new_for_test(base.clone()).unwrap(),
            OpenAlexClient::new_for_test(base.clone()).unwrap(),
            CoreClient::new_for_test(base.clone(), None).unwrap(),
            BiorxivClient::new_for_test(base.clone()).unwrap(),
            ArxivClient::new_for_test(base.clone()).unwrap(),
            CrossrefClient::new_for_test(base).unwrap(),
            Some(
                InstitutionalProxy::new(&crate::config::ProxyConfig {
                    url_template: "https://proxy.example.edu/resolve?doi={doi}".into(),
                    username: None,
                    password: None,
                })
                .unwrap(),
            ),
            Datastore::in_memory().await.unwrap(),
        );

        let publication = Publication {
            doi: Some("10.1/proxied".into()),
            title: "Proxied".into(),
            ..Default::default()
        };
        let candidates = collector.collect_urls(&publication).await.unwrap();
        assert_eq!(candidates[0].source, "proxy");
        assert!(candidates[0].requires_auth);
        assert_eq!(candidates[0].priority, priority::PROXY);
    }
}
