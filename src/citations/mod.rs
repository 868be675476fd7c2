//! Citation discovery: given a GEO dataset, find the original paper(s) and
//! everything citing or mentioning them.
//!
//! Strategy A fans out over four citation sources per original PMID;
//! Strategy B searches PubMed for the accession itself. Everything runs
//! concurrently under one deadline; sources that miss it are aborted and
//! reported as `timeout`. Per-source failures are soft.

use std::collections::BTreeMap;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::entities::{GeoDataset, Publication};
use crate::error::OracleError;
use crate::identifiers;
use crate::sources::europepmc::EuropePmcClient;
use crate::sources::ncbi::NcbiClient;
use crate::sources::openalex::OpenAlexClient;
use crate::sources::semantic_scholar::SemanticScholarClient;
use crate::store::Datastore;
use crate::transform::publication as transform;

/// Dedup preference when several sources report the same paper.
const SOURCE_ORDER: &[&str] = &["openalex", "semantic_scholar", "europepmc", "pubmed", "mention"];

const STRATEGY_ALL: &str = "all";
const PER_SOURCE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceStatus {
    Ok { count: usize },
    Failed { error: String },
    Timeout,
}

impl SourceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Failed { .. } => "failed",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CitationDiscoveryResult {
    pub geo_id: String,
    pub original: Vec<Publication>,
    pub citing: Vec<Publication>,
    pub sources_used: BTreeMap<String, SourceStatus>,
    pub from_cache: bool,
}

pub struct CitationEngine {
    ncbi: NcbiClient,
    openalex: OpenAlexClient,
    semantic_scholar: SemanticScholarClient,
    europepmc: EuropePmcClient,
    store: Datastore,
    timeout: std::time::Duration,
    cache_ttl_seconds: i64,
}

impl CitationEngine {
    pub fn new(config: &Config, store: Datastore) -> Result<Self, OracleError> {
        Ok(Self {
            ncbi: NcbiClient::new(config)?,
            openalex: OpenAlexClient::new(config)?,
            semantic_scholar: SemanticScholarClient::new(config)?,
            europepmc: EuropePmcClient::new(config)?,
            store,
            timeout: config.strategy_timeout(),
            cache_ttl_seconds: config.citation_discovery.cache_ttl_seconds,
        })
    }

    #[cfg(test)]
    pub fn with_clients(
        ncbi: NcbiClient,
        openalex: OpenAlexClient,
        semantic_scholar: SemanticScholarClient,
        europepmc: EuropePmcClient,
        store: Datastore,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            ncbi,
            openalex,
            semantic_scholar,
            europepmc,
            store,
            timeout,
            cache_ttl_seconds: 7 * 24 * 60 * 60,
        }
    }

    /// Discover papers for a dataset, up to `max_results` citing entries.
    /// Cached results short-circuit; fresh results are persisted and cached.
    pub async fn find_citing_papers(
        &self,
        geo: &GeoDataset,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<CitationDiscoveryResult, OracleError> {
        if max_results == 0 {
            return Ok(CitationDiscoveryResult {
                geo_id: geo.geo_id.clone(),
                ..Default::default()
            });
        }
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        if let Some(result) = self.from_cache(geo, max_results).await? {
            return Ok(result);
        }

        let original = self.resolve_originals(geo).await;
        let original_keys: Vec<String> = original.iter().flat_map(identity_keys).collect();

        let (per_source, sources_used) = self.gather(geo, &original, cancel).await?;
        let citing = self.merge(per_source, &original_keys, max_results);

        // Every source failing with nothing to show is a hard failure; a
        // legitimately citation-free dataset has at least one ok source.
        if citing.is_empty()
            && !sources_used.is_empty()
            && sources_used.values().all(|s| !s.is_ok())
        {
            return Err(OracleError::Network {
                api: "citation discovery".into(),
                message: format!("all sources failed for {}", geo.geo_id),
            });
        }

        // Persist so the cached key list can be rehydrated from the store.
        let mut citing_keys = Vec::with_capacity(citing.len());
        for publication in original.iter().chain(citing.iter()) {
            self.store.upsert_publication(publication).await?;
        }
        for publication in &citing {
            citing_keys.push(identifiers::key_string(publication)?);
        }
        self.store
            .citation_cache_put(&geo.geo_id, STRATEGY_ALL, &citing_keys, self.cache_ttl_seconds)
            .await?;

        Ok(CitationDiscoveryResult {
            geo_id: geo.geo_id.clone(),
            original,
            citing,
            sources_used,
            from_cache: false,
        })
    }

    async fn from_cache(
        &self,
        geo: &GeoDataset,
        max_results: usize,
    ) -> Result<Option<CitationDiscoveryResult>, OracleError> {
        let Some(keys) = self
            .store
            .citation_cache_get(&geo.geo_id, STRATEGY_ALL)
            .await?
        else {
            return Ok(None);
        };
        debug!(geo_id = %geo.geo_id, count = keys.len(), "citation cache hit");

        let mut citing = Vec::with_capacity(keys.len().min(max_results));
        for key in keys.iter().take(max_results) {
            if let Some(publication) = self.store.get_publication(key).await? {
                citing.push(publication);
            }
        }
        let mut original = Vec::new();
        for pmid in &geo.original_pmids {
            if let Some(publication) = self.store.get_publication(&format!("pmid:{pmid}")).await? {
                original.push(publication);
            }
        }
        Ok(Some(CitationDiscoveryResult {
            geo_id: geo.geo_id.clone(),
            original,
            citing,
            sources_used: BTreeMap::new(),
            from_cache: true,
        }))
    }

    /// Metadata for the announcing paper(s). Failures degrade to bare-PMID
    /// records so citation fan-out can still run.
    async fn resolve_originals(&self, geo: &GeoDataset) -> Vec<Publication> {
        if geo.original_pmids.is_empty() {
            return Vec::new();
        }
        match self.ncbi.fetch_pubmed_summaries(&geo.original_pmids).await {
            Ok(publications) if !publications.is_empty() => publications,
            Ok(_) | Err(_) => geo
                .original_pmids
                .iter()
                .map(|pmid| Publication {
                    pmid: Some(pmid.clone()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    /// Run all strategies concurrently under the deadline; returns papers
    /// per source plus the status map.
    async fn gather(
        &self,
        geo: &GeoDataset,
        original: &[Publication],
        cancel: &CancellationToken,
    ) -> Result<(BTreeMap<&'static str, Vec<Publication>>, BTreeMap<String, SourceStatus>), OracleError>
    {
        let pmids: Vec<String> = original.iter().filter_map(|p| p.pmid.clone()).collect();

        let mut handles: Vec<(&'static str, JoinHandle<Result<Vec<Publication>, OracleError>>)> =
            Vec::new();
        if !pmids.is_empty() {
            let openalex = self.openalex.clone();
            let openalex_pmids = pmids.clone();
            handles.push((
                "openalex",
                tokio::spawn(async move { openalex_citations(openalex, openalex_pmids).await }),
            ));

            let s2 = self.semantic_scholar.clone();
            let s2_pmids = pmids.clone();
            handles.push((
                "semantic_scholar",
                tokio::spawn(async move { s2_citations(s2, s2_pmids).await }),
            ));

            let europe = self.europepmc.clone();
            let europe_pmids = pmids.clone();
            handles.push((
                "europepmc",
                tokio::spawn(async move { europepmc_citations(europe, europe_pmids).await }),
            ));

            let ncbi = self.ncbi.clone();
            let elink_pmids = pmids.clone();
            handles.push((
                "pubmed",
                tokio::spawn(async move { pubmed_citations(ncbi, elink_pmids).await }),
            ));
        }

        // Strategy B runs alongside: papers whose full text mentions the
        // accession itself.
        let ncbi = self.ncbi.clone();
        let geo_id = geo.geo_id.clone();
        handles.push((
            "mention",
            tokio::spawn(async move {
                let publications = ncbi
                    .search_pubmed(&geo_id, PER_SOURCE_LIMIT)
                    .await?;
                Ok(publications)
            }),
        ));

        let spawned: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let abort_handles: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) })
            .collect();

        let mut per_source: BTreeMap<&'static str, Vec<Publication>> = BTreeMap::new();
        let mut statuses: BTreeMap<String, SourceStatus> = BTreeMap::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = cancel.cancelled() => {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    return Err(OracleError::Cancelled);
                }
                next = pending.next() => {
                    let Some((name, joined)) = next else { break };
                    match joined {
                        Ok(Ok(publications)) => {
                            statuses.insert(name.to_string(), SourceStatus::Ok {
                                count: publications.len(),
                            });
                            per_source.insert(name, publications);
                        }
                        Ok(Err(err)) => {
                            warn!(source = name, %err, "citation source failed");
                            statuses.insert(name.to_string(), SourceStatus::Failed {
                                error: err.category().to_string(),
                            });
                        }
                        Err(join_err) if join_err.is_cancelled() => {
                            statuses.insert(name.to_string(), SourceStatus::Timeout);
                        }
                        Err(join_err) => {
                            statuses.insert(name.to_string(), SourceStatus::Failed {
                                error: join_err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        // Whatever is still pending missed the deadline.
        for handle in &abort_handles {
            handle.abort();
        }
        for name in spawned {
            statuses
                .entry(name.to_string())
                .or_insert(SourceStatus::Timeout);
        }
        Ok((per_source, statuses))
    }

    /// Deterministic merge: fixed source order, earliest-seen within a
    /// source. Two records describing the same paper under different
    /// identifier mixes (one DOI-only, one carrying the PMID too) collapse
    /// when any identifier matches; the first occurrence wins and absorbs
    /// the rest.
    fn merge(
        &self,
        per_source: BTreeMap<&'static str, Vec<Publication>>,
        original_keys: &[String],
        max_results: usize,
    ) -> Vec<Publication> {
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        let mut merged: Vec<Publication> = Vec::new();

        let original: Vec<String> = original_keys.to_vec();
        for source in SOURCE_ORDER {
            let Some(publications) = per_source.get(source) else {
                continue;
            };
            for publication in publications {
                let ids = identity_keys(publication);
                if ids.is_empty() || ids.iter().any(|id| original.contains(id)) {
                    continue;
                }
                match ids.iter().find_map(|id| index.get(id)).copied() {
                    Some(slot) => {
                        merged[slot].absorb(publication);
                        for id in identity_keys(&merged[slot]) {
                            index.entry(id).or_insert(slot);
                        }
                    }
                    None => {
                        let slot = merged.len();
                        merged.push(publication.clone());
                        for id in ids {
                            index.insert(id, slot);
                        }
                    }
                }
            }
        }
        merged.truncate(max_results);
        merged
    }
}

/// Every identifier a record carries, in `type:value` form, canonical key
/// included. Used to collapse duplicates across sources.
fn identity_keys(publication: &Publication) -> Vec<String> {
    let mut ids = Vec::new();
    if let Ok(key) = identifiers::key_string(publication) {
        ids.push(key);
    }
    if let Some(pmid) = publication.pmid.as_deref().filter(|v| !v.is_empty()) {
        ids.push(format!("pmid:{pmid}"));
    }
    if let Some(doi) = publication.doi.as_deref().filter(|v| !v.is_empty()) {
        ids.push(format!("doi:{}", doi.to_ascii_lowercase()));
    }
    if let Some(pmc) = publication.pmc_id.as_deref().filter(|v| !v.is_empty()) {
        ids.push(format!("pmc:{pmc}"));
    }
    if let Some(arxiv) = publication.arxiv_id.as_deref().filter(|v| !v.is_empty()) {
        ids.push(format!("arxiv:{arxiv}"));
    }
    ids.dedup();
    ids
}

async fn openalex_citations(
    client: OpenAlexClient,
    pmids: Vec<String>,
) -> Result<Vec<Publication>, OracleError> {
    let mut out = Vec::new();
    for pmid in pmids {
        let work = client.get_work_by_pmid(&pmid).await?;
        let Some(work_id) = work.short_id() else {
            continue;
        };
        for citing in client.get_citations(&work_id, PER_SOURCE_LIMIT).await? {
            out.push(transform::from_openalex_work(&citing));
        }
    }
    Ok(out)
}

async fn s2_citations(
    client: SemanticScholarClient,
    pmids: Vec<String>,
) -> Result<Vec<Publication>, OracleError> {
    let mut out = Vec::new();
    for pmid in pmids {
        let papers = client
            .get_citations(&format!("PMID:{pmid}"), PER_SOURCE_LIMIT)
            .await?;
        out.extend(papers.iter().map(transform::from_s2_paper));
    }
    Ok(out)
}

async fn europepmc_citations(
    client: EuropePmcClient,
    pmids: Vec<String>,
) -> Result<Vec<Publication>, OracleError> {
    let mut out = Vec::new();
    for pmid in pmids {
        let results = client.get_citations(&pmid, PER_SOURCE_LIMIT).await?;
        out.extend(results.iter().map(transform::from_europepmc_result));
    }
    Ok(out)
}

async fn pubmed_citations(
    client: NcbiClient,
    pmids: Vec<String>,
) -> Result<Vec<Publication>, OracleError> {
    let mut citing_pmids = Vec::new();
    for pmid in pmids {
        citing_pmids.extend(client.cited_in(&pmid).await?);
    }
    citing_pmids.dedup();
    client.fetch_pubmed_summaries(&citing_pmids).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn engine_with(server: &MockServer, timeout: Duration) -> CitationEngine {
        let base = server.uri();
        CitationEngine::with_clients(
            NcbiClient::new_for_test(base.clone()).unwrap(),
            OpenAlexClient::new_for_test(base.clone()).unwrap(),
            SemanticScholarClient::new_for_test(base.clone()).unwrap(),
            EuropePmcClient::new_for_test(base).unwrap(),
            Datastore::in_memory().await.unwrap(),
            timeout,
        )
    }

    fn geo_with_original() -> GeoDataset {
        GeoDataset {
            geo_id: "GSE12345".into(),
            original_pmids: vec!["19753302".into()],
            ..Default::default()
        }
    }

    fn s2_citation(pmid: Option<&str>, doi: &str, title: &str) -> serde_json::Value {
        let mut external = serde_json::json!({"DOI": doi});
        if let Some(pmid) = pmid {
            external["PubMed"] = serde_json::json!(pmid);
        }
        serde_json::json!({"citingPaper": {
            "paperId": title,
            "externalIds": external,
            "title": title,
            "year": 2022
        }})
    }

    fn mount_pubmed_summaries(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
        Mock::given(method("GET"))
            .and(path("/esummary.fcgi"))
            .and(query_param("db", "pubmed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "uids": ["19753302"],
                    "19753302": {
                        "uid": "19753302",
                        "title": "Original paper",
                        "pubdate": "2009 Nov 5",
                        "articleids": [{"idtype": "doi", "value": "10.1038/nature08460"}]
                    }
                }
            })))
            .mount(server)
    }

    fn mount_empty_mention(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "0", "idlist": []}
            })))
            .mount(server)
    }

    fn mount_empty_elink(server: &MockServer) -> impl std::future::Future<Output = ()> + '_ {
        Mock::given(method("GET"))
            .and(path("/elink.fcgi"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"linksets": []})),
            )
            .mount(server)
    }

    #[tokio::test]
    async fn partial_failure_still_returns_deduplicated_papers() {
        let server = MockServer::start().await;
        mount_pubmed_summaries(&server).await;
        mount_empty_mention(&server).await;
        mount_empty_elink(&server).await;

        // OpenAlex hangs past the deadline.
        Mock::given(method("GET"))
            .and(path("/works/pmid:19753302"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({})),
            )
            .mount(&server)
            .await;
        // Semantic Scholar returns two papers.
        Mock::given(method("GET"))
            .and(path("/paper/PMID:19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    s2_citation(Some("30000001"), "10.1/a", "First citer"),
                    s2_citation(None, "10.1/b", "Second citer")
                ]
            })))
            .mount(&server)
            .await;
        // Europe PMC returns one duplicating the first.
        Mock::given(method("GET"))
            .and(path("/MED/19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "citationList": {"citation": [
                    {"id": "30000001", "source": "MED", "title": "First citer", "pubYear": "2022"}
                ]}
            })))
            .mount(&server)
            .await;

        let engine = engine_with(&server, Duration::from_millis(800)).await;
        let result = engine
            .find_citing_papers(&geo_with_original(), 50, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.citing.len(), 2);
        assert_eq!(result.original.len(), 1);
        assert_eq!(
            result.sources_used.get("openalex"),
            Some(&SourceStatus::Timeout)
        );
        assert_eq!(
            result.sources_used.get("semantic_scholar"),
            Some(&SourceStatus::Ok { count: 2 })
        );
        // No two citing papers share a canonical key.
        let mut keys: Vec<String> = result
            .citing
            .iter()
            .map(|p| identifiers::key_string(p).unwrap())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), result.citing.len());

        // A cache entry was created; the next call needs no HTTP.
        let cached = engine
            .find_citing_papers(&geo_with_original(), 50, &CancellationToken::new())
            .await
            .unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.citing.len(), 2);
    }

    #[tokio::test]
    async fn max_results_zero_returns_empty_without_caching() {
        let server = MockServer::start().await;
        let engine = engine_with(&server, Duration::from_secs(1)).await;
        let result = engine
            .find_citing_papers(&geo_with_original(), 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.citing.is_empty());
        assert!(result.original.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
        assert_eq!(
            engine
                .store
                .citation_cache_get("GSE12345", "all")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn dedup_prefers_openalex_and_absorbs_identifiers() {
        let server = MockServer::start().await;
        mount_pubmed_summaries(&server).await;
        mount_empty_mention(&server).await;
        mount_empty_elink(&server).await;

        Mock::given(method("GET"))
            .and(path("/works/pmid:19753302"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "https://openalex.org/W1",
                "ids": {"openalex": "https://openalex.org/W1"}
            })))
            .mount(&server)
            .await;
        // The same paper seen by OpenAlex (DOI only) and Semantic Scholar
        // (DOI + PMID): the OpenAlex record wins, PMID is absorbed.
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("filter", "cites:W1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": "https://openalex.org/W2",
                    "display_name": "Shared citer",
                    "publication_year": 2021,
                    "ids": {"doi": "https://doi.org/10.1/shared"}
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paper/PMID:19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [s2_citation(Some("777"), "10.1/shared", "Shared citer")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/MED/19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "citationList": {"citation": []}
            })))
            .mount(&server)
            .await;

        let engine = engine_with(&server, Duration::from_secs(5)).await;
        let result = engine
            .find_citing_papers(&geo_with_original(), 50, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.citing.len(), 1);
        let paper = &result.citing[0];
        assert_eq!(paper.doi.as_deref(), Some("10.1/shared"));
        // PMID came from the Semantic Scholar duplicate.
        assert_eq!(paper.pmid.as_deref(), Some("777"));
        assert_eq!(
            paper.metadata.get("source").and_then(|v| v.as_str()),
            Some("openalex")
        );
    }

    #[tokio::test]
    async fn dataset_without_pmids_uses_mention_strategy_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("term", "GSE777"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "1", "idlist": ["40000001"]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/esummary.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "uids": ["40000001"],
                    "40000001": {"uid": "40000001", "title": "Mentions the accession"}
                }
            })))
            .mount(&server)
            .await;

        let geo = GeoDataset::new("GSE777");
        let engine = engine_with(&server, Duration::from_secs(5)).await;
        let result = engine
            .find_citing_papers(&geo, 50, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.citing.len(), 1);
        assert!(result.original.is_empty());
        assert_eq!(
            result.sources_used.get("mention"),
            Some(&SourceStatus::Ok { count: 1 })
        );
        assert!(!result.sources_used.contains_key("openalex"));
    }
}
