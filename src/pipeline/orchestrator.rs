//! The `Oracle`: entry point tying search, cache, citation discovery, and
//! the full-text waterfall together.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::citations::CitationEngine;
use crate::config::Config;
use crate::entities::{GeoAggregate, GeoDataset, Publication, Relationship};
use crate::error::OracleError;
use crate::fulltext::{ContentExtractor, Downloader, TextStatsExtractor, UrlCollector};
use crate::identifiers;
use crate::pipeline::cache::{CacheStats, GeoCache};
use crate::pipeline::rank::{QueryKind, classify_query, rank_datasets};
use crate::sources::ncbi::NcbiClient;
use crate::sources::openalex::OpenAlexClient;
use crate::store::{Datastore, StoreStats};
use crate::transform::publication as transform;

/// What a top-level search returns: enriched datasets, loose publications,
/// and per-source soft failures. Always a structured value, never a raw
/// error, unless storage itself failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub kind: QueryKind,
    pub datasets: Vec<GeoAggregate>,
    pub publications: Vec<Publication>,
    pub errors: Vec<SourceError>,
    #[serde(default)]
    pub from_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub category: String,
    pub message: String,
}

impl SourceError {
    fn new(source: &str, err: &OracleError) -> Self {
        Self {
            source: source.to_string(),
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }

    fn timeout(source: &str) -> Self {
        Self {
            source: source.to_string(),
            category: "timeout".into(),
            message: "deadline exceeded".into(),
        }
    }
}

pub struct Oracle {
    config: Config,
    store: Datastore,
    cache: GeoCache,
    ncbi: NcbiClient,
    openalex: OpenAlexClient,
    citations: CitationEngine,
    collector: UrlCollector,
    downloader: Downloader,
    extractor: Arc<dyn ContentExtractor>,
}

fn search_cache_key(query: &str) -> String {
    let digest = Sha256::digest(identifiers::normalize_title(query).as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("search:{hex}")
}

impl Oracle {
    pub async fn new(config: Config) -> Result<Self, OracleError> {
        let store = Datastore::connect_path(&config.db_path).await?;
        let cache = GeoCache::new(&config.hot_cache, store.clone()).await;
        Ok(Self {
            ncbi: NcbiClient::new(&config)?,
            openalex: OpenAlexClient::new(&config)?,
            citations: CitationEngine::new(&config, store.clone())?,
            collector: UrlCollector::new(&config, store.clone())?,
            downloader: Downloader::new(&config, store.clone())?,
            extractor: Arc::new(TextStatsExtractor),
            cache,
            store,
            config,
        })
    }

    #[cfg(test)]
    #[allow(clippy::too_many_arguments)]
    pub fn with_parts(
        config: Config,
        store: Datastore,
        cache: GeoCache,
        ncbi: NcbiClient,
        openalex: OpenAlexClient,
        citations: CitationEngine,
        collector: UrlCollector,
        downloader: Downloader,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            ncbi,
            openalex,
            citations,
            collector,
            downloader,
            extractor,
        }
    }

    pub fn store(&self) -> &Datastore {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    pub async fn store_stats(&self) -> Result<StoreStats, OracleError> {
        self.store.stats().await
    }

    pub async fn invalidate(&self, geo_ids: &[String]) {
        self.cache.invalidate_batch(geo_ids).await;
    }

    /// Top-level search: classify, fan out, rank, enrich in parallel.
    pub async fn search(
        &self,
        query: &str,
        max_geo_results: usize,
        max_publication_results: usize,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, OracleError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(OracleError::InvalidArgument("Query is required".into()));
        }
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        let cache_key = search_cache_key(query);
        if let Some(raw) = self.cache.hot().get_raw(&cache_key).await
            && let Ok(mut cached) = serde_json::from_str::<SearchResult>(&raw)
        {
            debug!(query, "search cache hit");
            cached.from_cache = true;
            return Ok(cached);
        }

        let kind = classify_query(query);
        let mut errors: Vec<SourceError> = Vec::new();
        let mut publications: Vec<Publication> = Vec::new();
        let mut geo_candidates: Vec<GeoDataset> = Vec::new();

        match &kind {
            QueryKind::GeoId(geo_id) => {
                geo_candidates.push(GeoDataset::new(geo_id.clone()));
            }
            QueryKind::Pmid(pmid) => {
                match self.ncbi.fetch_pubmed_summaries(&[pmid.clone()]).await {
                    Ok(found) => publications.extend(found),
                    Err(err) => errors.push(SourceError::new("pubmed", &err)),
                }
                match self
                    .ncbi
                    .search_geo(&format!("{pmid}[Pubmed ID]"), max_geo_results)
                    .await
                {
                    Ok(found) => geo_candidates.extend(found),
                    Err(err) => errors.push(SourceError::new("geo", &err)),
                }
            }
            QueryKind::Keyword(keyword) => {
                let deadline = self.config.search_deadline();
                let geo_branch =
                    tokio::time::timeout(deadline, self.ncbi.search_geo(keyword, max_geo_results));
                let pubmed_branch = tokio::time::timeout(
                    deadline,
                    self.ncbi.search_pubmed(keyword, max_publication_results),
                );
                let openalex_branch = tokio::time::timeout(
                    deadline,
                    self.openalex.search_works(keyword, max_publication_results),
                );
                let (geo_found, pubmed_found, openalex_found) =
                    tokio::join!(geo_branch, pubmed_branch, openalex_branch);

                match geo_found {
                    Ok(Ok(found)) => geo_candidates.extend(found),
                    Ok(Err(err)) => errors.push(SourceError::new("geo", &err)),
                    Err(_) => errors.push(SourceError::timeout("geo")),
                }
                match pubmed_found {
                    Ok(Ok(found)) => publications.extend(found),
                    Ok(Err(err)) => errors.push(SourceError::new("pubmed", &err)),
                    Err(_) => errors.push(SourceError::timeout("pubmed")),
                }
                match openalex_found {
                    Ok(Ok(found)) => {
                        publications.extend(found.iter().map(transform::from_openalex_work));
                    }
                    Ok(Err(err)) => errors.push(SourceError::new("openalex", &err)),
                    Err(_) => errors.push(SourceError::timeout("openalex")),
                }
            }
        }

        let ranked = rank_datasets(query, geo_candidates);
        let selected: Vec<String> = ranked
            .into_iter()
            .take(max_geo_results.max(1))
            .map(|d| d.geo_id)
            .collect();

        // Enrich every ranked dataset in parallel through the cache.
        let enrichments = join_all(
            selected
                .iter()
                .map(|geo_id| async move { (geo_id.clone(), self.get_geo_data(geo_id, cancel).await) }),
        )
        .await;

        let mut datasets = Vec::with_capacity(enrichments.len());
        for (geo_id, outcome) in enrichments {
            match outcome {
                Ok(aggregate) => datasets.push(aggregate),
                Err(OracleError::Cancelled) => return Err(OracleError::Cancelled),
                Err(err) => {
                    warn!(geo_id, %err, "enrichment failed");
                    errors.push(SourceError::new(&format!("discovery:{geo_id}"), &err));
                }
            }
        }

        // Loose publications found by the search branches become durable too.
        for publication in &publications {
            if !publication.is_empty() {
                self.store.upsert_publication(publication).await?;
            }
        }
        publications.truncate(max_publication_results);

        let result = SearchResult {
            query: query.to_string(),
            kind,
            datasets,
            publications,
            errors,
            from_cache: false,
        };
        if let Ok(payload) = serde_json::to_string(&result) {
            let ttl = std::time::Duration::from_secs(self.config.search.result_ttl_seconds.min(3600));
            self.cache.hot().put_raw(&cache_key, payload, ttl).await;
        }
        Ok(result)
    }

    /// Cache-through read of one dataset's aggregate: hot, warm, or
    /// auto-discovery with write-through.
    pub async fn get_geo_data(
        &self,
        geo_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GeoAggregate, OracleError> {
        if let Some(aggregate) = self.cache.get(geo_id).await? {
            return Ok(aggregate);
        }
        let aggregate = self.auto_discover(geo_id, cancel).await?;
        self.cache.update(geo_id, &aggregate).await;
        Ok(aggregate)
    }

    /// The cache-miss pipeline: fetch GEO metadata, discover citations,
    /// persist everything, run the waterfall per publication, assemble.
    /// Idempotent: re-running updates rows without duplicating them.
    async fn auto_discover(
        &self,
        geo_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GeoAggregate, OracleError> {
        info!(geo_id, "auto-discovery started");
        let geo = self.ncbi.fetch_geo_dataset(geo_id).await?;
        self.store.upsert_geo_dataset(&geo).await?;

        let discovery = match self
            .citations
            .find_citing_papers(&geo, self.config.citation_discovery.max_results, cancel)
            .await
        {
            Ok(result) => result,
            Err(OracleError::Cancelled) => return Err(OracleError::Cancelled),
            Err(err) => {
                // The dataset is still served; it just has no papers yet.
                warn!(geo_id, %err, "citation discovery failed");
                crate::citations::CitationDiscoveryResult {
                    geo_id: geo.geo_id.clone(),
                    ..Default::default()
                }
            }
        };

        let mut work: Vec<(Publication, Relationship)> = Vec::new();
        for publication in &discovery.original {
            let key = self.store.upsert_publication(publication).await?;
            self.store
                .link_geo_publication(&geo.geo_id, &key, Relationship::Original, None)
                .await?;
            work.push((publication.clone(), Relationship::Original));
        }
        for publication in &discovery.citing {
            let key = self.store.upsert_publication(publication).await?;
            self.store
                .link_geo_publication(&geo.geo_id, &key, Relationship::Citing, Some("all"))
                .await?;
            work.push((publication.clone(), Relationship::Citing));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.download.concurrency.max(1)));
        let enrichments = work.iter().map(|(publication, relationship)| {
            let semaphore = semaphore.clone();
            let geo_id = geo.geo_id.clone();
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                if let Err(err) = self
                    .enrich_publication(&geo_id, publication, *relationship, cancel)
                    .await
                {
                    if !matches!(err, OracleError::Cancelled) {
                        warn!(geo_id, %err, "publication enrichment failed");
                    }
                }
            }
        });
        join_all(enrichments).await;
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        let aggregate = self
            .store
            .get_complete_geo_data(&geo.geo_id)
            .await?
            .ok_or_else(|| OracleError::not_found("GEO dataset", &geo.geo_id))?;
        info!(
            geo_id,
            papers = aggregate.statistics.total_papers,
            downloads = aggregate.statistics.successful_downloads,
            "auto-discovery finished"
        );
        Ok(aggregate)
    }

    /// One publication's waterfall without a GEO context: used by the
    /// `download` command. Artifacts land under a fixed `unfiled` directory.
    pub async fn download_publication(
        &self,
        publication: &Publication,
        cancel: &CancellationToken,
    ) -> Result<crate::fulltext::DownloadResult, OracleError> {
        let key = self.store.upsert_publication(publication).await?;
        let candidates = self.collector.collect_urls(publication).await?;
        for candidate in &candidates {
            self.store.insert_url_candidate(&key, candidate).await?;
        }
        self.downloader
            .download_with_fallback(
                publication,
                "unfiled",
                Relationship::Citing,
                candidates,
                &self.config.store_root,
                cancel,
            )
            .await
    }

    /// One publication's full-text pass: collect URLs, persist them, run
    /// the waterfall, extract on success.
    async fn enrich_publication(
        &self,
        geo_id: &str,
        publication: &Publication,
        relationship: Relationship,
        cancel: &CancellationToken,
    ) -> Result<(), OracleError> {
        let key = identifiers::key_string(publication)?;
        if self.store.get_cached_pdf(&key).await?.is_some() {
            debug!(key, "PDF already cached");
            return Ok(());
        }

        let candidates = self.collector.collect_urls(publication).await?;
        for candidate in &candidates {
            self.store.insert_url_candidate(&key, candidate).await?;
        }

        let result = self
            .downloader
            .download_with_fallback(
                publication,
                geo_id,
                relationship,
                candidates,
                &self.config.store_root,
                cancel,
            )
            .await?;
        if !result.success {
            return Ok(());
        }

        if let Some(path) = result.file_path {
            let extractor = self.extractor.clone();
            let pdf_path: PathBuf = path.clone();
            match tokio::task::spawn_blocking(move || extractor.extract(&pdf_path)).await {
                Ok(Ok(summary)) => {
                    self.store.upsert_parsed_content(&key, &summary).await?;
                }
                Ok(Err(err)) => warn!(key, %err, "extraction failed"),
                Err(err) => warn!(key, %err, "extraction task failed"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ExtractionSummary;
    use std::path::Path;
    use wiremock::matchers::{method, path as url_path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StubExtractor;

    impl ContentExtractor for StubExtractor {
        fn parser_version(&self) -> &'static str {
            "stub/1"
        }

        fn extract(&self, _pdf_path: &Path) -> Result<ExtractionSummary, OracleError> {
            Ok(ExtractionSummary {
                has_fulltext: true,
                word_count: 1234,
                section_count: 5,
                quality_score: 0.8,
                parser_version: "stub/1".into(),
                ..Default::default()
            })
        }
    }

    async fn oracle_with(server: &MockServer, store_root: &Path) -> Oracle {
        let base = server.uri();
        let mut config = Config::default();
        config.store_root = store_root.to_path_buf();
        config.download.validation.min_size = 1024;
        config.download.retry_delay_ms = 1;
        config.citation_discovery.strategy_timeout_seconds = 5;

        let store = Datastore::in_memory().await.unwrap();
        let cache = GeoCache::new(&config.hot_cache, store.clone()).await;
        let ncbi = NcbiClient::new_for_test(base.clone()).unwrap();
        let openalex = OpenAlexClient::new_for_test(base.clone()).unwrap();
        let citations = CitationEngine::with_clients(
            ncbi.clone(),
            openalex.clone(),
            crate::sources::semantic_scholar::SemanticScholarClient::new_for_test(base.clone())
                .unwrap(),
            crate::sources::europepmc::EuropePmcClient::new_for_test(base.clone()).unwrap(),
            store.clone(),
            std::time::Duration::from_secs(5),
        );
        let collector = UrlCollector::with_clients(
            crate::sources::europepmc::EuropePmcClient::new_for_test(base.clone()).unwrap(),
            crate::sources::unpaywall::UnpaywallClient::new_for_test(base.clone()).unwrap(),
            openalex.clone(),
            crate::sources::core::CoreClient::new_for_test(base.clone(), None).unwrap(),
            crate::sources::biorxiv::BiorxivClient::new_for_test(base.clone()).unwrap(),
            crate::sources::arxiv::ArxivClient::new_for_test(base.clone()).unwrap(),
            crate::sources::crossref::CrossrefClient::new_for_test(base).unwrap(),
            None,
            store.clone(),
        );
        let downloader = Downloader::new(&config, store.clone()).unwrap();

        Oracle::with_parts(
            config,
            store,
            cache,
            ncbi,
            openalex,
            citations,
            collector,
            downloader,
            Arc::new(StubExtractor),
        )
    }

    fn pdf_body(size: usize) -> Vec<u8> {
        let mut body = b"%PDF-1.5\n".to_vec();
        body.resize(size, b'q');
        body
    }

    #[tokio::test]
    async fn prepopulated_cache_serves_search_without_http() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let oracle = oracle_with(&server, dir.path()).await;

        let aggregate = GeoAggregate {
            geo: GeoDataset {
                geo_id: "GSE12345".into(),
                title: Some("Cached series".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        oracle.cache.update("GSE12345", &aggregate).await;

        let result = oracle
            .search("GSE12345", 5, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.datasets.len(), 1);
        assert_eq!(result.datasets[0].geo.title.as_deref(), Some("Cached series"));
        assert!(result.errors.is_empty());
        // The hot cache answered; nothing touched the network.
        assert_eq!(server.received_requests().await.unwrap().len(), 0);

        // The search result itself is now cached.
        let again = oracle
            .search("GSE12345", 5, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert!(again.from_cache);
    }

    #[tokio::test]
    async fn cache_miss_runs_auto_discovery_end_to_end() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let oracle = oracle_with(&server, dir.path()).await;

        // GEO metadata.
        Mock::given(method("GET"))
            .and(url_path("/esearch.fcgi"))
            .and(query_param("db", "gds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "1", "idlist": ["200012345"]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/esummary.fcgi"))
            .and(query_param("db", "gds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "uids": ["200012345"],
                    "200012345": {
                        "accession": "GSE12345",
                        "title": "Discovered series",
                        "taxon": "Homo sapiens",
                        "n_samples": 6,
                        "pubmedids": ["19753302"]
                    }
                }
            })))
            .mount(&server)
            .await;
        // Original paper summary.
        Mock::given(method("GET"))
            .and(url_path("/esummary.fcgi"))
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
            .mount(&server)
            .await;
        // Mention search and elink: empty.
        Mock::given(method("GET"))
            .and(url_path("/esearch.fcgi"))
            .and(query_param("db", "pubmed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "0", "idlist": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/elink.fcgi"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"linksets": []})),
            )
            .mount(&server)
            .await;
        // OpenAlex: the original work plus three citing papers, one DOI-only.
        Mock::given(method("GET"))
            .and(url_path("/works/pmid:19753302"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "https://openalex.org/W1",
                "ids": {"openalex": "https://openalex.org/W1"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/works"))
            .and(query_param("filter", "cites:W1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "id": "https://openalex.org/W2",
                        "display_name": "Citing with pmid",
                        "publication_year": 2020,
                        "ids": {"pmid": "https://pubmed.ncbi.nlm.nih.gov/30000001",
                                "doi": "https://doi.org/10.1/c1"}
                    },
                    {
                        "id": "https://openalex.org/W3",
                        "display_name": "Citing doi only",
                        "publication_year": 2021,
                        "ids": {"doi": "https://doi.org/10.1371/journal.pone.0123456"}
                    },
                    {
                        "id": "https://openalex.org/W4",
                        "display_name": "Citing third",
                        "publication_year": 2022,
                        "ids": {"doi": "https://doi.org/10.1/c3"}
                    }
                ]
            })))
            .mount(&server)
            .await;
        // Semantic Scholar / Europe PMC citations: empty.
        Mock::given(method("GET"))
            .and(url_path("/paper/PMID:19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/MED/19753302/citations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "citationList": {"citation": []}
            })))
            .mount(&server)
            .await;
        // Europe PMC full-text listings: nothing.
        Mock::given(method("GET"))
            .and(url_path("/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"hitCount": 0})),
            )
            .mount(&server)
            .await;
        // Unpaywall knows a PDF for the DOI-only citer.
        Mock::given(method("GET"))
            .and(url_path("/10.1371%2Fjournal.pone.0123456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_oa": true,
                "best_oa_location": {
                    "url_for_pdf": format!("{}/pone.0123456.pdf", server.uri())
                }
            })))
            .mount(&server)
            .await;
        // The PDF server.
        Mock::given(method("GET"))
            .and(url_path("/pone.0123456.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(pdf_body(1_200 * 1024)),
            )
            .mount(&server)
            .await;

        let result = oracle
            .search("GSE12345", 5, 10, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.datasets.len(), 1);
        let aggregate = &result.datasets[0];
        assert_eq!(aggregate.geo.geo_id, "GSE12345");
        assert_eq!(aggregate.statistics.original_papers, 1);
        assert_eq!(aggregate.statistics.citing_papers, 3);
        assert_eq!(aggregate.statistics.successful_downloads, 1);

        // Datastore state: 1 dataset, 4 publications, 4 links, URLs, 1 PDF.
        let stats = oracle.store.stats().await.unwrap();
        assert_eq!(stats.geo_datasets, 1);
        assert_eq!(stats.publications, 4);
        assert_eq!(stats.geo_publication_links, 4);
        assert!(stats.publication_urls >= 1);
        assert_eq!(stats.cached_pdfs, 1);
        assert_eq!(stats.parsed_documents, 1);

        // The DOI-only citer landed under its sanitized DOI filename.
        let pdf = dir
            .path()
            .join("GSE12345")
            .join("citing")
            .join("doi_10.1371_journal.pone.0123456.pdf");
        assert!(pdf.exists());

        // The aggregate is now hot: a fresh enrichment makes no new requests.
        let before = server.received_requests().await.unwrap().len();
        let again = oracle
            .get_geo_data("GSE12345", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again.geo.geo_id, "GSE12345");
        assert_eq!(server.received_requests().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn unknown_accession_surfaces_discovery_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let oracle = oracle_with(&server, dir.path()).await;

        Mock::given(method("GET"))
            .and(url_path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "esearchresult": {"count": "0", "idlist": []}
            })))
            .mount(&server)
            .await;

        let result = oracle
            .search("GSE99999", 5, 10, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.datasets.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].category, "not_found");
    }

    #[tokio::test]
    async fn cancellation_propagates_from_search() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let oracle = oracle_with(&server, dir.path()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = oracle.search("GSE12345", 5, 10, &cancel).await.unwrap_err();
        assert_eq!(err.category(), "cancelled");
    }
}
