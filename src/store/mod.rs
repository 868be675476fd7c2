//! Unified datastore: the durable record of datasets, publications, links,
//! URLs, PDFs, extraction results, and caches. Source of truth for the warm
//! cache tier.
//!
//! All writes are upserts: re-persisting a row refreshes `updated_at` and
//! never duplicates. The aggregate read (`get_complete_geo_data`) is a fixed
//! set of correlated queries, one per table.

mod schema;

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::entities::{
    AggregateStatistics, DownloadAttempt, DownloadStatus, ExtractionSummary, GeoAggregate,
    GeoDataset, PaperGroups, PaperRecord, Publication, Relationship,
};
use crate::error::OracleError;
use crate::fulltext::UrlCandidate;
use crate::identifiers;

const NOT_FOUND_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct Datastore {
    pool: SqlitePool,
}

/// Outcome of persisting a downloaded PDF: either a fresh artifact or a
/// content-hash duplicate pointing at the existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfStoreOutcome {
    Stored,
    DuplicateOf {
        identifier_key: String,
        file_path: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedPdf {
    pub identifier_key: String,
    pub file_path: String,
    pub file_hash: String,
    pub file_size: i64,
    pub source: String,
    pub access_count: i64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub geo_datasets: i64,
    pub publications: i64,
    pub geo_publication_links: i64,
    pub publication_urls: i64,
    pub cached_pdfs: i64,
    pub parsed_documents: i64,
    pub download_attempts: i64,
    pub successful_downloads: i64,
    pub failed_downloads: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiAnalysis {
    pub identifier_key: String,
    pub analysis_type: String,
    pub prompt_hash: String,
    pub response: String,
    pub model: String,
    pub tokens: i64,
}

fn to_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

impl Datastore {
    /// Connect to a database URL (`sqlite::memory:` for tests, a file path
    /// otherwise) and run migrations.
    ///
    /// An in-memory database is private to its connection, so memory URLs
    /// pin a single connection that never closes; anything else gets a pool.
    pub async fn connect(url: &str) -> Result<Self, OracleError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let is_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 8 })
            .min_connections(if is_memory { 1 } else { 0 })
            .idle_timeout(if is_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!(url, "datastore ready");
        Ok(Self { pool })
    }

    pub async fn connect_path(path: &std::path::Path) -> Result<Self, OracleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect(&format!("sqlite://{}", path.display())).await
    }

    pub async fn in_memory() -> Result<Self, OracleError> {
        Self::connect("sqlite::memory:").await
    }

    // --- publications ---------------------------------------------------

    /// Insert or refresh a publication; returns its canonical key. Existing
    /// non-null identifier columns are kept when the new record lacks them.
    pub async fn upsert_publication(
        &self,
        publication: &Publication,
    ) -> Result<String, OracleError> {
        let key = identifiers::key_string(publication)?;
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO publications
                (identifier_key, pmid, doi, pmc_id, arxiv_id, title, authors, journal, year,
                 abstract_text, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identifier_key) DO UPDATE SET
                pmid          = COALESCE(publications.pmid, excluded.pmid),
                doi           = COALESCE(publications.doi, excluded.doi),
                pmc_id        = COALESCE(publications.pmc_id, excluded.pmc_id),
                arxiv_id      = COALESCE(publications.arxiv_id, excluded.arxiv_id),
                title         = CASE WHEN excluded.title != '' THEN excluded.title
                                     ELSE publications.title END,
                authors       = CASE WHEN excluded.authors != '[]' THEN excluded.authors
                                     ELSE publications.authors END,
                journal       = COALESCE(excluded.journal, publications.journal),
                year          = COALESCE(excluded.year, publications.year),
                abstract_text = COALESCE(excluded.abstract_text, publications.abstract_text),
                metadata      = excluded.metadata,
                updated_at    = excluded.updated_at
            "#,
        )
        .bind(&key)
        .bind(&publication.pmid)
        .bind(&publication.doi)
        .bind(&publication.pmc_id)
        .bind(&publication.arxiv_id)
        .bind(&publication.title)
        .bind(to_json(&publication.authors))
        .bind(&publication.journal)
        .bind(publication.year)
        .bind(&publication.abstract_text)
        .bind(to_json(&publication.metadata))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(key)
    }

    pub async fn get_publication(&self, key: &str) -> Result<Option<Publication>, OracleError> {
        let row = sqlx::query(
            "SELECT pmid, doi, pmc_id, arxiv_id, title, authors, journal, year, abstract_text, metadata
             FROM publications WHERE identifier_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| publication_from_row(&row)))
    }

    // --- GEO datasets ---------------------------------------------------

    pub async fn upsert_geo_dataset(&self, dataset: &GeoDataset) -> Result<(), OracleError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO geo_datasets
                (geo_id, title, summary, organism, platform, sample_count, original_pmids,
                 metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(geo_id) DO UPDATE SET
                title          = COALESCE(excluded.title, geo_datasets.title),
                summary        = COALESCE(excluded.summary, geo_datasets.summary),
                organism       = COALESCE(excluded.organism, geo_datasets.organism),
                platform       = COALESCE(excluded.platform, geo_datasets.platform),
                sample_count   = COALESCE(excluded.sample_count, geo_datasets.sample_count),
                original_pmids = CASE WHEN excluded.original_pmids != '[]'
                                      THEN excluded.original_pmids
                                      ELSE geo_datasets.original_pmids END,
                metadata       = excluded.metadata,
                updated_at     = excluded.updated_at
            "#,
        )
        .bind(&dataset.geo_id)
        .bind(&dataset.title)
        .bind(&dataset.summary)
        .bind(&dataset.organism)
        .bind(&dataset.platform)
        .bind(dataset.sample_count)
        .bind(to_json(&dataset.original_pmids))
        .bind(to_json(&dataset.metadata))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_geo_dataset(&self, geo_id: &str) -> Result<Option<GeoDataset>, OracleError> {
        let row = sqlx::query(
            "SELECT geo_id, title, summary, organism, platform, sample_count, original_pmids, metadata
             FROM geo_datasets WHERE geo_id = ?",
        )
        .bind(geo_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| dataset_from_row(&row)))
    }

    pub async fn link_geo_publication(
        &self,
        geo_id: &str,
        identifier_key: &str,
        relationship: Relationship,
        strategy: Option<&str>,
    ) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO geo_publications (geo_id, identifier_key, relationship, strategy, discovered_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(geo_id, identifier_key) DO UPDATE SET
                relationship = CASE WHEN excluded.relationship = 'original'
                                    THEN 'original'
                                    ELSE geo_publications.relationship END,
                strategy     = COALESCE(excluded.strategy, geo_publications.strategy)
            "#,
        )
        .bind(geo_id)
        .bind(identifier_key)
        .bind(relationship.as_str())
        .bind(strategy)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- URL candidates -------------------------------------------------

    /// Append-only on (`identifier_key`, `url`); re-inserting refreshes the
    /// classification fields.
    pub async fn insert_url_candidate(
        &self,
        identifier_key: &str,
        candidate: &UrlCandidate,
    ) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO publication_urls
                (identifier_key, url, url_type, source, priority, confidence, requires_auth,
                 metadata, discovered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identifier_key, url) DO UPDATE SET
                url_type   = excluded.url_type,
                priority   = excluded.priority,
                confidence = excluded.confidence
            "#,
        )
        .bind(identifier_key)
        .bind(&candidate.url)
        .bind(candidate.url_type.as_str())
        .bind(&candidate.source)
        .bind(candidate.priority)
        .bind(candidate.confidence)
        .bind(candidate.requires_auth)
        .bind(to_json(&candidate.metadata))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn url_candidates(
        &self,
        identifier_key: &str,
    ) -> Result<Vec<UrlCandidate>, OracleError> {
        let rows = sqlx::query(
            "SELECT url, url_type, source, priority, confidence, requires_auth, metadata
             FROM publication_urls WHERE identifier_key = ? ORDER BY priority, url",
        )
        .bind(identifier_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| UrlCandidate {
                url: row.get("url"),
                source: row.get("source"),
                priority: row.get("priority"),
                url_type: crate::fulltext::UrlType::parse(row.get::<&str, _>("url_type"))
                    .unwrap_or(crate::fulltext::UrlType::Unknown),
                confidence: row.get("confidence"),
                requires_auth: row.get("requires_auth"),
                metadata: serde_json::from_str(row.get::<&str, _>("metadata"))
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    // --- downloads ------------------------------------------------------

    pub async fn record_download_attempt(
        &self,
        identifier_key: &str,
        attempt: &DownloadAttempt,
        file_path: Option<&str>,
        file_size: Option<i64>,
    ) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO download_history
                (identifier_key, url, source, status, error_message, attempt_number,
                 file_path, file_size, downloaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(identifier_key)
        .bind(&attempt.url)
        .bind(&attempt.source)
        .bind(attempt.status.as_str())
        .bind(&attempt.error_message)
        .bind(attempt.attempt_number)
        .bind(file_path)
        .bind(file_size)
        .bind(attempt.downloaded_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register a validated PDF. When another publication already owns the
    /// same content hash, no new row is written and the existing artifact is
    /// reported, so callers can drop the redundant file.
    pub async fn store_pdf(
        &self,
        identifier_key: &str,
        file_path: &str,
        file_hash: &str,
        file_size: i64,
        source: &str,
    ) -> Result<PdfStoreOutcome, OracleError> {
        let existing = sqlx::query(
            "SELECT identifier_key, file_path FROM cached_pdfs WHERE file_hash = ?",
        )
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            let owner: String = row.get("identifier_key");
            if owner != identifier_key {
                return Ok(PdfStoreOutcome::DuplicateOf {
                    identifier_key: owner,
                    file_path: row.get("file_path"),
                });
            }
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO cached_pdfs
                (identifier_key, file_path, file_hash, file_size, source, downloaded_at,
                 last_accessed, access_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(identifier_key) DO UPDATE SET
                file_path     = excluded.file_path,
                file_hash     = excluded.file_hash,
                file_size     = excluded.file_size,
                source        = excluded.source,
                last_accessed = excluded.last_accessed
            "#,
        )
        .bind(identifier_key)
        .bind(file_path)
        .bind(file_hash)
        .bind(file_size)
        .bind(source)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(PdfStoreOutcome::Stored)
    }

    pub async fn get_cached_pdf(
        &self,
        identifier_key: &str,
    ) -> Result<Option<CachedPdf>, OracleError> {
        let row = sqlx::query(
            "SELECT identifier_key, file_path, file_hash, file_size, source, access_count
             FROM cached_pdfs WHERE identifier_key = ?",
        )
        .bind(identifier_key)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        sqlx::query(
            "UPDATE cached_pdfs SET last_accessed = ?, access_count = access_count + 1
             WHERE identifier_key = ?",
        )
        .bind(Utc::now())
        .bind(identifier_key)
        .execute(&self.pool)
        .await?;
        Ok(Some(CachedPdf {
            identifier_key: row.get("identifier_key"),
            file_path: row.get("file_path"),
            file_hash: row.get("file_hash"),
            file_size: row.get("file_size"),
            source: row.get("source"),
            access_count: row.get::<i64, _>("access_count") + 1,
        }))
    }

    // --- parsed content -------------------------------------------------

    pub async fn upsert_parsed_content(
        &self,
        identifier_key: &str,
        summary: &ExtractionSummary,
    ) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO parsed_content
                (identifier_key, has_fulltext, has_tables, has_figures, word_count, table_count,
                 figure_count, section_count, quality_score, parser_version, content_path, parsed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identifier_key) DO UPDATE SET
                has_fulltext   = excluded.has_fulltext,
                has_tables     = excluded.has_tables,
                has_figures    = excluded.has_figures,
                word_count     = excluded.word_count,
                table_count    = excluded.table_count,
                figure_count   = excluded.figure_count,
                section_count  = excluded.section_count,
                quality_score  = excluded.quality_score,
                parser_version = excluded.parser_version,
                content_path   = excluded.content_path,
                parsed_at      = excluded.parsed_at
            "#,
        )
        .bind(identifier_key)
        .bind(summary.has_fulltext)
        .bind(summary.table_count > 0)
        .bind(summary.figure_count > 0)
        .bind(summary.word_count)
        .bind(summary.table_count)
        .bind(summary.figure_count)
        .bind(summary.section_count)
        .bind(summary.quality_score)
        .bind(&summary.parser_version)
        .bind(&summary.content_path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- citation-discovery cache ---------------------------------------

    /// Non-expired cached identifier keys for `(geo_id, strategy)`. An `all`
    /// entry supersedes per-strategy entries. Hits bump `hit_count`.
    pub async fn citation_cache_get(
        &self,
        geo_id: &str,
        strategy: &str,
    ) -> Result<Option<Vec<String>>, OracleError> {
        let mut keys_to_try = vec![format!("{geo_id}:all")];
        if strategy != "all" {
            keys_to_try.push(format!("{geo_id}:{strategy}"));
        }

        for cache_key in keys_to_try {
            let row = sqlx::query(
                "SELECT result_json, expires_at FROM citation_discovery_cache WHERE cache_key = ?",
            )
            .bind(&cache_key)
            .fetch_optional(&self.pool)
            .await?;
            let Some(row) = row else {
                continue;
            };
            let expires_at: DateTime<Utc> = row.get("expires_at");
            if expires_at <= Utc::now() {
                continue;
            }
            sqlx::query(
                "UPDATE citation_discovery_cache SET hit_count = hit_count + 1 WHERE cache_key = ?",
            )
            .bind(&cache_key)
            .execute(&self.pool)
            .await?;
            let raw: String = row.get("result_json");
            let keys = serde_json::from_str(&raw)
                .map_err(|err| OracleError::malformed("citation cache", err))?;
            return Ok(Some(keys));
        }
        Ok(None)
    }

    pub async fn citation_cache_put(
        &self,
        geo_id: &str,
        strategy: &str,
        identifier_keys: &[String],
        ttl_seconds: i64,
    ) -> Result<(), OracleError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO citation_discovery_cache
                (cache_key, geo_id, strategy, result_json, created_at, expires_at, hit_count)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(cache_key) DO UPDATE SET
                result_json = excluded.result_json,
                created_at  = excluded.created_at,
                expires_at  = excluded.expires_at
            "#,
        )
        .bind(format!("{geo_id}:{strategy}"))
        .bind(geo_id)
        .bind(strategy)
        .bind(to_json(&identifier_keys))
        .bind(now)
        .bind(now + Duration::seconds(ttl_seconds))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- negative cache -------------------------------------------------

    pub async fn not_found_check(&self, api: &str, lookup_key: &str) -> Result<bool, OracleError> {
        let row = sqlx::query(
            "SELECT cached_at FROM not_found_cache WHERE api = ? AND lookup_key = ?",
        )
        .bind(api)
        .bind(lookup_key)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let cached_at: DateTime<Utc> = row.get("cached_at");
        Ok(cached_at + Duration::hours(NOT_FOUND_TTL_HOURS) > Utc::now())
    }

    pub async fn not_found_mark(&self, api: &str, lookup_key: &str) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO not_found_cache (api, lookup_key, cached_at) VALUES (?, ?, ?)
            ON CONFLICT(api, lookup_key) DO UPDATE SET cached_at = excluded.cached_at
            "#,
        )
        .bind(api)
        .bind(lookup_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- AI analyses ----------------------------------------------------

    pub async fn ai_analysis_put(&self, analysis: &AiAnalysis) -> Result<(), OracleError> {
        sqlx::query(
            r#"
            INSERT INTO ai_analysis
                (identifier_key, analysis_type, prompt_hash, response, model, tokens, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(identifier_key, analysis_type, prompt_hash) DO UPDATE SET
                response = excluded.response,
                model    = excluded.model,
                tokens   = excluded.tokens
            "#,
        )
        .bind(&analysis.identifier_key)
        .bind(&analysis.analysis_type)
        .bind(&analysis.prompt_hash)
        .bind(&analysis.response)
        .bind(&analysis.model)
        .bind(analysis.tokens)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ai_analysis_get(
        &self,
        identifier_key: &str,
        analysis_type: &str,
        prompt_hash: &str,
    ) -> Result<Option<AiAnalysis>, OracleError> {
        let row = sqlx::query(
            "SELECT response, model, tokens FROM ai_analysis
             WHERE identifier_key = ? AND analysis_type = ? AND prompt_hash = ?",
        )
        .bind(identifier_key)
        .bind(analysis_type)
        .bind(prompt_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| AiAnalysis {
            identifier_key: identifier_key.to_string(),
            analysis_type: analysis_type.to_string(),
            prompt_hash: prompt_hash.to_string(),
            response: row.get("response"),
            model: row.get("model"),
            tokens: row.get("tokens"),
        }))
    }

    // --- aggregate read -------------------------------------------------

    /// The warm-tier read: one GEO dataset with every linked paper, its
    /// download history, PDF, and extraction record. Five correlated
    /// queries, independent of how many papers are linked.
    pub async fn get_complete_geo_data(
        &self,
        geo_id: &str,
    ) -> Result<Option<GeoAggregate>, OracleError> {
        let Some(geo) = self.get_geo_dataset(geo_id).await? else {
            return Ok(None);
        };

        let paper_rows = sqlx::query(
            r#"
            SELECT p.identifier_key, p.title, p.pmid, p.doi, p.year, p.journal, gp.relationship
            FROM geo_publications gp
            JOIN publications p ON p.identifier_key = gp.identifier_key
            WHERE gp.geo_id = ?
            ORDER BY gp.discovered_at, p.identifier_key
            "#,
        )
        .bind(geo_id)
        .fetch_all(&self.pool)
        .await?;

        let history_rows = sqlx::query(
            r#"
            SELECT dh.identifier_key, dh.url, dh.source, dh.status, dh.error_message,
                   dh.attempt_number, dh.downloaded_at
            FROM download_history dh
            JOIN geo_publications gp ON gp.identifier_key = dh.identifier_key
            WHERE gp.geo_id = ?
            ORDER BY dh.id
            "#,
        )
        .bind(geo_id)
        .fetch_all(&self.pool)
        .await?;

        let pdf_rows = sqlx::query(
            r#"
            SELECT cp.identifier_key, cp.file_path
            FROM cached_pdfs cp
            JOIN geo_publications gp ON gp.identifier_key = cp.identifier_key
            WHERE gp.geo_id = ?
            "#,
        )
        .bind(geo_id)
        .fetch_all(&self.pool)
        .await?;

        let parsed_rows = sqlx::query(
            r#"
            SELECT pc.identifier_key, pc.has_fulltext, pc.word_count, pc.table_count,
                   pc.figure_count, pc.section_count, pc.quality_score, pc.parser_version,
                   pc.content_path
            FROM parsed_content pc
            JOIN geo_publications gp ON gp.identifier_key = pc.identifier_key
            WHERE gp.geo_id = ?
            "#,
        )
        .bind(geo_id)
        .fetch_all(&self.pool)
        .await?;

        let mut history: HashMap<String, Vec<DownloadAttempt>> = HashMap::new();
        for row in &history_rows {
            history
                .entry(row.get("identifier_key"))
                .or_default()
                .push(DownloadAttempt {
                    url: row.get("url"),
                    source: row.get("source"),
                    status: DownloadStatus::parse(row.get::<&str, _>("status"))
                        .unwrap_or(DownloadStatus::Failed),
                    error_message: row.get("error_message"),
                    attempt_number: row.get::<i64, _>("attempt_number") as u32,
                    downloaded_at: row.get("downloaded_at"),
                });
        }
        let mut pdf_paths: HashMap<String, String> = HashMap::new();
        for row in &pdf_rows {
            pdf_paths.insert(row.get("identifier_key"), row.get("file_path"));
        }
        let mut extractions: HashMap<String, ExtractionSummary> = HashMap::new();
        for row in &parsed_rows {
            extractions.insert(
                row.get("identifier_key"),
                ExtractionSummary {
                    has_fulltext: row.get("has_fulltext"),
                    word_count: row.get("word_count"),
                    table_count: row.get("table_count"),
                    figure_count: row.get("figure_count"),
                    section_count: row.get("section_count"),
                    quality_score: row.get("quality_score"),
                    parser_version: row.get("parser_version"),
                    content_path: row.get("content_path"),
                },
            );
        }

        let mut groups = PaperGroups::default();
        for row in &paper_rows {
            let key: String = row.get("identifier_key");
            let record = PaperRecord {
                identifier_key: key.clone(),
                title: row.get("title"),
                pmid: row.get("pmid"),
                doi: row.get("doi"),
                year: row.get("year"),
                journal: row.get("journal"),
                download_history: history.remove(&key).unwrap_or_default(),
                pdf_path: pdf_paths.remove(&key),
                extraction: extractions.remove(&key),
            };
            match row.get::<&str, _>("relationship") {
                "original" => groups.original.push(record),
                _ => groups.citing.push(record),
            }
        }

        let statistics = AggregateStatistics::from_groups(&groups);
        Ok(Some(GeoAggregate {
            geo,
            papers: groups,
            statistics,
            assembled_at: Some(Utc::now()),
        }))
    }

    // --- stats ----------------------------------------------------------

    pub async fn stats(&self) -> Result<StoreStats, OracleError> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
                    .fetch_one(&pool)
                    .await?;
                Ok::<i64, OracleError>(row.get("n"))
            }
        };
        let successes = sqlx::query(
            "SELECT COUNT(DISTINCT identifier_key) AS n FROM download_history WHERE status = 'success'",
        )
        .fetch_one(&self.pool)
        .await?;
        let failures = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT identifier_key) AS n FROM download_history
            WHERE identifier_key NOT IN
                (SELECT identifier_key FROM download_history WHERE status = 'success')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            geo_datasets: count("geo_datasets").await?,
            publications: count("publications").await?,
            geo_publication_links: count("geo_publications").await?,
            publication_urls: count("publication_urls").await?,
            cached_pdfs: count("cached_pdfs").await?,
            parsed_documents: count("parsed_content").await?,
            download_attempts: count("download_history").await?,
            successful_downloads: successes.get("n"),
            failed_downloads: failures.get("n"),
        })
    }
}

fn publication_from_row(row: &sqlx::sqlite::SqliteRow) -> Publication {
    Publication {
        pmid: row.get("pmid"),
        doi: row.get("doi"),
        pmc_id: row.get("pmc_id"),
        arxiv_id: row.get("arxiv_id"),
        title: row.get("title"),
        authors: serde_json::from_str(row.get::<&str, _>("authors")).unwrap_or_default(),
        journal: row.get("journal"),
        year: row.get("year"),
        abstract_text: row.get("abstract_text"),
        metadata: serde_json::from_str(row.get::<&str, _>("metadata"))
            .unwrap_or(serde_json::Value::Null),
    }
}

fn dataset_from_row(row: &sqlx::sqlite::SqliteRow) -> GeoDataset {
    GeoDataset {
        geo_id: row.get("geo_id"),
        title: row.get("title"),
        summary: row.get("summary"),
        organism: row.get("organism"),
        platform: row.get("platform"),
        sample_count: row.get("sample_count"),
        original_pmids: serde_json::from_str(row.get::<&str, _>("original_pmids"))
            .unwrap_or_default(),
        metadata: serde_json::from_str(row.get::<&str, _>("metadata"))
            .unwrap_or(serde_json::Value::Null),
    }
}
