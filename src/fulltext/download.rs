//! The download waterfall: walk sorted candidates sequentially, retry
//! transient failures per URL, validate PDF bytes, deduplicate by content
//! hash, and record every attempt in `download_history`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::entities::{DownloadAttempt, DownloadStatus, Publication, Relationship};
use crate::error::OracleError;
use crate::fulltext::{UrlCandidate, sort_candidates};
use crate::identifiers;
use crate::store::{Datastore, PdfStoreOutcome};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Outcome of one publication's waterfall.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DownloadResult {
    pub identifier_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// True when the bytes matched an artifact already on disk and no new
    /// file was written.
    pub deduplicated: bool,
    pub attempts: Vec<DownloadAttempt>,
}

enum FetchFailure {
    Transient(OracleError),
    Fatal(OracleError),
}

pub struct Downloader {
    client: reqwest::Client,
    store: Datastore,
    min_size: u64,
    max_size: u64,
    per_url_retries: u32,
    retry_delay: Duration,
}

impl Downloader {
    pub fn new(config: &Config, store: Datastore) -> Result<Self, OracleError> {
        Ok(Self {
            client: crate::sources::download_client()?,
            store,
            min_size: config.download.validation.min_size,
            max_size: config.download.validation.max_size,
            per_url_retries: config.download.per_url_retries,
            retry_delay: config.retry_delay(),
        })
    }

    /// Try candidates in sorted order until one yields a valid PDF. Never
    /// raises on exhaustion: the result carries `success = false` and the
    /// recorded attempts instead.
    pub async fn download_with_fallback(
        &self,
        publication: &Publication,
        geo_id: &str,
        relationship: Relationship,
        mut candidates: Vec<UrlCandidate>,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, OracleError> {
        let key = identifiers::key_string(publication)?;
        let filename = identifiers::filename(publication)?;
        sort_candidates(&mut candidates);

        let mut result = DownloadResult {
            identifier_key: key.clone(),
            ..Default::default()
        };

        'candidates: for candidate in &candidates {
            for attempt_number in 1..=self.per_url_retries + 1 {
                if cancel.is_cancelled() {
                    return Err(OracleError::Cancelled);
                }

                match self.fetch_validated(&candidate.url).await {
                    Ok(bytes) => {
                        let stored = self
                            .persist(
                                &key,
                                geo_id,
                                relationship,
                                &filename,
                                candidate,
                                attempt_number,
                                bytes,
                                output_dir,
                                &mut result,
                            )
                            .await?;
                        if stored {
                            return Ok(result);
                        }
                        continue 'candidates;
                    }
                    Err(FetchFailure::Transient(err)) if attempt_number <= self.per_url_retries => {
                        debug!(url = %candidate.url, attempt = attempt_number, %err, "retrying");
                        self.record(
                            &key,
                            candidate,
                            DownloadStatus::Retry,
                            Some(&err),
                            attempt_number,
                            &mut result,
                        )
                        .await?;
                        tokio::time::sleep(self.retry_delay * attempt_number).await;
                    }
                    Err(FetchFailure::Transient(err)) | Err(FetchFailure::Fatal(err)) => {
                        warn!(url = %candidate.url, %err, "candidate failed");
                        self.record(
                            &key,
                            candidate,
                            DownloadStatus::Failed,
                            Some(&err),
                            attempt_number,
                            &mut result,
                        )
                        .await?;
                        continue 'candidates;
                    }
                }
            }
        }

        Ok(result)
    }

    /// GET one URL and validate the body as a PDF within the size bounds.
    async fn fetch_validated(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchFailure::Transient(OracleError::network("download", err)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = crate::sources::retry_after_header(&resp);
            return Err(FetchFailure::Transient(OracleError::RateLimited {
                api: "download".into(),
                retry_after,
            }));
        }
        if status.is_server_error() {
            return Err(FetchFailure::Transient(OracleError::UpstreamUnavailable {
                api: "download".into(),
                status: status.as_u16(),
            }));
        }
        if !status.is_success() {
            return Err(FetchFailure::Fatal(OracleError::network(
                "download",
                format!("HTTP {status}"),
            )));
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|err| FetchFailure::Transient(OracleError::network("download", err)))?;
            if bytes.len() as u64 + chunk.len() as u64 > self.max_size {
                return Err(FetchFailure::Fatal(OracleError::ValidationFailed(format!(
                    "body exceeds maximum size {}",
                    self.max_size
                ))));
            }
            bytes.extend_from_slice(&chunk);
        }

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(FetchFailure::Fatal(OracleError::ValidationFailed(
                "body does not start with %PDF-".into(),
            )));
        }
        if (bytes.len() as u64) < self.min_size {
            return Err(FetchFailure::Fatal(OracleError::ValidationFailed(format!(
                "body is {} bytes, below minimum {}",
                bytes.len(),
                self.min_size
            ))));
        }
        Ok(bytes)
    }

    /// Write validated bytes to the store layout, deduplicate on content
    /// hash, and record the success row. Returns false only if the store
    /// rejected the artifact (treated as a failed candidate).
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        key: &str,
        geo_id: &str,
        relationship: Relationship,
        filename: &str,
        candidate: &UrlCandidate,
        attempt_number: u32,
        bytes: Vec<u8>,
        output_dir: &Path,
        result: &mut DownloadResult,
    ) -> Result<bool, OracleError> {
        let digest = Sha256::digest(&bytes);
        let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let size = bytes.len() as i64;

        let dir = output_dir.join(geo_id).join(relationship.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(filename);
        write_atomic(&target, &bytes).await?;

        let outcome = self
            .store
            .store_pdf(key, &target.to_string_lossy(), &hash, size, &candidate.source)
            .await?;
        let final_path = match outcome {
            PdfStoreOutcome::Stored => target,
            PdfStoreOutcome::DuplicateOf {
                identifier_key,
                file_path,
            } => {
                debug!(key, owner = %identifier_key, "content hash already stored");
                tokio::fs::remove_file(&target).await.ok();
                result.deduplicated = true;
                PathBuf::from(file_path)
            }
        };

        let attempt = DownloadAttempt {
            url: candidate.url.clone(),
            source: candidate.source.clone(),
            status: DownloadStatus::Success,
            error_message: None,
            attempt_number,
            downloaded_at: Some(Utc::now()),
        };
        self.store
            .record_download_attempt(key, &attempt, Some(&final_path.to_string_lossy()), Some(size))
            .await?;
        result.attempts.push(attempt);
        result.success = true;
        result.file_path = Some(final_path);
        result.file_hash = Some(hash);
        Ok(true)
    }

    async fn record(
        &self,
        key: &str,
        candidate: &UrlCandidate,
        status: DownloadStatus,
        error: Option<&OracleError>,
        attempt_number: u32,
        result: &mut DownloadResult,
    ) -> Result<(), OracleError> {
        let attempt = DownloadAttempt {
            url: candidate.url.clone(),
            source: candidate.source.clone(),
            status,
            error_message: error.map(|e| format!("{}: {e}", e.category())),
            attempt_number,
            downloaded_at: Some(Utc::now()),
        };
        self.store
            .record_download_attempt(key, &attempt, None, None)
            .await?;
        result.attempts.push(attempt);
        Ok(())
    }
}

/// Write to a temp sibling then rename, so a crash never leaves a partial
/// artifact under the final name.
async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), OracleError> {
    let tmp = target.with_extension("pdf.part");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, target).await?;
    Ok(())
}
