//! External-source clients and their shared HTTP plumbing.
//!
//! One middleware-wrapped client is shared by every source: retries for
//! transient failures (network errors, 5xx, 429 with `Retry-After`) live in
//! the retry middleware with exponential 1/2/4 s backoff, so individual call
//! sites never loop. Each source awaits its own token bucket before sending.

use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::error::OracleError;

pub mod arxiv;
pub mod biorxiv;
pub mod core;
pub mod crossref;
pub mod europepmc;
pub mod ncbi;
pub mod openalex;
pub mod proxy;
pub mod rate_limit;
pub mod semantic_scholar;
pub mod unpaywall;

const USER_AGENT: &str = concat!("omics-oracle/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 2; // three attempts total
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const BODY_EXCERPT_LEN: usize = 200;

/// Shared retrying client for metadata APIs. Built once per process.
pub fn shared_client() -> Result<ClientWithMiddleware, OracleError> {
    static CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

    if let Some(client) = CLIENT.get() {
        return Ok(client.clone());
    }

    let inner = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| OracleError::Config(format!("Failed to build HTTP client: {err}")))?;

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_secs(1), Duration::from_secs(4))
        .build_with_max_retries(MAX_RETRIES);
    let client = reqwest_middleware::ClientBuilder::new(inner)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    match CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => CLIENT
            .get()
            .cloned()
            .ok_or_else(|| OracleError::Config("HTTP client initialization raced".into())),
    }
}

/// Plain client for PDF downloads. The waterfall owns its per-URL retry
/// policy, so this one carries no retry middleware.
pub fn download_client() -> Result<reqwest::Client, OracleError> {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|err| OracleError::Config(format!("Failed to build download client: {err}")))?;

    match CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => CLIENT
            .get()
            .cloned()
            .ok_or_else(|| OracleError::Config("download client initialization raced".into())),
    }
}

/// Production base URL unless the named env var overrides it (wiremock and
/// mirror deployments point sources elsewhere this way).
pub fn env_base(default: &'static str, env: &str) -> Cow<'static, str> {
    match std::env::var(env) {
        Ok(value) if !value.trim().is_empty() => Cow::Owned(value.trim().to_string()),
        _ => Cow::Borrowed(default),
    }
}

pub fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Read at most [`MAX_BODY_BYTES`] of a response body.
pub async fn read_limited_body(
    resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, OracleError> {
    use futures::StreamExt;

    let mut out: Vec<u8> = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| OracleError::network(api, err))?;
        if out.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(OracleError::malformed(
                api,
                format!("response body exceeds {MAX_BODY_BYTES} bytes"),
            ));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Short lossy excerpt of a body for error messages.
pub fn body_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    let mut excerpt: String = trimmed.chars().take(BODY_EXCERPT_LEN).collect();
    if trimmed.chars().count() > BODY_EXCERPT_LEN {
        excerpt.push('…');
    }
    excerpt
}

/// Map a non-success status onto the error taxonomy. 404s become `NotFound`
/// for the given entity; other 4xx are contract breaks and fail fast.
pub fn status_error(
    api: &str,
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    entity: &str,
    id: &str,
    body: &[u8],
) -> OracleError {
    if status == reqwest::StatusCode::NOT_FOUND {
        return OracleError::not_found(entity, id);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return OracleError::RateLimited {
            api: api.to_string(),
            retry_after,
        };
    }
    if status.is_server_error() {
        return OracleError::UpstreamUnavailable {
            api: api.to_string(),
            status: status.as_u16(),
        };
    }
    OracleError::malformed(api, format!("HTTP {status}: {}", body_excerpt(body)))
}

pub fn retry_after_header(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send a prepared request, then decode JSON, mapping every failure onto the
/// taxonomy. The shared middleware already retried transient failures.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    api: &str,
    entity: &str,
    id: &str,
    req: reqwest_middleware::RequestBuilder,
) -> Result<T, OracleError> {
    let resp = req
        .send()
        .await
        .map_err(|err| OracleError::network(api, err))?;
    let status = resp.status();
    let retry_after = retry_after_header(&resp);
    let bytes = read_limited_body(resp, api).await?;
    if !status.is_success() {
        return Err(status_error(api, status, retry_after, entity, id, &bytes));
    }
    serde_json::from_slice(&bytes).map_err(|err| {
        OracleError::malformed(api, format!("{err}: {}", body_excerpt(&bytes)))
    })
}
