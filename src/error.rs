use std::time::Duration;

/// Error taxonomy for the discovery pipeline.
///
/// Client code never loops on transient variants itself: retries live in the
/// shared HTTP middleware and in the download waterfall. Higher layers use
/// [`OracleError::is_retriable`] and [`OracleError::category`] to decide
/// whether a failure is soft (recorded per source) or hard (surfaced).
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{api}: network error: {message}")]
    Network { api: String, message: String },

    #[error("{api}: rate limited")]
    RateLimited {
        api: String,
        retry_after: Option<Duration>,
    },

    #[error("{api}: upstream unavailable (HTTP {status})")]
    UpstreamUnavailable { api: String, status: u16 },

    #[error("{entity} \"{id}\" not found")]
    NotFound { entity: String, id: String },

    #[error("{api}: malformed response: {message}")]
    MalformedResponse { api: String, message: String },

    #[error("downloaded body failed validation: {0}")]
    ValidationFailed(String),

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OracleError {
    /// Transient failures that a retry may cure.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimited { .. } | Self::UpstreamUnavailable { .. }
        )
    }

    /// Stable category name recorded in `download_history.error_message`
    /// prefixes and per-source status maps.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Network { .. } => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::NotFound { .. } => "not_found",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
        }
    }

    pub(crate) fn network(api: &str, err: impl std::fmt::Display) -> Self {
        Self::Network {
            api: api.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(api: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            api: api.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<reqwest_middleware::Error> for OracleError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::Network {
            api: "http".into(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            api: "http".into(),
            message: err.to_string(),
        }
    }
}
