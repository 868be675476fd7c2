use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;

const CONFIG_PATH_ENV: &str = "OMICS_ORACLE_CONFIG";
const NCBI_API_KEY_ENV: &str = "NCBI_API_KEY";
const S2_API_KEY_ENV: &str = "S2_API_KEY";
const CORE_API_KEY_ENV: &str = "CORE_API_KEY";
const UNPAYWALL_EMAIL_ENV: &str = "UNPAYWALL_EMAIL";

/// Process-wide configuration, loaded once in `main` and threaded through
/// component constructors. Nothing reads it from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub store_root: PathBuf,
    pub hot_cache: HotCacheConfig,
    pub clients: ClientsConfig,
    pub download: DownloadConfig,
    pub citation_discovery: CitationDiscoveryConfig,
    pub search: SearchConfig,
    pub scihub_enabled: bool,
    pub libgen_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotCacheConfig {
    /// "redis" or "memory".
    pub backend: String,
    pub url: Option<String>,
    pub ttl_seconds: u64,
    pub max_memory_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    /// Per-source overrides keyed by source name ("ncbi", "openalex", ...).
    pub per_source: HashMap<String, SourceConfig>,
    /// Optional institutional proxy; absent means the source is skipped.
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_key: Option<String>,
    pub rate_limit_rps: Option<f64>,
    pub timeout_seconds: Option<u64>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Template with a `{doi}` placeholder, e.g.
    /// `https://proxy.example.edu/login?url=https://doi.org/{doi}`.
    pub url_template: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub concurrency: usize,
    pub per_url_retries: u32,
    pub retry_delay_ms: u64,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_size: u64,
    pub max_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationDiscoveryConfig {
    pub strategy_timeout_seconds: u64,
    pub cache_ttl_seconds: i64,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub deadline_seconds: u64,
    pub result_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omics-oracle");
        Self {
            db_path: data_root.join("oracle.db"),
            store_root: data_root.join("pdfs"),
            hot_cache: HotCacheConfig::default(),
            clients: ClientsConfig::default(),
            download: DownloadConfig::default(),
            citation_discovery: CitationDiscoveryConfig::default(),
            search: SearchConfig::default(),
            scihub_enabled: false,
            libgen_enabled: false,
        }
    }
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            url: None,
            ttl_seconds: 7 * 24 * 60 * 60,
            max_memory_entries: 1000,
        }
    }
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            per_source: HashMap::new(),
            proxy: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            per_url_retries: 2,
            retry_delay_ms: 1000,
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_size: 10 * 1024,
            max_size: 200 * 1024 * 1024,
        }
    }
}

impl Default for CitationDiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_seconds: 10,
            cache_ttl_seconds: 7 * 24 * 60 * 60,
            max_results: 100,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 30,
            result_ttl_seconds: 3600,
        }
    }
}

impl Config {
    /// Load from an explicit path, `$OMICS_ORACLE_CONFIG`, or the default
    /// config-dir location; a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, OracleError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .or_else(|| dirs::config_dir().map(|d| d.join("omics-oracle/config.toml"))),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|err| OracleError::Config(format!("{}: {err}", p.display())))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// API keys may come from the environment instead of the config file.
    fn apply_env_overrides(&mut self) {
        for (source, env) in [
            ("ncbi", NCBI_API_KEY_ENV),
            ("semantic_scholar", S2_API_KEY_ENV),
            ("core", CORE_API_KEY_ENV),
            ("unpaywall", UNPAYWALL_EMAIL_ENV),
        ] {
            if let Ok(value) = std::env::var(env)
                && !value.trim().is_empty()
            {
                self.clients
                    .per_source
                    .entry(source.to_string())
                    .or_default()
                    .api_key = Some(value.trim().to_string());
            }
        }
    }

    fn validate(&self) -> Result<(), OracleError> {
        if self.download.validation.min_size >= self.download.validation.max_size {
            return Err(OracleError::Config(
                "download.validation.min_size must be < max_size".into(),
            ));
        }
        if self.download.concurrency == 0 {
            return Err(OracleError::Config(
                "download.concurrency must be >= 1".into(),
            ));
        }
        match self.hot_cache.backend.as_str() {
            "memory" => Ok(()),
            "redis" => {
                if self.hot_cache.url.is_none() {
                    return Err(OracleError::Config(
                        "hot_cache.backend = \"redis\" requires hot_cache.url".into(),
                    ));
                }
                Ok(())
            }
            other => Err(OracleError::Config(format!(
                "Unknown hot_cache.backend \"{other}\". Expected \"redis\" or \"memory\""
            ))),
        }
    }

    pub fn source(&self, name: &str) -> SourceConfig {
        self.clients.per_source.get(name).cloned().unwrap_or_default()
    }

    pub fn api_key(&self, name: &str) -> Option<String> {
        self.source(name).api_key
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.citation_discovery.strategy_timeout_seconds)
    }

    pub fn search_deadline(&self) -> Duration {
        Duration::from_secs(self.search.deadline_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.download.retry_delay_ms)
    }
}
