//! Connectivity probes for the upstream APIs. Each probe knows which
//! pipeline features degrade when its API is down; the report only surfaces
//! that column for probes that failed.

use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use crate::error::OracleError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

struct Probe {
    api: &'static str,
    url: &'static str,
    affects: &'static str,
}

const PROBES: &[Probe] = &[
    Probe {
        api: "NCBI E-utilities",
        url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/einfo.fcgi?retmode=json",
        affects: "GEO metadata, PubMed search, citation links",
    },
    Probe {
        api: "OpenAlex",
        url: "https://api.openalex.org/works?per-page=1",
        affects: "publication search, citation discovery, PDF URLs",
    },
    Probe {
        api: "Semantic Scholar",
        url: "https://api.semanticscholar.org/graph/v1/paper/search?query=test&limit=1",
        affects: "citation discovery",
    },
    Probe {
        api: "Europe PMC",
        url: "https://www.ebi.ac.uk/europepmc/webservices/rest/search?query=test&format=json&pageSize=1",
        affects: "citation discovery, full-text URLs",
    },
    Probe {
        api: "Unpaywall",
        url: "https://api.unpaywall.org/v2/10.1038/nature12373?email=contact@omics-oracle.org",
        affects: "open-access PDF discovery",
    },
    Probe {
        api: "Crossref",
        url: "https://api.crossref.org/works?rows=1",
        affects: "DOI metadata, landing URLs",
    },
    Probe {
        api: "bioRxiv",
        url: "https://api.biorxiv.org/details/biorxiv/10.1101/2020.03.24.004655",
        affects: "preprint PDFs",
    },
    Probe {
        api: "arXiv",
        url: "https://export.arxiv.org/api/query?id_list=2101.00001",
        affects: "preprint PDFs",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub api: String,
    pub healthy: bool,
    /// Latency for healthy probes, a failure description otherwise.
    pub detail: String,
    pub affects: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub results: Vec<ProbeResult>,
}

impl HealthReport {
    pub fn healthy_count(&self) -> usize {
        self.results.iter().filter(|r| r.healthy).count()
    }

    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(|r| r.healthy)
    }

    pub fn to_markdown(&self) -> String {
        let rows: String = self
            .results
            .iter()
            .map(|r| {
                let (status, affects) = if r.healthy {
                    ("ok", "-")
                } else {
                    ("down", r.affects.as_str())
                };
                format!("| {} | {status} | {} | {affects} |\n", r.api, r.detail)
            })
            .collect();
        format!(
            "# OmicsOracle Health Check\n\n\
             | API | Status | Detail | Affects |\n\
             |-----|--------|--------|---------|\n\
             {rows}\nStatus: {}/{} APIs healthy\n",
            self.healthy_count(),
            self.results.len(),
        )
    }
}

impl Probe {
    async fn run(&self, client: &reqwest::Client) -> ProbeResult {
        let started = Instant::now();
        let outcome = client.get(self.url).send().await;
        let elapsed = started.elapsed().as_millis();

        let (healthy, detail) = match outcome {
            Ok(resp) if resp.status().is_success() => (true, format!("{elapsed}ms")),
            Ok(resp) => (
                false,
                format!("HTTP {} after {elapsed}ms", resp.status().as_u16()),
            ),
            Err(err) if err.is_timeout() => (
                false,
                format!("no response within {}s", PROBE_TIMEOUT.as_secs()),
            ),
            Err(err) if err.is_connect() => (false, "connection failed".into()),
            Err(_) => (false, "request error".into()),
        };
        ProbeResult {
            api: self.api.to_string(),
            healthy,
            detail,
            affects: self.affects.to_string(),
        }
    }
}

/// Probe every upstream in parallel. Health runs once per invocation, so
/// the probe client is built fresh rather than shared.
pub async fn run_health_check() -> Result<HealthReport, OracleError> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("omics-oracle/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| OracleError::Config(format!("Failed to build probe client: {err}")))?;

    let results = join_all(PROBES.iter().map(|probe| probe.run(&client))).await;
    Ok(HealthReport { results })
}
