//! Top-level CLI parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::entities::Publication;
use crate::error::OracleError;
use crate::pipeline::Oracle;

pub mod health;
pub mod render;

#[derive(Parser, Debug)]
#[command(
    name = "omics-oracle",
    about = "Discover GEO datasets, their publications, and open-access full texts",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON instead of Markdown
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to a config file (default: ~/.config/omics-oracle/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search GEO and the publication sources, enriching matched datasets
    Search {
        /// Free text, a GEO accession (GSE12345), or a PMID
        query: String,
        /// Maximum datasets to enrich
        #[arg(long, default_value = "5")]
        max_datasets: usize,
        /// Maximum loose publications to return
        #[arg(long, default_value = "20")]
        max_publications: usize,
    },
    /// Get the complete enriched record for one GEO accession
    Get {
        /// GEO accession, e.g. GSE12345
        geo_id: String,
    },
    /// Force re-discovery for a GEO accession (invalidates the cache first)
    Discover {
        /// GEO accession, e.g. GSE12345
        geo_id: String,
    },
    /// Collect full-text URLs and download the PDF for one publication
    Download {
        /// PMID (digits), DOI (starts with 10.), PMCID (PMC...), or arXiv id
        id: String,
    },
    /// Drop cached aggregates for the given accessions
    Invalidate {
        /// Comma-separated GEO accessions
        geo_ids: String,
    },
    /// Check external API connectivity
    Health,
    /// Datastore and cache statistics
    Stats,
}

/// The `download` command accepts any identifier the universal-key system
/// knows; shape decides the field.
fn publication_from_id(id: &str) -> Result<Publication, OracleError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(OracleError::InvalidArgument(
            "An identifier is required. Example: omics-oracle download 19753302".into(),
        ));
    }
    let mut publication = Publication::default();
    if id.chars().all(|c| c.is_ascii_digit()) {
        publication.pmid = Some(id.to_string());
    } else if id.len() > 3 && id[..3].eq_ignore_ascii_case("PMC") {
        publication.pmc_id = Some(id.to_string());
    } else if id.starts_with("10.") && id.contains('/') {
        publication.doi = Some(id.to_string());
    } else if id.to_ascii_lowercase().starts_with("arxiv:")
        || id.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        publication.arxiv_id = Some(id.trim_start_matches("arXiv:").trim_start_matches("arxiv:").to_string());
    } else {
        return Err(OracleError::InvalidArgument(format!(
            "Cannot classify \"{id}\". Expected a PMID, DOI, PMCID, or arXiv id"
        )));
    }
    Ok(publication)
}

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), OracleError> {
    let as_json = cli.json;
    match cli.command {
        Commands::Health => {
            let report = health::run_health_check().await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            } else {
                println!("{}", report.to_markdown());
            }
            if !report.all_healthy() {
                std::process::exit(1);
            }
            Ok(())
        }
        command => {
            let config = Config::load(cli.config.as_deref())?;
            let oracle = Oracle::new(config).await?;
            dispatch(&oracle, command, as_json, &cancel).await
        }
    }
}

async fn dispatch(
    oracle: &Oracle,
    command: Commands,
    as_json: bool,
    cancel: &CancellationToken,
) -> Result<(), OracleError> {
    match command {
        Commands::Search {
            query,
            max_datasets,
            max_publications,
        } => {
            let result = oracle
                .search(&query, max_datasets, max_publications, cancel)
                .await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else {
                println!("{}", render::search_result(&result));
            }
            Ok(())
        }
        Commands::Get { geo_id } => {
            let geo_id = crate::entities::dataset::parse_geo_id(&geo_id)?;
            let aggregate = oracle.get_geo_data(&geo_id, cancel).await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&aggregate).unwrap_or_default());
            } else {
                println!("{}", render::aggregate(&aggregate));
            }
            Ok(())
        }
        Commands::Discover { geo_id } => {
            let geo_id = crate::entities::dataset::parse_geo_id(&geo_id)?;
            oracle.invalidate(std::slice::from_ref(&geo_id)).await;
            let aggregate = oracle.get_geo_data(&geo_id, cancel).await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&aggregate).unwrap_or_default());
            } else {
                println!("{}", render::aggregate(&aggregate));
            }
            Ok(())
        }
        Commands::Download { id } => {
            let publication = publication_from_id(&id)?;
            let result = oracle
                .download_publication(&publication, cancel)
                .await?;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else {
                println!("{}", render::download_result(&result));
            }
            Ok(())
        }
        Commands::Invalidate { geo_ids } => {
            let ids: Vec<String> = geo_ids
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(crate::entities::dataset::parse_geo_id)
                .collect::<Result<_, _>>()?;
            oracle.invalidate(&ids).await;
            println!("Invalidated {} cache entr{}.", ids.len(), if ids.len() == 1 { "y" } else { "ies" });
            Ok(())
        }
        Commands::Stats => {
            let store = oracle.store_stats().await?;
            let cache = oracle.cache_stats();
            if as_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "store": store,
                        "cache": cache,
                    }))
                    .unwrap_or_default()
                );
            } else {
                println!("{}", render::stats(&store, &cache));
            }
            Ok(())
        }
        Commands::Health => unreachable!("handled before config load"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publication_from_id_classifies_shapes() {
        assert_eq!(
            publication_from_id("19753302").unwrap().pmid.as_deref(),
            Some("19753302")
        );
        assert_eq!(
            publication_from_id("10.1371/journal.pone.0123456")
                .unwrap()
                .doi
                .as_deref(),
            Some("10.1371/journal.pone.0123456")
        );
        assert_eq!(
            publication_from_id("PMC2798000").unwrap().pmc_id.as_deref(),
            Some("PMC2798000")
        );
        assert_eq!(
            publication_from_id("arXiv:2101.12345")
                .unwrap()
                .arxiv_id
                .as_deref(),
            Some("2101.12345")
        );
        assert!(publication_from_id("").is_err());
        assert!(publication_from_id("not-an-id").is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["omics-oracle", "search", "GSE12345", "--max-datasets", "3"])
            .expect("should parse");
        match cli.command {
            Commands::Search { query, max_datasets, .. } => {
                assert_eq!(query, "GSE12345");
                assert_eq!(max_datasets, 3);
            }
            _ => panic!("expected search"),
        }

        let cli = Cli::try_parse_from(["omics-oracle", "--json", "get", "GSE12345"])
            .expect("should parse");
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Get { .. }));
    }
}
