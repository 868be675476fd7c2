//! Markdown rendering for CLI output. JSON output serializes the same
//! values directly.

use crate::entities::{GeoAggregate, PaperRecord};
use crate::fulltext::DownloadResult;
use crate::pipeline::{CacheStats, SearchResult};
use crate::store::StoreStats;

pub fn search_result(result: &SearchResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Search: {}\n\n", result.query));
    if result.from_cache {
        out.push_str("_Served from cache._\n\n");
    }

    if result.datasets.is_empty() {
        out.push_str("No GEO datasets matched.\n");
    }
    for aggregate_entry in &result.datasets {
        out.push_str(&aggregate(aggregate_entry));
        out.push('\n');
    }

    if !result.publications.is_empty() {
        out.push_str(&format!(
            "## Publications ({})\n\n",
            result.publications.len()
        ));
        for publication in &result.publications {
            let year = publication
                .year
                .map(|y| format!(" ({y})"))
                .unwrap_or_default();
            out.push_str(&format!("- {}{year}", publication.title));
            if let Some(journal) = publication.journal.as_deref() {
                out.push_str(&format!(" — {journal}"));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !result.errors.is_empty() {
        out.push_str("## Source errors\n\n");
        for error in &result.errors {
            out.push_str(&format!(
                "- {} ({}): {}\n",
                error.source, error.category, error.message
            ));
        }
    }
    out
}

pub fn aggregate(aggregate: &GeoAggregate) -> String {
    let geo = &aggregate.geo;
    let stats = &aggregate.statistics;
    let mut out = String::new();
    out.push_str(&format!("## {}\n\n", geo.geo_id));
    if let Some(title) = geo.title.as_deref() {
        out.push_str(&format!("**{title}**\n\n"));
    }
    if let Some(organism) = geo.organism.as_deref() {
        out.push_str(&format!("- Organism: {organism}\n"));
    }
    if let Some(platform) = geo.platform.as_deref() {
        out.push_str(&format!("- Platform: {platform}\n"));
    }
    if let Some(samples) = geo.sample_count {
        out.push_str(&format!("- Samples: {samples}\n"));
    }
    out.push_str(&format!(
        "- Papers: {} original, {} citing\n- Downloads: {} ok, {} failed ({:.0}% of papers)\n- Extracted: {}\n",
        stats.original_papers,
        stats.citing_papers,
        stats.successful_downloads,
        stats.failed_downloads,
        stats.success_rate * 100.0,
        stats.extracted_papers,
    ));

    if !aggregate.papers.original.is_empty() {
        out.push_str("\n### Original papers\n\n");
        for paper in &aggregate.papers.original {
            out.push_str(&paper_line(paper));
        }
    }
    if !aggregate.papers.citing.is_empty() {
        out.push_str("\n### Citing papers\n\n");
        for paper in &aggregate.papers.citing {
            out.push_str(&paper_line(paper));
        }
    }
    out
}

fn paper_line(paper: &PaperRecord) -> String {
    let mut line = format!("- `{}` {}", paper.identifier_key, paper.title);
    if let Some(year) = paper.year {
        line.push_str(&format!(" ({year})"));
    }
    if paper.pdf_path.is_some() {
        line.push_str(" [PDF]");
    }
    line.push('\n');
    line
}

pub fn download_result(result: &DownloadResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Download: {}\n\n", result.identifier_key));
    if result.success {
        if let Some(path) = result.file_path.as_deref() {
            out.push_str(&format!("Saved to `{}`", path.display()));
            if result.deduplicated {
                out.push_str(" (existing artifact, deduplicated by content hash)");
            }
            out.push_str(".\n\n");
        }
    } else {
        out.push_str("No candidate URL produced a valid PDF.\n\n");
    }
    if !result.attempts.is_empty() {
        out.push_str("| Source | URL | Status | Attempt |\n|---|---|---|---|\n");
        for attempt in &result.attempts {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                attempt.source,
                attempt.url,
                attempt.status.as_str(),
                attempt.attempt_number
            ));
        }
    }
    out
}

pub fn stats(store: &StoreStats, cache: &CacheStats) -> String {
    format!(
        "# OmicsOracle Statistics\n\n\
         ## Datastore\n\n\
         - GEO datasets: {}\n\
         - Publications: {}\n\
         - Dataset-publication links: {}\n\
         - URL candidates: {}\n\
         - Cached PDFs: {}\n\
         - Parsed documents: {}\n\
         - Download attempts: {} ({} publications succeeded, {} exhausted)\n\n\
         ## Cache\n\n\
         - Hits: {}\n\
         - Misses: {}\n\
         - Promotions: {}\n\
         - Hit rate: {:.1}%\n",
        store.geo_datasets,
        store.publications,
        store.geo_publication_links,
        store.publication_urls,
        store.cached_pdfs,
        store.parsed_documents,
        store.download_attempts,
        store.successful_downloads,
        store.failed_downloads,
        cache.hits,
        cache.misses,
        cache.promotions,
        cache.hit_rate * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AggregateStatistics, GeoDataset, PaperGroups};
    use crate::pipeline::QueryKind;

    #[test]
    fn search_render_includes_errors_section() {
        let result = SearchResult {
            query: "GSE12345".into(),
            kind: QueryKind::GeoId("GSE12345".into()),
            datasets: vec![],
            publications: vec![],
            errors: vec![crate::pipeline::SourceError {
                source: "openalex".into(),
                category: "timeout".into(),
                message: "deadline exceeded".into(),
            }],
            from_cache: false,
        };
        let markdown = search_result(&result);
        assert!(markdown.contains("No GEO datasets matched."));
        assert!(markdown.contains("- openalex (timeout): deadline exceeded"));
    }

    #[test]
    fn aggregate_render_flags_downloaded_papers() {
        let aggregate_value = GeoAggregate {
            geo: GeoDataset {
                geo_id: "GSE1".into(),
                title: Some("Series".into()),
                ..Default::default()
            },
            papers: PaperGroups {
                original: vec![PaperRecord {
                    identifier_key: "pmid:1".into(),
                    title: "Original".into(),
                    year: Some(2009),
                    pdf_path: Some("/store/a.pdf".into()),
                    ..Default::default()
                }],
                citing: vec![],
            },
            statistics: AggregateStatistics::default(),
            assembled_at: None,
        };
        let markdown = aggregate(&aggregate_value);
        assert!(markdown.contains("## GSE1"));
        assert!(markdown.contains("- `pmid:1` Original (2009) [PDF]"));
    }
}
