//! Per-source payload → [`Publication`] mapping. All external records cross
//! into the pipeline through these functions, so identifier cleanup (URL
//! prefixes, numeric ids, stray whitespace) happens exactly once.

use serde_json::Value;

use crate::entities::Publication;
use crate::sources::europepmc::EuropePmcResult;
use crate::sources::openalex::OpenAlexWork;
use crate::sources::semantic_scholar::S2Paper;

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// `https://pubmed.ncbi.nlm.nih.gov/19753302` → `19753302`, already-bare
/// ids pass through.
fn tail_segment(value: &str) -> String {
    value
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(value)
        .to_string()
}

fn doi_from_url(value: &str) -> String {
    let v = value.trim();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi:"] {
        if let Some(rest) = v.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    v.to_string()
}

pub fn from_openalex_work(work: &OpenAlexWork) -> Publication {
    let title = work
        .display_name
        .clone()
        .or_else(|| work.title.clone())
        .unwrap_or_default();
    let authors = work
        .authorships
        .iter()
        .filter_map(|a| a.author.as_ref().and_then(|a| a.display_name.clone()))
        .collect();
    let journal = work
        .primary_location
        .as_ref()
        .and_then(|l| l.source.as_ref())
        .and_then(|s| s.display_name.clone());

    Publication {
        pmid: work.ids.pmid.as_deref().map(tail_segment),
        doi: work.ids.doi.as_deref().map(doi_from_url),
        pmc_id: work.ids.pmcid.as_deref().map(tail_segment),
        arxiv_id: None,
        title: title.trim().to_string(),
        authors,
        journal,
        year: work.publication_year,
        abstract_text: None,
        metadata: serde_json::json!({
            "source": "openalex",
            "openalex_id": work.short_id(),
            "cited_by_count": work.cited_by_count,
        }),
    }
}

pub fn from_s2_paper(paper: &S2Paper) -> Publication {
    Publication {
        pmid: paper.external_ids.pmid(),
        doi: clean(paper.external_ids.doi.as_deref()),
        pmc_id: paper.external_ids.pmcid(),
        arxiv_id: clean(paper.external_ids.arxiv.as_deref()),
        title: paper.title.clone().unwrap_or_default().trim().to_string(),
        authors: paper
            .authors
            .iter()
            .filter_map(|a| clean(a.name.as_deref()))
            .collect(),
        journal: clean(paper.venue.as_deref()),
        year: paper.year,
        abstract_text: clean(paper.abstract_text.as_deref()),
        metadata: serde_json::json!({
            "source": "semantic_scholar",
            "s2_paper_id": paper.paper_id,
            "citation_count": paper.citation_count,
            "is_open_access": paper.is_open_access,
        }),
    }
}

pub fn from_europepmc_result(result: &EuropePmcResult) -> Publication {
    // Citation rows carry the PMID in `id` with source MED.
    let pmid = clean(result.pmid.as_deref()).or_else(|| {
        (result.source.as_deref() == Some("MED"))
            .then(|| clean(result.id.as_deref()))
            .flatten()
            .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
    });
    let authors = result
        .author_string
        .as_deref()
        .map(|s| {
            s.trim_end_matches('.')
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Publication {
        pmid,
        doi: clean(result.doi.as_deref()),
        pmc_id: clean(result.pmcid.as_deref()),
        arxiv_id: None,
        title: result.title.clone().unwrap_or_default().trim().to_string(),
        authors,
        journal: clean(result.journal_title.as_deref()),
        year: result.pub_year.as_deref().and_then(|y| y.trim().parse().ok()),
        abstract_text: clean(result.abstract_text.as_deref()),
        metadata: serde_json::json!({
            "source": "europepmc",
            "is_open_access": result.is_open_access.as_deref() == Some("Y"),
        }),
    }
}

/// PubMed `esummary` document → publication. Documents key ids under
/// `articleids` as `{idtype, value}` pairs.
pub fn from_pubmed_summary(doc: &Value) -> Publication {
    let str_field = |key: &str| clean(doc.get(key).and_then(Value::as_str));

    let mut doi = None;
    let mut pmc_id = None;
    let mut pmid = doc
        .get("uid")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(ids) = doc.get("articleids").and_then(Value::as_array) {
        for id in ids {
            let idtype = id.get("idtype").and_then(Value::as_str).unwrap_or_default();
            let value = clean(id.get("value").and_then(Value::as_str));
            match idtype {
                "doi" => doi = value.map(|v| doi_from_url(&v)),
                "pmc" | "pmcid" => pmc_id = value,
                "pubmed" if pmid.is_none() => pmid = value,
                _ => {}
            }
        }
    }

    let authors = doc
        .get("authors")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| clean(a.get("name").and_then(Value::as_str)))
                .collect()
        })
        .unwrap_or_default();

    let year = str_field("pubdate").and_then(|date| {
        date.split_whitespace()
            .next()
            .and_then(|y| y.parse::<i32>().ok())
    });

    Publication {
        pmid,
        doi,
        pmc_id,
        arxiv_id: None,
        title: str_field("title").unwrap_or_default(),
        authors,
        journal: str_field("fulljournalname").or_else(|| str_field("source")),
        year,
        abstract_text: None,
        metadata: serde_json::json!({"source": "pubmed"}),
    }
}
