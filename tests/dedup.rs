//! Cross-dataset deduplication: one paper cited by two GEO series exists
//! once in the store, linked twice, with a single PDF artifact.

use omics_oracle::entities::{GeoDataset, Publication, Relationship};
use omics_oracle::identifiers;
use omics_oracle::store::{Datastore, PdfStoreOutcome};

#[tokio::test]
async fn shared_citer_across_two_datasets() {
    let store = Datastore::in_memory().await.unwrap();

    for geo_id in ["GSE11111", "GSE22222"] {
        store
            .upsert_geo_dataset(&GeoDataset {
                geo_id: geo_id.into(),
                title: Some(format!("{geo_id} series")),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let shared = Publication {
        pmid: Some("37081976".into()),
        doi: Some("10.1093/nar/gkad347".into()),
        title: "A tool citing both series".into(),
        year: Some(2023),
        ..Default::default()
    };

    // Discovery for each dataset persists the same paper.
    let key_first = store.upsert_publication(&shared).await.unwrap();
    store
        .link_geo_publication("GSE11111", &key_first, Relationship::Citing, Some("all"))
        .await
        .unwrap();
    let key_second = store.upsert_publication(&shared).await.unwrap();
    store
        .link_geo_publication("GSE22222", &key_second, Relationship::Citing, Some("all"))
        .await
        .unwrap();
    assert_eq!(key_first, key_second);
    assert_eq!(key_first, identifiers::key_string(&shared).unwrap());

    // Both pipelines downloaded the same bytes; the second is a dedup hit.
    let first = store
        .store_pdf(&key_first, "/store/GSE11111/citing/pmid_37081976.pdf", "aa55", 120_000, "pmc")
        .await
        .unwrap();
    assert_eq!(first, PdfStoreOutcome::Stored);
    let second = store
        .store_pdf(&key_first, "/store/GSE11111/citing/pmid_37081976.pdf", "aa55", 120_000, "pmc")
        .await
        .unwrap();
    assert_eq!(second, PdfStoreOutcome::Stored);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.publications, 1);
    assert_eq!(stats.geo_publication_links, 2);
    assert_eq!(stats.cached_pdfs, 1);

    // Both aggregates see the paper with its PDF attached.
    for geo_id in ["GSE11111", "GSE22222"] {
        let aggregate = store.get_complete_geo_data(geo_id).await.unwrap().unwrap();
        assert_eq!(aggregate.papers.citing.len(), 1);
        assert_eq!(aggregate.papers.citing[0].identifier_key, key_first);
        assert!(aggregate.papers.citing[0].pdf_path.is_some());
    }
}
