//! End-to-end tests over the in-memory store.
//!
//! These tests run the real pipeline: a catalog file is written to disk,
//! ingested through header normalization and type detection, and then
//! queried through the search engine.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tabcat::error::CatalogError;
use tabcat::ingest::IngestionPipeline;
use tabcat::models::{Attribute, AttributeType, AttributeValue};
use tabcat::search::{FilterKind, FilterSpec, SearchEngine, SearchRequest, UpdateRequest};
use tabcat::sequence::BusinessIdSequence;
use tabcat::store::memory::InMemoryStore;
use tabcat::store::CatalogStore;
use tempfile::TempDir;

const TENANT: &str = "acme";

struct Harness {
    store: Arc<InMemoryStore>,
    pipeline: IngestionPipeline,
    engine: SearchEngine,
    dir: TempDir,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let as_store: Arc<dyn CatalogStore> = store.clone();
    Harness {
        store,
        pipeline: IngestionPipeline::new(
            Arc::clone(&as_store),
            Arc::new(BusinessIdSequence::new()),
            50_000,
        ),
        engine: SearchEngine::new(as_store, 200, 20),
        dir: TempDir::new().unwrap(),
    }
}

impl Harness {
    fn write_csv(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    async fn ingest(&self, name: &str, content: &str) -> tabcat::models::IngestionResult {
        let path = self.write_csv(name, content);
        self.pipeline.ingest_file(&path, TENANT, "tester").await.unwrap()
    }
}

fn keyword_request(keyword: &str) -> SearchRequest {
    SearchRequest {
        keyword: Some(keyword.to_string()),
        ..Default::default()
    }
}

// ─── Ingestion round trip ───────────────────────────────────────────

#[tokio::test]
async fn ingested_rows_come_back_with_detected_types() {
    let h = harness();
    let result = h
        .ingest(
            "catalog.csv",
            "Product Name,Size (mm),In Stock,Category\n\
             Copper Pipe,25,yes,Pipes\n\
             Steel Valve,40,no,Valves\n",
        )
        .await;

    assert_eq!(result.count, 2);
    assert_eq!(result.attempted, 2);
    assert_eq!(result.business_ids.len(), 2);
    assert!(result.business_ids[0].starts_with("DPRD-"));

    let page = h.engine.search(TENANT, &keyword_request("copper pipe")).await.unwrap();
    assert_eq!(page.items[0].display_name.as_deref(), Some("Copper Pipe"));

    let doc = h.engine.get(TENANT, &page.items[0].id).await.unwrap();
    assert_eq!(doc.category.as_deref(), Some("Pipes"));
    let size = doc
        .attributes
        .iter()
        .find(|a| a.key == "size_millimeter")
        .unwrap();
    assert_eq!(size.detected.attribute_type(), AttributeType::Number);
    assert_eq!(size.detected.numeric_value(), Some(25.0));
    assert_eq!(size.original_key, "Size (mm)");
    let stock = doc.attributes.iter().find(|a| a.key == "in_stock").unwrap();
    assert_eq!(stock.detected.attribute_type(), AttributeType::Boolean);
    assert_eq!(doc.source.file_name, "catalog.csv");
    assert_eq!(doc.source.row_number, 2);
    assert_eq!(doc.source.uploaded_by, "tester");
    assert_eq!(doc.created_by, "tester");
}

#[tokio::test]
async fn business_ids_are_unique_across_files() {
    let h = harness();
    let a = h.ingest("a.csv", "Name\nWidget\nGadget\n").await;
    let b = h.ingest("b.csv", "Name\nSprocket\n").await;

    let mut all = a.business_ids.clone();
    all.extend(b.business_ids.clone());
    let before = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), before);
}

// ─── Ranking ────────────────────────────────────────────────────────

#[tokio::test]
async fn keyword_results_rank_exact_before_prefix_before_contains() {
    let h = harness();
    h.ingest(
        "pipes.csv",
        "Product Name,Category\n\
         Copper Pipe Adapter,Fittings\n\
         Pipe Fitting,Fittings\n\
         Pipe,Pipes\n",
    )
    .await;

    let page = h.engine.search(TENANT, &keyword_request("Pipe")).await.unwrap();
    let names: Vec<&str> = page
        .items
        .iter()
        .map(|hit| hit.display_name.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["Pipe", "Pipe Fitting", "Copper Pipe Adapter"]);
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn unit_aliases_bridge_query_and_data() {
    let h = harness();
    h.ingest(
        "sizes.csv",
        "Product Name,Size\nNarrow Pipe,25mm\nWide Pipe,80\n",
    )
    .await;

    // The cell "25mm" also yields the alias-expanded token "25millimeter"
    // at ingestion time, so the long-form query finds it.
    let page = h
        .engine
        .search(TENANT, &keyword_request("25millimeter"))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].display_name.as_deref(), Some("Narrow Pipe"));
}

// ─── Filters ────────────────────────────────────────────────────────

#[tokio::test]
async fn range_filter_is_inclusive_on_both_bounds() {
    let h = harness();
    h.ingest(
        "sizes.csv",
        "Product Name,Diameter\nSmall,10\nLower,20\nUpper,30\nLarge,40\n",
    )
    .await;

    let mut request = SearchRequest::default();
    request.filters.insert(
        "size".to_string(), // "diameter" canonicalizes to "size"
        FilterSpec {
            kind: FilterKind::Range,
            value: None,
            values: None,
            min: Some(20.0),
            max: Some(30.0),
        },
    );
    let page = h.engine.search(TENANT, &request).await.unwrap();
    assert_eq!(page.total, 2);
    let mut names: Vec<&str> = page
        .items
        .iter()
        .map(|hit| hit.display_name.as_deref().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Lower", "Upper"]);
}

#[tokio::test]
async fn filters_and_keyword_compose() {
    let h = harness();
    h.ingest(
        "catalog.csv",
        "Product Name,Material,Category\n\
         Copper Pipe,Copper,Pipes\n\
         Steel Pipe,Steel,Pipes\n\
         Copper Sheet,Copper,Sheets\n",
    )
    .await;

    let mut request = keyword_request("pipe");
    request.filters.insert(
        "material".to_string(),
        FilterSpec {
            kind: FilterKind::Exact,
            value: Some("Copper".to_string()),
            values: None,
            min: None,
            max: None,
        },
    );
    let page = h.engine.search(TENANT, &request).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].display_name.as_deref(), Some("Copper Pipe"));
}

#[tokio::test]
async fn category_narrows_without_keyword() {
    let h = harness();
    h.ingest(
        "catalog.csv",
        "Product Name,Category\nPipe A,Pipes\nValve B,Valves\nPipe C,Pipes\n",
    )
    .await;

    let request = SearchRequest {
        category: Some("Pipes".to_string()),
        ..Default::default()
    };
    let page = h.engine.search(TENANT, &request).await.unwrap();
    assert_eq!(page.total, 2);
}

// ─── Pagination ─────────────────────────────────────────────────────

#[tokio::test]
async fn keyword_pages_slice_the_ranked_list() {
    let h = harness();
    let mut csv = String::from("Product Name\n");
    for i in 0..7 {
        csv.push_str(&format!("Pipe Variant {i}\n"));
    }
    h.ingest("pipes.csv", &csv).await;

    let mut request = keyword_request("pipe");
    request.size = Some(3);
    let first = h.engine.search(TENANT, &request).await.unwrap();
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.total, 7);

    request.page = 2;
    let last = h.engine.search(TENANT, &request).await.unwrap();
    assert_eq!(last.items.len(), 1);

    request.page = 3;
    let past_end = h.engine.search(TENANT, &request).await.unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 7);
}

#[tokio::test]
async fn keyword_total_counts_past_the_candidate_cap() {
    let store = Arc::new(InMemoryStore::new());
    let as_store: Arc<dyn CatalogStore> = store.clone();
    let pipeline = IngestionPipeline::new(
        Arc::clone(&as_store),
        Arc::new(BusinessIdSequence::new()),
        50_000,
    );
    // Cap the candidate set below the number of matches.
    let engine = SearchEngine::new(as_store, 3, 20);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipes.csv");
    let mut csv = String::from("Product Name\n");
    for i in 0..5 {
        csv.push_str(&format!("Pipe Variant {i}\n"));
    }
    fs::write(&path, &csv).unwrap();
    pipeline.ingest_file(&path, TENANT, "tester").await.unwrap();

    let page = engine.search(TENANT, &keyword_request("pipe")).await.unwrap();
    // Only the capped candidates are ranked, but the reported total still
    // reflects every match in the store.
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.total, 5);
}

// ─── Deletion ───────────────────────────────────────────────────────

#[tokio::test]
async fn soft_deleted_documents_vanish_but_records_remain() {
    let h = harness();
    h.ingest("catalog.csv", "Product Name\nPipe\nValve\n").await;

    let page = h.engine.search(TENANT, &keyword_request("pipe")).await.unwrap();
    let id = page.items[0].id.clone();

    h.engine.soft_delete(TENANT, &id).await.unwrap();

    let after = h.engine.search(TENANT, &keyword_request("pipe")).await.unwrap();
    assert_eq!(after.total, 0);
    assert!(matches!(
        h.engine.get(TENANT, &id).await,
        Err(CatalogError::NotFound(_))
    ));
    // The backing record still exists.
    assert!(h.store.contains_raw(&id));

    h.engine.hard_delete(TENANT, &id).await.unwrap();
    assert!(!h.store.contains_raw(&id));
}

#[tokio::test]
async fn bulk_delete_reports_how_many_matched() {
    let h = harness();
    h.ingest("catalog.csv", "Product Name\nPipe\nValve\n").await;

    let page = h.engine.search(TENANT, &SearchRequest::default()).await.unwrap();
    let mut ids: Vec<String> = page.items.iter().map(|hit| hit.id.clone()).collect();
    ids.push("no-such-id".to_string());

    let deleted = h.engine.bulk_soft_delete(TENANT, &ids).await.unwrap();
    assert_eq!(deleted, 2);
}

// ─── Tenant isolation ───────────────────────────────────────────────

#[tokio::test]
async fn tenants_never_see_each_other() {
    let h = harness();
    let path = h.write_csv("catalog.csv", "Product Name\nShared Pipe\n");
    h.pipeline.ingest_file(&path, "tenant-a", "a").await.unwrap();
    h.pipeline.ingest_file(&path, "tenant-b", "b").await.unwrap();

    let a = h.engine.search("tenant-a", &keyword_request("pipe")).await.unwrap();
    assert_eq!(a.total, 1);
    let a_id = a.items[0].id.clone();

    // Cross-tenant reads and deletes miss.
    assert!(h.engine.get("tenant-b", &a_id).await.is_err());
    assert!(h.engine.soft_delete("tenant-b", &a_id).await.is_err());

    let b = h.engine.search("tenant-b", &keyword_request("pipe")).await.unwrap();
    assert_eq!(b.total, 1);
    assert_ne!(b.items[0].id, a_id);
}

// ─── Updates ────────────────────────────────────────────────────────

#[tokio::test]
async fn update_replaces_name_and_rebuilds_surface_tokens() {
    let h = harness();
    h.ingest("catalog.csv", "Product Name\nOld Widget\n").await;

    let page = h.engine.search(TENANT, &keyword_request("widget")).await.unwrap();
    let id = page.items[0].id.clone();

    let updated = h
        .engine
        .update(
            TENANT,
            &id,
            &UpdateRequest {
                display_name: Some("Brass Coupling".to_string()),
                attributes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name.as_deref(), Some("Brass Coupling"));
    assert!(updated.search_tokens.contains("brass"));

    let found = h.engine.search(TENANT, &keyword_request("brass")).await.unwrap();
    assert_eq!(found.items[0].id, id);
}

#[tokio::test]
async fn update_keeps_normalized_tokens_at_ingestion_values() {
    let h = harness();
    h.ingest("catalog.csv", "Product Name,Size\nWidget,25mm\n").await;

    let page = h.engine.search(TENANT, &keyword_request("widget")).await.unwrap();
    let id = page.items[0].id.clone();
    let before = h.engine.get(TENANT, &id).await.unwrap();
    assert!(before
        .normalized_tokens
        .iter()
        .any(|t| t == "25millimeter"));

    let updated = h
        .engine
        .update(
            TENANT,
            &id,
            &UpdateRequest {
                display_name: None,
                attributes: Some(vec![Attribute {
                    key: "material".to_string(),
                    original_key: "Material".to_string(),
                    value: "Steel".to_string(),
                    detected: AttributeValue::String,
                    searchable: true,
                }]),
            },
        )
        .await
        .unwrap();

    // Surface tokens follow the new attribute set.
    assert!(updated.search_tokens.contains("steel"));
    assert!(!updated.search_tokens.contains("25mm"));
    // Normalized tokens stay exactly as ingestion computed them.
    assert_eq!(updated.normalized_tokens, before.normalized_tokens);
}

// ─── Filter discovery ───────────────────────────────────────────────

#[tokio::test]
async fn available_filters_list_distinct_keys_and_values() {
    let h = harness();
    h.ingest(
        "catalog.csv",
        "Product Name,Material\nPipe,Copper\nValve,Steel\nElbow,Copper\n",
    )
    .await;

    let descriptors = h.engine.available_filters(TENANT).await.unwrap();
    let material = descriptors
        .iter()
        .find(|d| d.attribute_key == "material")
        .unwrap();
    assert_eq!(material.display_name, "Material");
    let mut values = material.available_values.clone();
    values.sort();
    assert_eq!(values, vec!["Copper", "Steel"]);

    let values = h.engine.distinct_values(TENANT, "material").await.unwrap();
    assert_eq!(values.len(), 2);
}

// ─── Input rejection ────────────────────────────────────────────────

#[tokio::test]
async fn headerless_file_is_rejected_as_bad_input() {
    let h = harness();
    let path = h.write_csv("empty.csv", "");
    let err = h.pipeline.ingest_file(&path, TENANT, "tester").await.unwrap_err();
    assert!(matches!(err, CatalogError::BadInput(_)));
}

#[tokio::test]
async fn oversized_file_is_rejected_as_bad_input() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = IngestionPipeline::new(store, Arc::new(BusinessIdSequence::new()), 2);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.csv");
    fs::write(&path, "Name\nA\nB\nC\n").unwrap();

    let err = pipeline.ingest_file(&path, TENANT, "tester").await.unwrap_err();
    assert!(matches!(err, CatalogError::BadInput(_)));
}
