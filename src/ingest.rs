//! Ingestion pipeline orchestration.
//!
//! Consumes a decoded tabular file and turns every non-blank data row into
//! one catalog document: headers are canonicalized once per file, each cell
//! runs through type detection, and the row accumulates raw text plus the
//! two search-token families. The whole batch persists in one bulk write.
//!
//! A malformed cell is never a hard error (the detector falls back to
//! STRING); ingestion only rejects structurally broken files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::detect;
use crate::error::{CatalogError, Result};
use crate::models::{
    Attribute, AuditStamped, CatalogDocument, IngestionResult, SourceMetadata,
};
use crate::normalize;
use crate::rows::{self, TabularFile};
use crate::sequence::BusinessIdSequence;
use crate::store::CatalogStore;

/// Per-column header plan, computed once per file.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub original: String,
    pub key: String,
}

pub struct IngestionPipeline {
    store: Arc<dyn CatalogStore>,
    sequence: Arc<BusinessIdSequence>,
    max_rows: usize,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        sequence: Arc<BusinessIdSequence>,
        max_rows: usize,
    ) -> Self {
        Self {
            store,
            sequence,
            max_rows,
        }
    }

    /// Build a pipeline whose id sequence resumes from the store's highest
    /// persisted business identifier. Separate runs against one database
    /// continue the same sequence instead of re-issuing counter values.
    pub async fn resume(store: Arc<dyn CatalogStore>, max_rows: usize) -> Result<Self> {
        let last = store.last_business_id().await?;
        let sequence = Arc::new(BusinessIdSequence::resuming(last.as_deref()));
        Ok(Self {
            store,
            sequence,
            max_rows,
        })
    }

    /// Ingest one tabular file for a tenant.
    ///
    /// Rows that are entirely blank are skipped, not persisted and not
    /// counted. If the bulk persist saves fewer documents than attempted,
    /// the shortfall is surfaced through [`IngestionResult::count`] versus
    /// `attempted`; no per-row rollback or retry happens here.
    pub async fn ingest_file(
        &self,
        path: &Path,
        tenant_id: &str,
        uploaded_by: &str,
    ) -> Result<IngestionResult> {
        let file = rows::read_tabular(path)?;
        if file.rows.len() > self.max_rows {
            return Err(CatalogError::bad_input(format!(
                "{} has {} data rows, more than the configured maximum of {}",
                file.file_name,
                file.rows.len(),
                self.max_rows
            )));
        }

        let uploaded_at = Utc::now();
        let columns = plan_columns(&file.headers);
        let header_map: BTreeMap<String, String> = columns
            .iter()
            .map(|c| (c.key.clone(), c.original.clone()))
            .collect();

        info!(
            tenant = tenant_id,
            file = %file.file_name,
            rows = file.rows.len(),
            columns = columns.len(),
            "ingesting catalog file"
        );

        let mut batch: Vec<CatalogDocument> = Vec::new();
        for (index, row) in file.rows.iter().enumerate() {
            let row_number = index as u64 + 2;
            let Some(mut doc) = build_document(&columns, row, &file, row_number) else {
                continue;
            };
            doc.business_id = self.sequence.next_id();
            doc.source.uploaded_by = uploaded_by.to_string();
            doc.source.uploaded_at = uploaded_at;
            doc.source.headers = header_map.clone();
            doc.set_tenant_id(tenant_id);
            doc.set_created(uploaded_by, uploaded_at);
            batch.push(doc);
        }

        let attempted = batch.len();
        let business_ids: Vec<String> = batch.iter().map(|d| d.business_id.clone()).collect();
        let saved = self.store.bulk_upsert(&batch).await?;
        if saved < attempted {
            warn!(
                tenant = tenant_id,
                file = %file.file_name,
                attempted,
                saved,
                "bulk persist reported a partial failure"
            );
        }

        info!(
            tenant = tenant_id,
            file = %file.file_name,
            saved,
            "ingestion complete"
        );

        Ok(IngestionResult {
            count: saved,
            attempted,
            file_name: file.file_name,
            uploaded_by: uploaded_by.to_string(),
            uploaded_at,
            business_ids,
        })
    }
}

/// Canonicalize every header once.
pub fn plan_columns(headers: &[String]) -> Vec<ColumnPlan> {
    headers
        .iter()
        .map(|header| ColumnPlan {
            original: header.trim().to_string(),
            key: normalize::normalize(header),
        })
        .collect()
}

/// Assemble one document from a data row.
///
/// Returns `None` for a row that yields zero attributes (entirely blank).
/// Business id, tenant and audit fields are stamped by the pipeline; the
/// row itself contributes attributes, raw text, token sets, display name
/// and category.
pub fn build_document(
    columns: &[ColumnPlan],
    row: &[String],
    file: &TabularFile,
    row_number: u64,
) -> Option<CatalogDocument> {
    let mut attributes: Vec<Attribute> = Vec::new();
    let mut raw_text = String::new();
    let mut surface_tokens: BTreeSet<String> = BTreeSet::new();
    let mut normalized_tokens: BTreeSet<String> = BTreeSet::new();
    let mut display_name: Option<String> = None;
    let mut category: Option<String> = None;

    for (column, cell) in columns.iter().zip(row.iter()) {
        let value = cell.trim();
        if value.is_empty() {
            continue;
        }

        let detected = detect::detect_type(value);
        let attribute = Attribute {
            key: column.key.clone(),
            original_key: column.original.clone(),
            value: value.to_string(),
            detected,
            searchable: true,
        };

        raw_text.push_str(&column.original);
        raw_text.push('=');
        raw_text.push_str(value);
        raw_text.push_str("; ");

        surface_tokens.extend(normalize::create_search_tokens(value));
        surface_tokens.extend(
            column
                .key
                .split('_')
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
        normalized_tokens.insert(column.key.clone());
        normalized_tokens.extend(
            normalize::normalize_search_query(value)
                .split_whitespace()
                .map(str::to_string),
        );

        if display_name.is_none() && normalize::is_display_name_field(&column.key) {
            display_name = Some(attribute.value.clone());
        }
        if category.is_none() && normalize::is_category_field(&column.key) {
            category = Some(attribute.value.clone());
        }

        attributes.push(attribute);
    }

    if attributes.is_empty() {
        return None;
    }

    // No display-name-like field in the file: fall back to the first
    // attribute encountered in the row.
    let display_name = display_name.or_else(|| Some(attributes[0].value.clone()));

    let search_tokens = surface_tokens.into_iter().collect::<Vec<_>>().join(" ");
    let epoch = DateTime::<Utc>::MIN_UTC;

    Some(CatalogDocument {
        id: Uuid::new_v4().to_string(),
        business_id: String::new(),
        tenant_id: String::new(),
        display_name,
        category,
        attributes,
        raw_text,
        search_tokens,
        normalized_tokens: normalized_tokens.into_iter().collect(),
        source: SourceMetadata {
            file_name: file.file_name.clone(),
            file_kind: file.kind.as_str().to_string(),
            row_number,
            uploaded_by: String::new(),
            uploaded_at: epoch,
            headers: BTreeMap::new(),
        },
        is_deleted: false,
        deleted_at: None,
        created_at: epoch,
        created_by: String::new(),
        last_modified_at: epoch,
    })
}
