//! Search and relevance ranking.
//!
//! Two execution paths share one filter translation:
//!
//! * **Keyword path** — a bounded candidate set (no store-level sort) is
//!   materialized, scored by an additive relevance heuristic, sorted in
//!   memory and paginated from the sorted list. The bound means keyword
//!   search is not transactionally consistent: a document inserted between
//!   the match count and the candidate fetch can change which candidates
//!   are materialized, and one deleted mid-ranking may still appear on a
//!   page already computed. That is an accepted approximation, not a bug.
//! * **Filter-only path** — pagination and sorting are delegated entirely
//!   to the store (offset-based, creation time descending by default).
//!
//! Every operation is tenant-scoped and excludes soft-deleted documents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};
use crate::models::{Attribute, AttributeType, AuditStamped, CatalogDocument};
use crate::normalize;
use crate::store::{
    AttributeFilter, CatalogStore, FilterCondition, KeywordClause, SortDirection, SortField,
    SortSpec, StoreQuery,
};

/// Keys that force display-name reconciliation on keyword candidates.
///
/// Older documents may carry a `display_name` computed before the current
/// heuristic; when any attribute has one of these keys its value wins.
const RECONCILE_NAME_KEYS: &[&str] = &["productname", "product_name", "itemname", "item_name", "name"];

/// One attribute-level filter as accepted at the external interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterKind {
    Exact,
    Range,
    In,
    Contains,
}

/// A search request as accepted at the external interface.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub filters: HashMap<String, FilterSpec>,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<String>,
}

/// One attribute in a search response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeView {
    pub key: String,
    pub display_key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One document in a search response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub product_id: String,
    pub display_name: Option<String>,
    pub category: Option<String>,
    pub attributes: Vec<AttributeView>,
    pub source_headers: std::collections::BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<SearchHit>,
    /// Store-level match count before the candidate cap; pagination
    /// metadata, not the number of ranked candidates.
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// One discoverable filter: a distinct attribute key with its observed
/// value set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDescriptor {
    pub attribute_key: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub available_values: Vec<String>,
}

/// Explicit update payload: replace the display name and/or the whole
/// attribute list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub attributes: Option<Vec<Attribute>>,
}

pub struct SearchEngine {
    store: Arc<dyn CatalogStore>,
    candidate_cap: usize,
    default_page_size: u64,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn CatalogStore>, candidate_cap: usize, default_page_size: u64) -> Self {
        Self {
            store,
            candidate_cap,
            default_page_size,
        }
    }

    /// Execute a search scoped to `tenant_id`.
    pub async fn search(&self, tenant_id: &str, request: &SearchRequest) -> Result<SearchPage> {
        let page_size = request.size.unwrap_or(self.default_page_size).max(1);
        let page = request.page;
        let query = translate_query(tenant_id, request)?;

        let keyword = request
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        match keyword {
            Some(keyword) => {
                self.keyword_search(tenant_id, keyword, query, page, page_size)
                    .await
            }
            None => self.filtered_search(request, query, page, page_size).await,
        }
    }

    async fn keyword_search(
        &self,
        tenant_id: &str,
        keyword: &str,
        query: StoreQuery,
        page: u64,
        page_size: u64,
    ) -> Result<SearchPage> {
        let total = self.store.count(&query).await?;
        if total as usize > self.candidate_cap {
            warn!(
                tenant = tenant_id,
                keyword,
                total,
                cap = self.candidate_cap,
                "keyword matches exceed the candidate cap; ranking a truncated set"
            );
        }

        let mut candidates = self.store.find_candidates(&query, self.candidate_cap).await?;
        debug!(
            tenant = tenant_id,
            keyword,
            candidates = candidates.len(),
            "ranking keyword candidates"
        );

        for doc in &mut candidates {
            reconcile_display_name(doc);
        }

        let keyword_lower = keyword.to_lowercase();
        let mut scored: Vec<(i64, CatalogDocument)> = candidates
            .into_iter()
            .map(|doc| (relevance_score(&doc, &keyword_lower), doc))
            .collect();
        // Stable sort: ties keep their retrieval order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let start = (page * page_size) as usize;
        let items: Vec<SearchHit> = scored
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .map(|(_, doc)| to_hit(&doc))
            .collect();

        Ok(SearchPage {
            items,
            total,
            page,
            page_size,
        })
    }

    async fn filtered_search(
        &self,
        request: &SearchRequest,
        query: StoreQuery,
        page: u64,
        page_size: u64,
    ) -> Result<SearchPage> {
        let total = self.store.count(&query).await?;
        let sort = parse_sort(request.sort_by.as_deref(), request.sort_direction.as_deref())?;
        let docs = self
            .store
            .find_page(&query, page * page_size, page_size, sort)
            .await?;

        Ok(SearchPage {
            items: docs.iter().map(to_hit).collect(),
            total,
            page,
            page_size,
        })
    }

    /// Tenant-scoped lookup; soft-deleted documents read as absent.
    pub async fn get(&self, tenant_id: &str, id: &str) -> Result<CatalogDocument> {
        self.store
            .find_by_id(tenant_id, id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Replace the display name (when non-blank) and/or the attribute list.
    ///
    /// Replacing attributes rebuilds `search_tokens` from the new display
    /// name and attribute values. `normalized_tokens` is intentionally not
    /// recomputed, so alias-side tokens keep their ingestion-time values
    /// after an edit.
    pub async fn update(
        &self,
        tenant_id: &str,
        id: &str,
        request: &UpdateRequest,
    ) -> Result<CatalogDocument> {
        let mut doc = self.get(tenant_id, id).await?;

        if let Some(name) = request.display_name.as_deref() {
            if !name.trim().is_empty() {
                doc.display_name = Some(name.trim().to_string());
            }
        }
        if let Some(attributes) = &request.attributes {
            doc.attributes = attributes.clone();
        }
        if request.attributes.is_some() || request.display_name.is_some() {
            doc.search_tokens = rebuild_search_tokens(&doc);
        }
        doc.touch_modified(Utc::now());

        self.store.save(&doc).await?;
        Ok(doc)
    }

    /// Flag a document deleted; it disappears from all default reads but
    /// the backing record remains.
    pub async fn soft_delete(&self, tenant_id: &str, id: &str) -> Result<()> {
        if self.store.soft_delete(tenant_id, id, Utc::now()).await? {
            Ok(())
        } else {
            Err(CatalogError::NotFound(id.to_string()))
        }
    }

    /// Remove a document permanently. Irreversible.
    pub async fn hard_delete(&self, tenant_id: &str, id: &str) -> Result<()> {
        if self.store.hard_delete(tenant_id, id).await? {
            Ok(())
        } else {
            Err(CatalogError::NotFound(id.to_string()))
        }
    }

    /// Best-effort soft delete of a batch; returns how many matched. No
    /// transactional atomicity across the batch.
    pub async fn bulk_soft_delete(&self, tenant_id: &str, ids: &[String]) -> Result<usize> {
        let now = Utc::now();
        let mut deleted = 0usize;
        for id in ids {
            if self.store.soft_delete(tenant_id, id, now).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Best-effort hard delete of a batch; returns how many matched.
    pub async fn bulk_hard_delete(&self, tenant_id: &str, ids: &[String]) -> Result<usize> {
        let mut deleted = 0usize;
        for id in ids {
            if self.store.hard_delete(tenant_id, id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Scan the tenant's live documents and describe every distinct
    /// attribute key with its observed value set.
    pub async fn available_filters(&self, tenant_id: &str) -> Result<Vec<FilterDescriptor>> {
        let triples = self.store.distinct_attribute_triples(tenant_id, None).await?;
        let mut descriptors: Vec<FilterDescriptor> = Vec::new();
        for triple in triples {
            match descriptors.last_mut() {
                Some(last) if last.attribute_key == triple.key => {
                    last.available_values.push(triple.value);
                }
                _ => descriptors.push(FilterDescriptor {
                    display_name: normalize::display_label(&triple.key),
                    attribute_key: triple.key,
                    attribute_type: triple.attribute_type,
                    available_values: vec![triple.value],
                }),
            }
        }
        Ok(descriptors)
    }

    /// Distinct values observed for one attribute key.
    pub async fn distinct_values(&self, tenant_id: &str, key: &str) -> Result<Vec<String>> {
        let triples = self
            .store
            .distinct_attribute_triples(tenant_id, Some(key))
            .await?;
        Ok(triples.into_iter().map(|t| t.value).collect())
    }
}

/// Translate the external filter map into the structured store query.
pub fn translate_query(tenant_id: &str, request: &SearchRequest) -> Result<StoreQuery> {
    let mut query = StoreQuery::for_tenant(tenant_id);
    query.category = request
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    // Deterministic predicate order regardless of map iteration.
    let mut keys: Vec<&String> = request.filters.keys().collect();
    keys.sort();
    for key in keys {
        let spec = &request.filters[key];
        query.filters.push(AttributeFilter {
            key: key.clone(),
            condition: translate_condition(key, spec)?,
        });
    }

    if let Some(keyword) = request
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        let normalized = normalize::normalize_search_query(keyword);
        query.keyword = Some(KeywordClause {
            keyword: keyword.to_string(),
            normalized_tokens: normalized.split_whitespace().map(str::to_string).collect(),
        });
    }

    Ok(query)
}

fn translate_condition(key: &str, spec: &FilterSpec) -> Result<FilterCondition> {
    match spec.kind {
        FilterKind::Exact => spec
            .value
            .clone()
            .map(FilterCondition::Exact)
            .ok_or_else(|| CatalogError::bad_input(format!("EXACT filter on '{key}' needs a value"))),
        FilterKind::Contains => spec
            .value
            .clone()
            .map(FilterCondition::Contains)
            .ok_or_else(|| {
                CatalogError::bad_input(format!("CONTAINS filter on '{key}' needs a value"))
            }),
        FilterKind::In => {
            let values = spec.values.clone().unwrap_or_default();
            if values.is_empty() {
                return Err(CatalogError::bad_input(format!(
                    "IN filter on '{key}' needs at least one value"
                )));
            }
            Ok(FilterCondition::In(values))
        }
        FilterKind::Range => {
            let min = spec.min.unwrap_or(f64::NEG_INFINITY);
            let max = spec.max.unwrap_or(f64::INFINITY);
            if min > max {
                return Err(CatalogError::bad_input(format!(
                    "RANGE filter on '{key}' has min > max"
                )));
            }
            Ok(FilterCondition::Range { min, max })
        }
    }
}

fn parse_sort(sort_by: Option<&str>, direction: Option<&str>) -> Result<SortSpec> {
    let field = match sort_by {
        None | Some("") | Some("created_at") | Some("createdAt") => SortField::CreatedAt,
        Some("display_name") | Some("displayName") => SortField::DisplayName,
        Some("business_id") | Some("productId") | Some("product_id") => SortField::BusinessId,
        Some(other) => {
            return Err(CatalogError::bad_input(format!("unknown sort field '{other}'")))
        }
    };
    let direction = match direction.map(str::to_lowercase).as_deref() {
        Some("asc") => SortDirection::Asc,
        None | Some("") | Some("desc") => SortDirection::Desc,
        Some(other) => {
            return Err(CatalogError::bad_input(format!(
                "unknown sort direction '{other}'"
            )))
        }
    };
    Ok(SortSpec { field, direction })
}

/// Force `display_name` to the value of a name-like attribute when one
/// exists, reconciling documents stored before a heuristic change.
fn reconcile_display_name(doc: &mut CatalogDocument) {
    if let Some(attr) = doc
        .attributes
        .iter()
        .find(|a| RECONCILE_NAME_KEYS.contains(&a.key.as_str()))
    {
        doc.display_name = Some(attr.value.clone());
    }
}

/// The additive relevance heuristic. Higher is better; callers sort
/// descending with a stable sort.
pub fn relevance_score(doc: &CatalogDocument, keyword_lower: &str) -> i64 {
    let mut score = 0i64;

    // Display name cases are mutually exclusive; only the best applies.
    if let Some(name) = &doc.display_name {
        let name_lower = name.to_lowercase();
        if name_lower == keyword_lower {
            score += 1000;
        } else if name_lower.starts_with(keyword_lower) {
            score += 500;
        } else if name_lower.contains(keyword_lower) {
            score += 250 + (100 - name.chars().count() as i64).max(0);
        } else if is_subsequence(keyword_lower, &name_lower) {
            score += 100;
        }
    }

    if let Some(category) = &doc.category {
        let category_lower = category.to_lowercase();
        if category_lower == keyword_lower {
            score += 200;
        } else if category_lower.contains(keyword_lower) {
            score += 50;
        }
    }

    // Attribute contributions are additive across the whole document.
    for attr in doc.attributes.iter().filter(|a| a.searchable) {
        let value_lower = attr.value.to_lowercase();
        if value_lower == keyword_lower {
            score += 150;
        } else if value_lower.contains(keyword_lower) {
            score += 25;
        }
        if attr.key.to_lowercase().contains(keyword_lower) {
            score += 10;
        }
    }

    score
}

/// Does every character of `needle` appear in `haystack`, in order?
fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut haystack_chars = haystack.chars();
    needle
        .chars()
        .all(|c| haystack_chars.by_ref().any(|h| h == c))
}

fn rebuild_search_tokens(doc: &CatalogDocument) -> String {
    let mut tokens = std::collections::BTreeSet::new();
    if let Some(name) = &doc.display_name {
        tokens.extend(normalize::create_search_tokens(name));
    }
    for attr in &doc.attributes {
        tokens.extend(normalize::create_search_tokens(&attr.value));
    }
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

fn to_hit(doc: &CatalogDocument) -> SearchHit {
    SearchHit {
        id: doc.id.clone(),
        product_id: doc.business_id.clone(),
        display_name: doc.display_name.clone(),
        category: doc.category.clone(),
        attributes: doc
            .attributes
            .iter()
            .map(|attr| AttributeView {
                key: attr.key.clone(),
                display_key: normalize::display_label(&attr.key),
                value: attr.value.clone(),
                attribute_type: attr.detected.attribute_type(),
                numeric_value: attr.detected.numeric_value(),
                unit: attr.detected.unit().map(str::to_string),
            })
            .collect(),
        source_headers: doc.source.headers.clone(),
        created_at: doc.created_at,
        created_by: doc.created_by.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::models::{AttributeValue, SourceMetadata};

    use super::*;

    fn doc_named(name: &str) -> CatalogDocument {
        let now = Utc::now();
        CatalogDocument {
            id: name.to_string(),
            business_id: String::new(),
            tenant_id: "t1".to_string(),
            display_name: Some(name.to_string()),
            category: None,
            attributes: Vec::new(),
            raw_text: String::new(),
            search_tokens: String::new(),
            normalized_tokens: Vec::new(),
            source: SourceMetadata {
                file_name: "t.csv".to_string(),
                file_kind: "delimited-text".to_string(),
                row_number: 2,
                uploaded_by: "u".to_string(),
                uploaded_at: now,
                headers: BTreeMap::new(),
            },
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            created_by: "u".to_string(),
            last_modified_at: now,
        }
    }

    #[test]
    fn display_name_cases_rank_in_order() {
        let exact = relevance_score(&doc_named("Pipe"), "pipe");
        let prefix = relevance_score(&doc_named("Pipe Fitting"), "pipe");
        let contains = relevance_score(&doc_named("Copper Pipe Adapter"), "pipe");
        assert!(exact > prefix, "{exact} vs {prefix}");
        assert!(prefix > contains, "{prefix} vs {contains}");
        assert!(contains > 0);
    }

    #[test]
    fn contains_gets_a_length_bonus() {
        let short = relevance_score(&doc_named("A Pipe B"), "pipe");
        let long = relevance_score(
            &doc_named("An exceedingly long display name mentioning Pipe somewhere"),
            "pipe",
        );
        assert!(short > long);
    }

    #[test]
    fn subsequence_match_scores_last() {
        // "pp" is not a substring of "Pipe" but is a subsequence.
        let score = relevance_score(&doc_named("Pipe"), "pp");
        assert_eq!(score, 100);
        let none = relevance_score(&doc_named("Valve"), "pp");
        assert_eq!(none, 0);
    }

    #[test]
    fn category_and_attribute_contributions_are_additive() {
        let mut doc = doc_named("Widget");
        doc.category = Some("pipe".to_string());
        doc.attributes = vec![
            Attribute {
                key: "pipe_grade".to_string(),
                original_key: "Pipe Grade".to_string(),
                value: "pipe".to_string(),
                detected: AttributeValue::String,
                searchable: true,
            },
            Attribute {
                key: "note".to_string(),
                original_key: "Note".to_string(),
                value: "copper pipe only".to_string(),
                detected: AttributeValue::String,
                searchable: true,
            },
        ];
        // category exact 200, attr1 equal 150 + key 10, attr2 contains 25.
        assert_eq!(relevance_score(&doc, "pipe"), 200 + 150 + 10 + 25);
    }

    #[test]
    fn exact_filter_needs_value() {
        let mut request = SearchRequest::default();
        request.filters.insert(
            "weight".to_string(),
            FilterSpec {
                kind: FilterKind::Exact,
                value: None,
                values: None,
                min: None,
                max: None,
            },
        );
        assert!(matches!(
            translate_query("t1", &request),
            Err(CatalogError::BadInput(_))
        ));
    }

    #[test]
    fn keyword_is_normalized_into_tokens() {
        let request = SearchRequest {
            keyword: Some("25mm copper".to_string()),
            ..Default::default()
        };
        let query = translate_query("t1", &request).unwrap();
        let clause = query.keyword.unwrap();
        assert_eq!(clause.keyword, "25mm copper");
        assert_eq!(clause.normalized_tokens, vec!["25millimeter", "copper"]);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        assert!(parse_sort(Some("score"), None).is_err());
        assert!(parse_sort(Some("display_name"), Some("asc")).is_ok());
    }

    #[test]
    fn reconciliation_prefers_name_like_attribute() {
        let mut doc = doc_named("stale");
        doc.attributes = vec![Attribute {
            key: "product_name".to_string(),
            original_key: "Product Name".to_string(),
            value: "Fresh Name".to_string(),
            detected: AttributeValue::String,
            searchable: true,
        }];
        reconcile_display_name(&mut doc);
        assert_eq!(doc.display_name.as_deref(), Some("Fresh Name"));
    }
}
