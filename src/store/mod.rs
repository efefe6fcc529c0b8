//! Storage abstraction for catalog documents.
//!
//! The [`CatalogStore`] trait defines the query/filter/sort primitives and
//! bulk upsert the engine needs, enabling pluggable backends (SQLite,
//! in-memory). The engine never builds backend-specific predicates; it
//! hands every backend the same structured [`StoreQuery`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Attribute, AttributeType, CatalogDocument};

/// One attribute-level predicate: "exists an attribute element with this
/// key satisfying this condition".
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    pub key: String,
    pub condition: FilterCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Attribute value equals a literal.
    Exact(String),
    /// Attribute `numeric_value` within `[min, max]`, inclusive.
    Range { min: f64, max: f64 },
    /// Attribute value is one of a list.
    In(Vec<String>),
    /// Attribute value contains a literal, case-insensitive.
    Contains(String),
}

/// The keyword side of a query: the raw keyword for substring predicates
/// plus the alias-normalized token list for `normalized_tokens` matching.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordClause {
    pub keyword: String,
    pub normalized_tokens: Vec<String>,
}

/// A fully translated store query. Tenant scoping and soft-delete exclusion
/// are implicit in every execution; backends must never return documents
/// from another tenant or flagged deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub tenant_id: String,
    /// Optional exact category predicate, ANDed with the filters.
    pub category: Option<String>,
    /// All filters are ANDed together.
    pub filters: Vec<AttributeFilter>,
    /// When present, the OR-shaped keyword predicate is ANDed with the rest.
    pub keyword: Option<KeywordClause>,
}

impl StoreQuery {
    pub fn for_tenant(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            category: None,
            filters: Vec::new(),
            keyword: None,
        }
    }

    /// Reference predicate semantics, used directly by the in-memory
    /// backend and by tests as the oracle for SQL translations.
    pub fn matches(&self, doc: &CatalogDocument) -> bool {
        if doc.tenant_id != self.tenant_id || doc.is_deleted {
            return false;
        }
        if let Some(category) = &self.category {
            if doc.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if !self
            .filters
            .iter()
            .all(|filter| doc.attributes.iter().any(|attr| filter.matches(attr)))
        {
            return false;
        }
        if let Some(clause) = &self.keyword {
            return clause.matches(doc);
        }
        true
    }
}

impl AttributeFilter {
    fn matches(&self, attr: &Attribute) -> bool {
        if attr.key != self.key {
            return false;
        }
        match &self.condition {
            FilterCondition::Exact(literal) => attr.value == *literal,
            FilterCondition::Range { min, max } => attr
                .detected
                .numeric_value()
                .is_some_and(|n| n >= *min && n <= *max),
            FilterCondition::In(values) => values.iter().any(|v| v == &attr.value),
            FilterCondition::Contains(literal) => attr
                .value
                .to_lowercase()
                .contains(&literal.to_lowercase()),
        }
    }
}

impl KeywordClause {
    fn matches(&self, doc: &CatalogDocument) -> bool {
        let keyword = self.keyword.to_lowercase();
        if let Some(name) = &doc.display_name {
            if name.to_lowercase().contains(&keyword) {
                return true;
            }
        }
        if doc.search_tokens.to_lowercase().contains(&keyword) {
            return true;
        }
        if doc
            .normalized_tokens
            .iter()
            .any(|t| self.normalized_tokens.iter().any(|q| q == t))
        {
            return true;
        }
        doc.attributes
            .iter()
            .filter(|a| a.searchable)
            .any(|a| a.value.to_lowercase().contains(&keyword))
    }
}

/// Sort order for the store-paginated (non-keyword) path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    DisplayName,
    BusinessId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    /// Creation time descending, the default when no sort is specified.
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// One distinct `(key, value, type)` observation from the filter-discovery
/// scan.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTriple {
    pub key: String,
    pub value: String,
    pub attribute_type: AttributeType,
}

/// Abstract document store for the catalog engine.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`bulk_upsert`](CatalogStore::bulk_upsert) | Persist an ingestion batch, returning the saved count |
/// | [`find_by_id`](CatalogStore::find_by_id) | Tenant-scoped, soft-delete-filtered lookup |
/// | [`save`](CatalogStore::save) | Write back one updated document |
/// | [`soft_delete`](CatalogStore::soft_delete) | Flag + timestamp, keeps the record |
/// | [`hard_delete`](CatalogStore::hard_delete) | Permanent, irreversible removal |
/// | [`count`](CatalogStore::count) | Total match count for a query |
/// | [`find_candidates`](CatalogStore::find_candidates) | Bounded, unsorted candidate fetch for ranking |
/// | [`find_page`](CatalogStore::find_page) | Offset-paginated, store-sorted fetch |
/// | [`distinct_attribute_triples`](CatalogStore::distinct_attribute_triples) | Filter-discovery scan |
/// | [`last_business_id`](CatalogStore::last_business_id) | Sequence resume point |
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist a whole ingestion batch in one bulk write. Returns the
    /// number of documents actually saved; callers compare it against the
    /// attempted count to surface partial failures. No per-row rollback.
    async fn bulk_upsert(&self, docs: &[CatalogDocument]) -> Result<usize>;

    async fn find_by_id(&self, tenant_id: &str, id: &str) -> Result<Option<CatalogDocument>>;

    async fn save(&self, doc: &CatalogDocument) -> Result<()>;

    /// Returns false when no live document matched.
    async fn soft_delete(&self, tenant_id: &str, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Returns false when no document matched.
    async fn hard_delete(&self, tenant_id: &str, id: &str) -> Result<bool>;

    async fn count(&self, query: &StoreQuery) -> Result<u64>;

    /// Fetch up to `limit` matching documents with no store-level sort;
    /// ranking happens in the engine after retrieval.
    async fn find_candidates(&self, query: &StoreQuery, limit: usize)
        -> Result<Vec<CatalogDocument>>;

    /// Standard offset pagination, sorted by the store.
    async fn find_page(
        &self,
        query: &StoreQuery,
        offset: u64,
        limit: u64,
        sort: SortSpec,
    ) -> Result<Vec<CatalogDocument>>;

    /// Distinct `(key, value, type)` triples across the tenant's live
    /// documents, optionally narrowed to one key.
    async fn distinct_attribute_triples(
        &self,
        tenant_id: &str,
        key: Option<&str>,
    ) -> Result<Vec<AttributeTriple>>;

    /// Highest business identifier ever persisted, across all tenants and
    /// including soft-deleted documents. Zero-padded year/month/counter
    /// fields make the lexicographic maximum the latest one, so the id
    /// sequence can resume from it after a restart.
    async fn last_business_id(&self) -> Result<Option<String>>;
}
