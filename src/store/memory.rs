//! In-memory [`CatalogStore`] implementation for tests and small setups.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Every query primitive is a
//! brute-force scan evaluated through [`StoreQuery::matches`], which also
//! makes this backend the reference semantics for the SQL translation.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::CatalogDocument;

use super::{AttributeTriple, CatalogStore, SortDirection, SortField, SortSpec, StoreQuery};

/// In-memory store; share via `Arc`.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, CatalogDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Whether a record physically exists, soft-deleted or not. Test hook
    /// for asserting that soft delete keeps the backing record.
    pub fn contains_raw(&self, id: &str) -> bool {
        self.docs.read().unwrap().contains_key(id)
    }

    fn collect_matches(&self, query: &StoreQuery) -> Vec<CatalogDocument> {
        let docs = self.docs.read().unwrap();
        let mut matches: Vec<CatalogDocument> = docs
            .values()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        // HashMap iteration order is arbitrary; pin it so candidate capping
        // is deterministic.
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_sort(docs: &mut [CatalogDocument], sort: SortSpec) {
    docs.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::DisplayName => a.display_name.cmp(&b.display_name),
            SortField::BusinessId => a.business_id.cmp(&b.business_id),
        };
        let ordering = match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn bulk_upsert(&self, batch: &[CatalogDocument]) -> Result<usize> {
        let mut docs = self.docs.write().unwrap();
        for doc in batch {
            docs.insert(doc.id.clone(), doc.clone());
        }
        Ok(batch.len())
    }

    async fn find_by_id(&self, tenant_id: &str, id: &str) -> Result<Option<CatalogDocument>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .get(id)
            .filter(|doc| doc.tenant_id == tenant_id && !doc.is_deleted)
            .cloned())
    }

    async fn save(&self, doc: &CatalogDocument) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn soft_delete(&self, tenant_id: &str, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        match docs.get_mut(id) {
            Some(doc) if doc.tenant_id == tenant_id && !doc.is_deleted => {
                doc.is_deleted = true;
                doc.deleted_at = Some(at);
                doc.last_modified_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().unwrap();
        match docs.get(id) {
            Some(doc) if doc.tenant_id == tenant_id => {
                docs.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count(&self, query: &StoreQuery) -> Result<u64> {
        Ok(self.collect_matches(query).len() as u64)
    }

    async fn find_candidates(
        &self,
        query: &StoreQuery,
        limit: usize,
    ) -> Result<Vec<CatalogDocument>> {
        let mut matches = self.collect_matches(query);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn find_page(
        &self,
        query: &StoreQuery,
        offset: u64,
        limit: u64,
        sort: SortSpec,
    ) -> Result<Vec<CatalogDocument>> {
        let mut matches = self.collect_matches(query);
        apply_sort(&mut matches, sort);
        Ok(matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn distinct_attribute_triples(
        &self,
        tenant_id: &str,
        key: Option<&str>,
    ) -> Result<Vec<AttributeTriple>> {
        let docs = self.docs.read().unwrap();
        let mut seen: BTreeSet<(String, String, String)> = BTreeSet::new();
        let mut triples = Vec::new();
        for doc in docs.values() {
            if doc.tenant_id != tenant_id || doc.is_deleted {
                continue;
            }
            for attr in &doc.attributes {
                if let Some(wanted) = key {
                    if attr.key != wanted {
                        continue;
                    }
                }
                let attribute_type = attr.detected.attribute_type();
                let fingerprint = (
                    attr.key.clone(),
                    attr.value.clone(),
                    attribute_type.as_str().to_string(),
                );
                if seen.insert(fingerprint) {
                    triples.push(AttributeTriple {
                        key: attr.key.clone(),
                        value: attr.value.clone(),
                        attribute_type,
                    });
                }
            }
        }
        triples.sort_by(|a, b| (&a.key, &a.value).cmp(&(&b.key, &b.value)));
        Ok(triples)
    }

    async fn last_business_id(&self) -> Result<Option<String>> {
        let docs = self.docs.read().unwrap();
        Ok(docs
            .values()
            .map(|doc| doc.business_id.as_str())
            .filter(|id| !id.is_empty())
            .max()
            .map(str::to_string))
    }
}
