//! SQLite [`CatalogStore`] backend.
//!
//! Documents persist in one table; the schema-less parts (attributes,
//! normalized tokens, source metadata) are JSON columns queried through the
//! JSON1 `json_each`/`json_extract` functions. Filter predicates compile to
//! `EXISTS` sub-queries over the attribute array, keyword predicates to
//! case-insensitive `instr` checks, so the engine's structured
//! [`StoreQuery`] maps one-to-one onto SQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{Attribute, AttributeType, CatalogDocument, SourceMetadata};

use super::{
    AttributeTriple, CatalogStore, FilterCondition, SortDirection, SortField, SortSpec, StoreQuery,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// One positional bind value for dynamically built SQL.
enum Bind {
    Text(String),
    Real(f64),
    Int(i64),
}

fn push_filter_predicates(query: &StoreQuery, sql: &mut String, binds: &mut Vec<Bind>) {
    sql.push_str("tenant_id = ? AND is_deleted = 0");
    binds.push(Bind::Text(query.tenant_id.clone()));

    if let Some(category) = &query.category {
        sql.push_str(" AND category = ?");
        binds.push(Bind::Text(category.clone()));
    }

    for filter in &query.filters {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM json_each(catalog_documents.attributes) AS fa \
             WHERE json_extract(fa.value, '$.key') = ?",
        );
        binds.push(Bind::Text(filter.key.clone()));
        match &filter.condition {
            FilterCondition::Exact(literal) => {
                sql.push_str(" AND json_extract(fa.value, '$.value') = ?");
                binds.push(Bind::Text(literal.clone()));
            }
            FilterCondition::Range { min, max } => {
                sql.push_str(
                    " AND json_extract(fa.value, '$.numeric_value') IS NOT NULL \
                     AND json_extract(fa.value, '$.numeric_value') BETWEEN ? AND ?",
                );
                binds.push(Bind::Real(*min));
                binds.push(Bind::Real(*max));
            }
            FilterCondition::In(values) => {
                let placeholders = vec!["?"; values.len().max(1)].join(", ");
                sql.push_str(&format!(
                    " AND json_extract(fa.value, '$.value') IN ({placeholders})"
                ));
                if values.is_empty() {
                    // An empty IN list matches nothing.
                    binds.push(Bind::Text(String::new()));
                    sql.push_str(" AND 0");
                } else {
                    for value in values {
                        binds.push(Bind::Text(value.clone()));
                    }
                }
            }
            FilterCondition::Contains(literal) => {
                sql.push_str(" AND instr(lower(json_extract(fa.value, '$.value')), ?) > 0");
                binds.push(Bind::Text(literal.to_lowercase()));
            }
        }
        sql.push(')');
    }

    if let Some(clause) = &query.keyword {
        let keyword = clause.keyword.to_lowercase();
        sql.push_str(
            " AND (instr(lower(coalesce(display_name, '')), ?) > 0 \
             OR instr(lower(search_tokens), ?) > 0",
        );
        binds.push(Bind::Text(keyword.clone()));
        binds.push(Bind::Text(keyword.clone()));

        if !clause.normalized_tokens.is_empty() {
            let placeholders = vec!["?"; clause.normalized_tokens.len()].join(", ");
            sql.push_str(&format!(
                " OR EXISTS (SELECT 1 FROM json_each(catalog_documents.normalized_tokens) AS nt \
                 WHERE nt.value IN ({placeholders}))"
            ));
            for token in &clause.normalized_tokens {
                binds.push(Bind::Text(token.clone()));
            }
        }

        sql.push_str(
            " OR EXISTS (SELECT 1 FROM json_each(catalog_documents.attributes) AS ka \
             WHERE json_extract(ka.value, '$.searchable') \
             AND instr(lower(json_extract(ka.value, '$.value')), ?) > 0))",
        );
        binds.push(Bind::Text(keyword));
    }
}

fn bind_all<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        q = match bind {
            Bind::Text(s) => q.bind(s.as_str()),
            Bind::Real(f) => q.bind(*f),
            Bind::Int(i) => q.bind(*i),
        };
    }
    q
}

const DOCUMENT_COLUMNS: &str = "id, business_id, tenant_id, display_name, category, attributes, \
    raw_text, search_tokens, normalized_tokens, source_json, is_deleted, deleted_at, created_at, \
    created_by, last_modified_at";

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogDocument> {
    let attributes_json: String = row.get("attributes");
    let attributes: Vec<Attribute> =
        serde_json::from_str(&attributes_json).context("decoding attributes column")?;
    let tokens_json: String = row.get("normalized_tokens");
    let normalized_tokens: Vec<String> =
        serde_json::from_str(&tokens_json).context("decoding normalized_tokens column")?;
    let source_json: String = row.get("source_json");
    let source: SourceMetadata =
        serde_json::from_str(&source_json).context("decoding source_json column")?;

    let deleted_at: Option<i64> = row.get("deleted_at");
    Ok(CatalogDocument {
        id: row.get("id"),
        business_id: row.get("business_id"),
        tenant_id: row.get("tenant_id"),
        display_name: row.get("display_name"),
        category: row.get("category"),
        attributes,
        raw_text: row.get("raw_text"),
        search_tokens: row.get("search_tokens"),
        normalized_tokens,
        source,
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        deleted_at: deleted_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        created_at: DateTime::from_timestamp(row.get("created_at"), 0).unwrap_or_default(),
        created_by: row.get("created_by"),
        last_modified_at: DateTime::from_timestamp(row.get("last_modified_at"), 0)
            .unwrap_or_default(),
    })
}

fn attribute_type_from_tag(tag: &str) -> AttributeType {
    match tag {
        "NUMBER" => AttributeType::Number,
        "BOOLEAN" => AttributeType::Boolean,
        "RANGE" => AttributeType::Range,
        "DATE" => AttributeType::Date,
        "UNKNOWN" => AttributeType::Unknown,
        _ => AttributeType::String,
    }
}

fn sort_clause(sort: SortSpec) -> String {
    let column = match sort.field {
        SortField::CreatedAt => "created_at",
        SortField::DisplayName => "display_name",
        SortField::BusinessId => "business_id",
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    format!("ORDER BY {column} {direction}, id ASC")
}

async fn upsert_one<'e, E>(executor: E, doc: &CatalogDocument) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let attributes = serde_json::to_string(&doc.attributes)?;
    let normalized_tokens = serde_json::to_string(&doc.normalized_tokens)?;
    let source_json = serde_json::to_string(&doc.source)?;
    sqlx::query(
        r#"
        INSERT INTO catalog_documents
            (id, business_id, tenant_id, display_name, category, attributes, raw_text,
             search_tokens, normalized_tokens, source_json, is_deleted, deleted_at,
             created_at, created_by, last_modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            category = excluded.category,
            attributes = excluded.attributes,
            raw_text = excluded.raw_text,
            search_tokens = excluded.search_tokens,
            normalized_tokens = excluded.normalized_tokens,
            source_json = excluded.source_json,
            is_deleted = excluded.is_deleted,
            deleted_at = excluded.deleted_at,
            last_modified_at = excluded.last_modified_at
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.business_id)
    .bind(&doc.tenant_id)
    .bind(&doc.display_name)
    .bind(&doc.category)
    .bind(&attributes)
    .bind(&doc.raw_text)
    .bind(&doc.search_tokens)
    .bind(&normalized_tokens)
    .bind(&source_json)
    .bind(doc.is_deleted as i64)
    .bind(doc.deleted_at.map(|ts| ts.timestamp()))
    .bind(doc.created_at.timestamp())
    .bind(&doc.created_by)
    .bind(doc.last_modified_at.timestamp())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn bulk_upsert(&self, batch: &[CatalogDocument]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut saved = 0usize;
        for doc in batch {
            upsert_one(&mut *tx, doc).await?;
            saved += 1;
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn find_by_id(&self, tenant_id: &str, id: &str) -> Result<Option<CatalogDocument>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM catalog_documents \
             WHERE id = ? AND tenant_id = ? AND is_deleted = 0"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn save(&self, doc: &CatalogDocument) -> Result<()> {
        upsert_one(&self.pool, doc).await
    }

    async fn soft_delete(&self, tenant_id: &str, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE catalog_documents SET is_deleted = 1, deleted_at = ?, last_modified_at = ? \
             WHERE id = ? AND tenant_id = ? AND is_deleted = 0",
        )
        .bind(at.timestamp())
        .bind(at.timestamp())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM catalog_documents WHERE id = ? AND tenant_id = ?")
                .bind(id)
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, query: &StoreQuery) -> Result<u64> {
        let mut sql = "SELECT COUNT(*) FROM catalog_documents WHERE ".to_string();
        let mut binds = Vec::new();
        push_filter_predicates(query, &mut sql, &mut binds);
        let count: i64 = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        Ok(count as u64)
    }

    async fn find_candidates(
        &self,
        query: &StoreQuery,
        limit: usize,
    ) -> Result<Vec<CatalogDocument>> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM catalog_documents WHERE ");
        let mut binds = Vec::new();
        push_filter_predicates(query, &mut sql, &mut binds);
        // No ORDER BY: ranking happens after retrieval, in the engine.
        sql.push_str(" LIMIT ?");
        binds.push(Bind::Int(limit as i64));

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn find_page(
        &self,
        query: &StoreQuery,
        offset: u64,
        limit: u64,
        sort: SortSpec,
    ) -> Result<Vec<CatalogDocument>> {
        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM catalog_documents WHERE ");
        let mut binds = Vec::new();
        push_filter_predicates(query, &mut sql, &mut binds);
        sql.push(' ');
        sql.push_str(&sort_clause(sort));
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Bind::Int(limit as i64));
        binds.push(Bind::Int(offset as i64));

        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn distinct_attribute_triples(
        &self,
        tenant_id: &str,
        key: Option<&str>,
    ) -> Result<Vec<AttributeTriple>> {
        let mut sql = "SELECT DISTINCT json_extract(a.value, '$.key') AS attr_key, \
             json_extract(a.value, '$.value') AS attr_value, \
             json_extract(a.value, '$.type') AS attr_type \
             FROM catalog_documents, json_each(catalog_documents.attributes) AS a \
             WHERE tenant_id = ? AND is_deleted = 0"
            .to_string();
        if key.is_some() {
            sql.push_str(" AND json_extract(a.value, '$.key') = ?");
        }
        sql.push_str(" ORDER BY attr_key, attr_value");

        let mut q = sqlx::query(&sql).bind(tenant_id);
        if let Some(wanted) = key {
            q = q.bind(wanted);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let tag: String = row.get("attr_type");
                AttributeTriple {
                    key: row.get("attr_key"),
                    value: row.get("attr_value"),
                    attribute_type: attribute_type_from_tag(&tag),
                }
            })
            .collect())
    }

    async fn last_business_id(&self) -> Result<Option<String>> {
        let last: Option<String> = sqlx::query("SELECT MAX(business_id) FROM catalog_documents")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        Ok(last)
    }
}
