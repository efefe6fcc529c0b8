//! Core data models for the catalog engine.
//!
//! These types represent the schema-less documents that flow through the
//! ingestion and search pipeline. The shape of a document is discovered
//! entirely from the uploaded file: there is no predefined schema, only a
//! list of typed [`Attribute`] entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant for a detected attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Range,
    Date,
    Unknown,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "STRING",
            AttributeType::Number => "NUMBER",
            AttributeType::Boolean => "BOOLEAN",
            AttributeType::Range => "RANGE",
            AttributeType::Date => "DATE",
            AttributeType::Unknown => "UNKNOWN",
        }
    }
}

/// The typed payload of an attribute, as a tagged union: only the fields
/// valid for the detected type exist at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeValue {
    String,
    Number {
        numeric_value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Boolean {
        boolean_value: bool,
    },
    Range {
        range_min: f64,
        range_max: f64,
    },
    Date,
    Unknown,
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::String => AttributeType::String,
            AttributeValue::Number { .. } => AttributeType::Number,
            AttributeValue::Boolean { .. } => AttributeType::Boolean,
            AttributeValue::Range { .. } => AttributeType::Range,
            AttributeValue::Date => AttributeType::Date,
            AttributeValue::Unknown => AttributeType::Unknown,
        }
    }

    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            AttributeValue::Number { numeric_value, .. } => Some(*numeric_value),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            AttributeValue::Number { unit, .. } => unit.as_deref(),
            _ => None,
        }
    }
}

/// One schema-less key/value/type entry inside a catalog document; the unit
/// of filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Canonicalized header key (see `normalize`).
    pub key: String,
    /// Header exactly as authored in the uploaded file.
    pub original_key: String,
    /// Trimmed original cell text.
    pub value: String,
    #[serde(flatten)]
    pub detected: AttributeValue,
    /// All ingestion-produced attributes are searchable; reserved for future
    /// suppression of non-searchable fields.
    pub searchable: bool,
}

/// Provenance for a document: where the row came from. Never used in
/// queries or scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub file_name: String,
    pub file_kind: String,
    /// 1-based row number in the source file; the header row is row 1, so
    /// the first data row is row 2.
    pub row_number: u64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    /// `normalized_key -> original header` for every column in the file.
    pub headers: BTreeMap<String, String>,
}

/// The persisted unit: one row of an uploaded file, fully typed and indexed
/// for search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Store-assigned opaque identifier.
    pub id: String,
    /// Human-readable sequential identifier (`DPRD-<year>-<month>-<seq>`),
    /// assigned once at creation, immutable.
    pub business_id: String,
    /// Isolation key; every document belongs to exactly one tenant.
    pub tenant_id: String,
    pub display_name: Option<String>,
    pub category: Option<String>,
    /// The full schema-less payload; never null. Rows yielding zero
    /// attributes are skipped at ingestion, not persisted.
    pub attributes: Vec<Attribute>,
    /// `originalKey=value; ` concatenation for every populated column.
    /// Debugging/audit artifact, not used in scoring.
    pub raw_text: String,
    /// Lower-cased, space-joined surface tokens (values + normalized keys)
    /// for fast substring queries.
    pub search_tokens: String,
    /// Alias-expanded tokens (e.g. a value containing `mm` also yields
    /// `millimeter`) for matching independent of surface spelling.
    pub normalized_tokens: Vec<String>,
    pub source: SourceMetadata,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub last_modified_at: DateTime<Utc>,
}

/// Outcome of one file ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    /// Documents actually saved by the bulk persist. When the store reports
    /// a partial failure this is smaller than `attempted`; rows are not
    /// individually rolled back or retried.
    pub count: usize,
    pub attempted: usize,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub business_ids: Vec<String>,
}

/// Capability contract for tenant-scoped, audit-tracked records.
///
/// The persistence boundary stamps these fields through explicit calls, not
/// runtime field lookup by name.
pub trait AuditStamped {
    fn tenant_id(&self) -> &str;
    fn set_tenant_id(&mut self, tenant_id: &str);
    fn set_created(&mut self, by: &str, at: DateTime<Utc>);
    fn touch_modified(&mut self, at: DateTime<Utc>);
}

impl AuditStamped for CatalogDocument {
    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn set_tenant_id(&mut self, tenant_id: &str) {
        self.tenant_id = tenant_id.to_string();
    }

    fn set_created(&mut self, by: &str, at: DateTime<Utc>) {
        self.created_by = by.to_string();
        self.created_at = at;
        self.last_modified_at = at;
    }

    fn touch_modified(&mut self, at: DateTime<Utc>) {
        self.last_modified_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_serializes_with_type_tag() {
        let attr = Attribute {
            key: "size_millimeter".to_string(),
            original_key: "Size (mm)".to_string(),
            value: "25".to_string(),
            detected: AttributeValue::Number {
                numeric_value: 25.0,
                unit: Some("millimeter".to_string()),
            },
            searchable: true,
        };
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["type"], "NUMBER");
        assert_eq!(json["numeric_value"], 25.0);
        assert_eq!(json["unit"], "millimeter");
        let back: Attribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn string_attribute_has_no_numeric_fields() {
        let attr = Attribute {
            key: "material".to_string(),
            original_key: "Material".to_string(),
            value: "copper".to_string(),
            detected: AttributeValue::String,
            searchable: true,
        };
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["type"], "STRING");
        assert!(json.get("numeric_value").is_none());
        assert!(json.get("boolean_value").is_none());
        assert_eq!(attr.detected.numeric_value(), None);
    }

    #[test]
    fn range_bounds_round_trip() {
        let detected = AttributeValue::Range {
            range_min: 15.0,
            range_max: 25.0,
        };
        assert_eq!(detected.attribute_type(), AttributeType::Range);
        let json = serde_json::to_value(&detected).unwrap();
        assert_eq!(json["range_min"], 15.0);
        assert_eq!(json["range_max"], 25.0);
    }
}
