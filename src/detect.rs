//! Attribute type detection.
//!
//! Given one raw cell string, infer its semantic type through an ordered
//! cascade of pattern tests. The order matters because the patterns
//! overlap: booleans claim `"1"`/`"0"` before the number test, ranges claim
//! `"15-25"` before the hyphen would confuse anything else, and the
//! unit-bearing number test runs before the bare-number test so `"25mm"` is
//! typed as a NUMBER with a unit rather than falling through to STRING.
//!
//! The cascade is total: every non-blank string lands in exactly one branch
//! (STRING is the terminal fallback), so a malformed cell is never a hard
//! error.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::AttributeValue;
use crate::normalize;

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*-\s*(\d+(?:\.\d+)?)$").expect("range pattern")
});

static NUMBER_WITH_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([+-]?\d+(?:\.\d+)?)\s?(mm|cm|km|m|inch|ft|kg|g|lb)$")
        .expect("number-with-unit pattern")
});

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").expect("number pattern"));

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4})$").expect("date pattern"));

/// Detect the semantic type of one raw cell value.
///
/// Blank input yields [`AttributeValue::Unknown`]; everything else lands in
/// exactly one of BOOLEAN, RANGE, NUMBER, DATE or STRING, first match wins.
pub fn detect_type(value: &str) -> AttributeValue {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return AttributeValue::Unknown;
    }

    if let Some(boolean_value) = parse_boolean(trimmed) {
        return AttributeValue::Boolean { boolean_value };
    }

    if let Some(caps) = RANGE_RE.captures(trimmed) {
        let min: f64 = caps[1].parse().unwrap_or(0.0);
        let max: f64 = caps[2].parse().unwrap_or(0.0);
        // Keep the rangeMin <= rangeMax invariant even for authored
        // out-of-order bounds.
        let (range_min, range_max) = if min <= max { (min, max) } else { (max, min) };
        return AttributeValue::Range {
            range_min,
            range_max,
        };
    }

    if let Some(caps) = NUMBER_WITH_UNIT_RE.captures(trimmed) {
        if let Ok(numeric_value) = caps[1].parse::<f64>() {
            let raw_unit = caps[2].to_lowercase();
            let unit = normalize::canonical_unit(&raw_unit)
                .map(str::to_string)
                .unwrap_or(raw_unit);
            return AttributeValue::Number {
                numeric_value,
                unit: Some(unit),
            };
        }
    }

    if NUMBER_RE.is_match(trimmed) {
        if let Ok(numeric_value) = trimmed.parse::<f64>() {
            return AttributeValue::Number {
                numeric_value,
                unit: None,
            };
        }
    }

    if DATE_RE.is_match(trimmed) {
        // Value kept as-is; not parsed into a date object at this layer.
        return AttributeValue::Date;
    }

    AttributeValue::String
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
