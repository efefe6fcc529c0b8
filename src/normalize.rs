//! Header and token normalization.
//!
//! Arbitrary, human-authored column headers are canonicalized into stable
//! attribute keys: case-folded, symbol-stripped, whitespace/hyphen runs
//! collapsed into a token-joined form, then run through unit-alias and
//! synonym canonicalization. The same alias tables feed value tokenization
//! and keyword-query normalization so that `"25mm"` and `"25 millimeter"`
//! land on the same normalized token.

use std::collections::BTreeSet;

use uuid::Uuid;

/// Short unit forms mapped to their canonical long form.
///
/// Used for key canonicalization (exact, `_alias` suffix, `alias_` prefix —
/// all anchored on underscores, so the single-letter entries are safe here)
/// and, via [`text_unit_aliases`], for substring expansion of values and
/// queries.
const UNIT_ALIASES: &[(&str, &str)] = &[
    ("mm", "millimeter"),
    ("cm", "centimeter"),
    ("km", "kilometer"),
    ("m", "meter"),
    ("inch", "inch"),
    ("in", "inch"),
    ("ft", "foot"),
    ("kg", "kilogram"),
    ("g", "gram"),
    ("lb", "pound"),
    ("pn", "pressure_nominal"),
];

/// Common header synonyms mapped to one canonical concept.
const SYNONYMS: &[(&str, &str)] = &[
    ("dia", "size"),
    ("diameter", "size"),
    ("qty", "quantity"),
    ("count", "quantity"),
    ("wt", "weight"),
    ("mass", "weight"),
    ("len", "length"),
    ("l", "length"),
    ("w", "width"),
    ("h", "height"),
    ("ht", "height"),
    ("mat", "material"),
    ("mtl", "material"),
];

const DISPLAY_NAME_FIELDS: &[&str] = &[
    "name",
    "product_name",
    "item_name",
    "product",
    "title",
    "label",
    "description",
];

const CATEGORY_FIELDS: &[&str] = &["category", "type", "product_type", "product_category"];

const IDENTIFIER_MARKERS: &[&str] = &["id", "sku", "code", "number"];

/// Aliases safe for free-text substring replacement, longest first.
///
/// `m`, `g` and `in` would corrupt arbitrary words when substituted inside
/// running text, so they only participate in the underscore-anchored key
/// passes and the full-token unit match in the type detector.
fn text_unit_aliases() -> Vec<(&'static str, &'static str)> {
    let mut aliases: Vec<(&str, &str)> = UNIT_ALIASES
        .iter()
        .copied()
        .filter(|(alias, canonical)| alias.len() >= 2 && *alias != "in" && alias != canonical)
        .collect();
    aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
    aliases
}

/// Canonicalize an arbitrary column header into a stable attribute key.
///
/// A blank header synthesizes a random `unnamed_column_<8-hex>` placeholder
/// so ingestion never aborts on a missing header cell. Normalizing a key
/// that is already canonical is a no-op.
pub fn normalize(header: &str) -> String {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        return format!("unnamed_column_{suffix}");
    }

    // Underscore counts as a separator so normalizing an already-canonical
    // key is a no-op.
    let lower = trimmed.to_lowercase();
    let mut cleaned = String::with_capacity(lower.len());
    for c in lower.chars() {
        if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
            cleaned.push(c);
        }
    }

    // Collapse runs of separators into one.
    let mut collapsed = String::with_capacity(cleaned.len());
    let mut in_separator = false;
    for c in cleaned.chars() {
        if c == ' ' || c == '-' || c == '_' {
            if !in_separator {
                collapsed.push(' ');
            }
            in_separator = true;
        } else {
            collapsed.push(c);
            in_separator = false;
        }
    }

    let key = collapsed.trim().replace(' ', "_");
    let key = apply_alias_table(&key, UNIT_ALIASES);
    apply_alias_table(&key, SYNONYMS)
}

/// One canonicalization pass: exact match, `_alias` suffix, `alias_` prefix.
/// First match wins.
fn apply_alias_table(key: &str, table: &[(&str, &str)]) -> String {
    for (alias, canonical) in table {
        if key == *alias {
            return (*canonical).to_string();
        }
        let suffix = format!("_{alias}");
        if let Some(stem) = key.strip_suffix(&suffix) {
            return format!("{stem}_{canonical}");
        }
        let prefix = format!("{alias}_");
        if let Some(rest) = key.strip_prefix(&prefix) {
            return format!("{canonical}_{rest}");
        }
    }
    key.to_string()
}

/// Derive the surface search tokens for one cell value.
///
/// Lower-cases and splits on any non-alphanumeric run, adds a
/// hyphen-stripped variant of the whole value when it differs, and adds one
/// alias-expanded copy of the value per unit alias it contains.
pub fn create_search_tokens(value: &str) -> BTreeSet<String> {
    let lower = value.trim().to_lowercase();
    let mut tokens = BTreeSet::new();
    if lower.is_empty() {
        return tokens;
    }

    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if !token.is_empty() {
            tokens.insert(token.to_string());
        }
    }

    let dehyphenated = lower.replace('-', "");
    if dehyphenated != lower && !dehyphenated.is_empty() {
        tokens.insert(dehyphenated);
    }

    for (alias, canonical) in text_unit_aliases() {
        if lower.contains(alias) {
            tokens.insert(lower.replace(alias, canonical));
        }
    }

    tokens
}

/// Normalize a raw search keyword for alias-token matching: lower-case,
/// hyphens to spaces, then unit aliases replaced at any occurrence.
pub fn normalize_search_query(query: &str) -> String {
    let mut normalized = query.trim().to_lowercase().replace('-', " ");
    for (alias, canonical) in text_unit_aliases() {
        normalized = normalized.replace(alias, canonical);
    }
    normalized
}

/// Canonical long form for a unit token matched in full (type detector).
pub fn canonical_unit(unit: &str) -> Option<&'static str> {
    let lower = unit.to_lowercase();
    UNIT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| *canonical)
        .or(match lower.as_str() {
            "millimeter" => Some("millimeter"),
            "centimeter" => Some("centimeter"),
            "kilometer" => Some("kilometer"),
            "meter" => Some("meter"),
            "foot" => Some("foot"),
            "kilogram" => Some("kilogram"),
            "gram" => Some("gram"),
            "pound" => Some("pound"),
            _ => None,
        })
}

/// Heuristic: does this normalized key look like a display name column?
pub fn is_display_name_field(key: &str) -> bool {
    DISPLAY_NAME_FIELDS.contains(&key)
}

/// Heuristic: does this normalized key look like a category column?
pub fn is_category_field(key: &str) -> bool {
    CATEGORY_FIELDS.contains(&key)
}

/// Heuristic: does this normalized key look like an identifier column?
///
/// Part of the key-classification surface alongside the display-name and
/// category tests, exposed for callers that want to treat id-like columns
/// specially. Ingestion itself does not consult it: identifier values stay
/// ordinary searchable attributes, and the display-name fallback takes the
/// first attribute of the row even when that attribute is id-like.
pub fn is_identifier_field(key: &str) -> bool {
    IDENTIFIER_MARKERS.iter().any(|m| key.contains(m))
}

/// Human-friendly label for a normalized key: split on underscores and
/// capitalize each word (`pressure_nominal` -> `Pressure Nominal`).
pub fn display_label(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_symbols_and_joins_tokens() {
        assert_eq!(normalize("Product Name"), "product_name");
        assert_eq!(normalize("  Outer--Diameter  "), "outer_size");
        assert_eq!(normalize("Weight (approx.)"), "weight_approx");
    }

    #[test]
    fn unit_alias_suffix_and_prefix() {
        assert_eq!(normalize("Size (mm)"), "size_millimeter");
        assert_eq!(normalize("mm size"), "millimeter_size");
        assert_eq!(normalize("PN Rating"), "pressure_nominal_rating");
        assert_eq!(normalize("Weight KG"), "weight_kilogram");
    }

    #[test]
    fn synonym_canonicalization() {
        assert_eq!(normalize("Dia"), "size");
        assert_eq!(normalize("Qty"), "quantity");
        assert_eq!(normalize("Item Count"), "item_quantity");
        assert_eq!(normalize("wt"), "weight");
        assert_eq!(normalize("W"), "width");
        assert_eq!(normalize("Mtl Grade"), "material_grade");
    }

    #[test]
    fn normalization_is_idempotent_on_canonical_keys() {
        for header in [
            "Product Name",
            "Size (mm)",
            "PN Rating",
            "Dia",
            "Material",
            "Inner Diameter (in)",
        ] {
            let once = normalize(header);
            assert_eq!(normalize(&once), once, "header {header:?}");
        }
    }

    #[test]
    fn blank_header_gets_placeholder() {
        let key = normalize("   ");
        assert!(key.starts_with("unnamed_column_"), "got {key}");
        assert_eq!(key.len(), "unnamed_column_".len() + 8);
        // Two blank headers never collide.
        assert_ne!(key, normalize(""));
    }

    #[test]
    fn search_tokens_split_and_expand() {
        let tokens = create_search_tokens("Copper-Pipe 25mm");
        assert!(tokens.contains("copper"));
        assert!(tokens.contains("pipe"));
        assert!(tokens.contains("25mm"));
        // Hyphen-stripped whole-value variant.
        assert!(tokens.contains("copperpipe 25mm"));
        // Alias-expanded whole-value variant.
        assert!(tokens.contains("copper-pipe 25millimeter"));
    }

    #[test]
    fn search_tokens_empty_value() {
        assert!(create_search_tokens("  ").is_empty());
    }

    #[test]
    fn query_normalization_replaces_aliases_anywhere() {
        assert_eq!(normalize_search_query("25mm Copper"), "25millimeter copper");
        assert_eq!(normalize_search_query("pipe-fitting"), "pipe fitting");
        assert_eq!(normalize_search_query("2 KG bag"), "2 kilogram bag");
    }

    #[test]
    fn field_classification() {
        assert!(is_display_name_field("product_name"));
        assert!(is_display_name_field("title"));
        assert!(!is_display_name_field("material"));
        assert!(is_category_field("product_type"));
        assert!(!is_category_field("name"));
        assert!(is_identifier_field("sku"));
        assert!(is_identifier_field("part_number"));
        assert!(!is_identifier_field("weight"));
    }

    #[test]
    fn canonical_unit_resolution() {
        assert_eq!(canonical_unit("mm"), Some("millimeter"));
        assert_eq!(canonical_unit("KG"), Some("kilogram"));
        assert_eq!(canonical_unit("m"), Some("meter"));
        assert_eq!(canonical_unit("inch"), Some("inch"));
        assert_eq!(canonical_unit("widgets"), None);
    }

    #[test]
    fn display_labels() {
        assert_eq!(display_label("pressure_nominal"), "Pressure Nominal");
        assert_eq!(display_label("size_millimeter"), "Size Millimeter");
        assert_eq!(display_label("weight"), "Weight");
    }
}
