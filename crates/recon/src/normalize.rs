//! Key normalization shared by every join.
//!
//! A normalized key is a transient comparison value. Two raw identifiers
//! denote the same product iff their keys are equal.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::model::Value;

/// Canonical SKU key: trimmed text, spreadsheet float artifacts (`"123.0"`)
/// reduced to the integer string. `None` for blanks and `nan`.
pub fn normalize_sku(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }
    if s.ends_with(".0") {
        if let Ok(n) = s.parse::<f64>() {
            if n.is_finite() {
                let t = n.trunc();
                if t == 0.0 {
                    return Some("0".to_string());
                }
                return Some(format!("{t:.0}"));
            }
        }
    }
    Some(s.to_string())
}

/// Join key of a raw cell. Numbers go through their `Display` form, the same
/// text every other consumer of the cell sees, so a numeric `45` and a text
/// `"45.0"` meet at any magnitude.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Empty => None,
        Value::Number(n) if !n.is_finite() => None,
        Value::Number(_) => normalize_sku(&value.to_string()),
        Value::Text(s) => normalize_sku(s),
    }
}

/// NFKD, combining marks dropped, lowercased.
pub fn fold_text(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    stripped
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Region key: lowercase, accents stripped, en dash to hyphen, spaces to
/// hyphens.
pub fn slugify(s: &str, collapse_hyphens: bool) -> String {
    let lowered = s.trim().to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let slug: String = stripped
        .chars()
        .map(|c| match c {
            '–' | ' ' => '-',
            other => other,
        })
        .collect();
    if !collapse_hyphens {
        return slug;
    }
    let mut out = String::with_capacity(slug.len());
    for c in slug.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}

/// First character uppercased, the rest lowercased.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}
