//! Code normalization and ordered deduplication
//!
//! Decoders and keyboard-wedge scanners deliver codes with stray whitespace and
//! line endings. Everything downstream works on normalized codes only.

use std::collections::HashSet;

/// Trim surrounding whitespace from a decoded code
///
/// An empty result means the decode carried no usable code.
pub fn normalize_code(raw: &str) -> &str {
    raw.trim()
}

/// Normalize every code, drop empties and repeats, keep first-occurrence order
pub fn dedupe_ordered<I, S>(codes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in codes {
        let code = normalize_code(raw.as_ref());
        if code.is_empty() || seen.contains(code) {
            continue;
        }
        seen.insert(code.to_string());
        out.push(code.to_string());
    }
    out
}

/// Split a block of manually entered codes (one per line) into a clean list
pub fn split_code_lines(text: &str) -> Vec<String> {
    dedupe_ordered(text.lines())
}
