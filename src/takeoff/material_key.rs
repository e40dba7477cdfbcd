//! Material grouping keys.
//!
//! Two materials are the same iff their canonical keys are byte-equal. No
//! stemming, no translation: "EPDM" and " epdm " group, "EPDM membrane" does not.

/// Trim surrounding whitespace and fold to lower case.
pub fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Key for a possibly missing name. `None` only when the name is missing
/// or empty; a whitespace-only name groups under `""`.
pub fn canonical_key(name: Option<&str>) -> Option<String> {
    let name = name?;
    if name.is_empty() {
        return None;
    }
    Some(canonicalize(name))
}
