//! Marketplace name canonicalization.
//!
//! Upstream payloads spell the same marketplace several ways ("C5" vs
//! "C5GAME"). Listings and price rows are keyed by the canonical spelling so
//! that the (entry, platform) join is stable.

/// alias -> canonical. Canonical names map to themselves implicitly.
const ALIASES: &[(&str, &str)] = &[
    ("C5", "C5GAME"),
    ("HALO", "HALOSKINS"),
    ("YOUPIN898", "YOUPIN"),
];

/// Trim, uppercase, then resolve through the alias table. Unknown names pass
/// through uppercased. An empty input yields an empty string.
pub fn canonical_platform_name(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(upper)
}

/// Every spelling that canonicalizes to the same platform as `raw`, canonical
/// name first. Empty input gives an empty list.
pub fn platform_filter_aliases(raw: &str) -> Vec<String> {
    let canonical = canonical_platform_name(raw);
    if canonical.is_empty() {
        return Vec::new();
    }
    let mut out = vec![canonical.clone()];
    out.extend(
        ALIASES
            .iter()
            .filter(|(_, c)| *c == canonical)
            .map(|(alias, _)| alias.to_string()),
    );
    out
}
