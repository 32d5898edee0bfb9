//! Requirement identifier extraction
//!
//! Scans normalized text for typed requirement tokens of the form
//! `<2-3 uppercase letters>-<digits>` (FR-001, PR-003, SR-001, ...).

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static REQUIREMENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,3}-\d+)\b").unwrap());

/// Extract requirement identifiers from text in first-seen order,
/// duplicates removed.
pub fn extract_requirement_ids(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for caps in REQUIREMENT_ID_RE.captures_iter(text) {
        let id = caps[1].to_string();
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order() {
        let ids = extract_requirement_ids("See FR-001 and PR-003 for details.");
        assert_eq!(ids, vec!["FR-001", "PR-003"]);
    }

    #[test]
    fn test_duplicates_removed() {
        let ids = extract_requirement_ids("FR-001, then PR-003, then FR-001 again");
        assert_eq!(ids, vec!["FR-001", "PR-003"]);
    }

    #[test]
    fn test_two_and_three_letter_prefixes() {
        let ids = extract_requirement_ids("INT-12 precedes FR-9");
        assert_eq!(ids, vec!["INT-12", "FR-9"]);
    }

    #[test]
    fn test_non_matches_ignored() {
        // Lowercase, too-long prefixes, and bare numbers do not qualify
        let ids = extract_requirement_ids("fr-001 ABCD-001 2025-1.0 A-1");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_table_rendered_text() {
        let ids = extract_requirement_ids("| SR-001 | The system shall ... |\n| SR-002 | ... |");
        assert_eq!(ids, vec!["SR-001", "SR-002"]);
    }
}
