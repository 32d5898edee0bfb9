//! Document Control / Document History metadata extraction
//!
//! Locates the control table (or a list-form fallback) in the normalized
//! block sequence and parses it into a typed metadata record. Tolerates
//! heterogeneous hand-authored layouts by matching labels and column names
//! rather than positions. Missing metadata is never an error: pages with no
//! recognizable control table still index at reduced fidelity.

use crate::normalize::Block;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static DOCUMENT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)document\s*id").unwrap());
static APPROVED_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)approved\s*by").unwrap());
static APPROVAL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)approval\s*date").unwrap());
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)version").unwrap());
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)status").unwrap());
static CREATED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)created").unwrap());
static UPDATED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)updated").unwrap());
static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)owner|author").unwrap());

/// Recognized requirement-document classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Abrd,
    Fbrd,
    #[default]
    Unknown,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Abrd => write!(f, "ABRD"),
            DocumentType::Fbrd => write!(f, "FBRD"),
            DocumentType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One row of the Document History table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
}

/// Metadata recovered from a page's control and history tables.
///
/// Every field is optional except `document_type`, which always resolves
/// (defaulting to [`DocumentType::Unknown`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: Option<String>,
    pub document_type: DocumentType,
    pub project_code: Option<String>,
    pub version_label: Option<String>,
    pub status: Option<String>,
    pub author: Option<String>,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
    pub approved_by: Option<String>,
    pub approval_date: Option<String>,
    pub history: Vec<HistoryEntry>,
}

impl DocumentMetadata {
    /// True when no control-table field was recovered at all.
    pub fn is_unset(&self) -> bool {
        self.document_id.is_none()
            && self.version_label.is_none()
            && self.status.is_none()
            && self.author.is_none()
            && self.created_date.is_none()
            && self.updated_date.is_none()
            && self.approved_by.is_none()
            && self.approval_date.is_none()
            && self.history.is_empty()
    }

    /// Apply one key/value pair; returns false for unrecognized labels.
    fn apply_field(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        if DOCUMENT_ID_RE.is_match(key) {
            self.document_id = Some(value.to_string());
            let (doc_type, project_code) = classify_document_id(value);
            self.document_type = doc_type;
            self.project_code = project_code;
        } else if APPROVED_BY_RE.is_match(key) {
            self.approved_by = Some(value.to_string());
        } else if APPROVAL_DATE_RE.is_match(key) {
            self.approval_date = Some(value.to_string());
        } else if VERSION_RE.is_match(key) {
            self.version_label = Some(value.to_string());
        } else if STATUS_RE.is_match(key) {
            self.status = Some(value.to_string());
        } else if CREATED_RE.is_match(key) {
            self.created_date = Some(value.to_string());
        } else if UPDATED_RE.is_match(key) {
            self.updated_date = Some(value.to_string());
        } else if AUTHOR_RE.is_match(key) {
            self.author = Some(value.to_string());
        } else {
            tracing::debug!("unrecognized control-table label: {:?}", key);
            return false;
        }
        true
    }
}

/// Result of scanning a block sequence for metadata.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtraction {
    pub metadata: DocumentMetadata,
    /// Indices of blocks consumed as control/history tables; the section
    /// splitter excludes these from document content.
    pub consumed: HashSet<usize>,
}

/// Locate and parse the Document Control and Document History tables.
///
/// Fallback chain: control table → top-of-document key/value list → unset
/// metadata with `document_type = UNKNOWN`.
pub fn extract_metadata(blocks: &[Block]) -> MetadataExtraction {
    let mut extraction = MetadataExtraction::default();

    if let Some((idx, rows)) = find_control_table(blocks) {
        for row in rows {
            if row.len() >= 2 {
                extraction.metadata.apply_field(&row[0], &row[1]);
            }
        }
        extraction.consumed.insert(idx);
    } else if let Some(idx) = apply_list_fallback(blocks, &mut extraction.metadata) {
        extraction.consumed.insert(idx);
    }

    if let Some((idx, entries)) = find_history_table(blocks, &extraction.consumed) {
        extraction.metadata.history = entries;
        extraction.consumed.insert(idx);
    }

    extraction
}

/// Classify a document ID into its type and project code.
///
/// `ABRD-HRMS-2025-1.0` → (`Abrd`, `Some("HRMS")`); anything without a
/// recognized prefix is `Unknown` with no project code.
pub fn classify_document_id(document_id: &str) -> (DocumentType, Option<String>) {
    let doc_type = if document_id.starts_with("ABRD-") {
        DocumentType::Abrd
    } else if document_id.starts_with("FBRD-") {
        DocumentType::Fbrd
    } else {
        return (DocumentType::Unknown, None);
    };

    let project_code = document_id
        .split('-')
        .nth(1)
        .filter(|code| !code.is_empty())
        .map(|code| code.to_string());

    (doc_type, project_code)
}

/// Find the control table: first-cell "Document Control"-style label, or any
/// table carrying a "Document ID" key.
fn find_control_table(blocks: &[Block]) -> Option<(usize, &Vec<Vec<String>>)> {
    for (idx, block) in blocks.iter().enumerate() {
        if let Block::Table { rows } = block {
            let first_cell = rows.first().and_then(|row| row.first());
            if let Some(cell) = first_cell {
                let lowered = cell.to_lowercase();
                if lowered.contains("document") && lowered.contains("control") {
                    return Some((idx, rows));
                }
            }
        }
    }
    for (idx, block) in blocks.iter().enumerate() {
        if let Block::Table { rows } = block {
            let has_id_key = rows
                .iter()
                .any(|row| row.first().is_some_and(|key| DOCUMENT_ID_RE.is_match(key)));
            if has_id_key {
                return Some((idx, rows));
            }
        }
    }
    None
}

/// Find the history table by its header columns and parse rows by
/// column-name matching, tolerating missing or reordered columns.
fn find_history_table(
    blocks: &[Block],
    consumed: &HashSet<usize>,
) -> Option<(usize, Vec<HistoryEntry>)> {
    for (idx, block) in blocks.iter().enumerate() {
        if consumed.contains(&idx) {
            continue;
        }
        let Block::Table { rows } = block else {
            continue;
        };
        let Some(header) = rows.first() else { continue };

        let lowered: Vec<String> = header.iter().map(|cell| cell.to_lowercase()).collect();
        let version_col = lowered.iter().position(|cell| cell.contains("version"));
        let date_col = lowered.iter().position(|cell| cell.contains("date"));
        let description_col = lowered
            .iter()
            .position(|cell| cell.contains("description") || cell.contains("change"));
        let author_col = lowered
            .iter()
            .position(|cell| cell.contains("author") || cell.contains("by"));

        // A history table needs at least a version column and one other.
        if version_col.is_none() || (date_col.is_none() && description_col.is_none()) {
            continue;
        }

        let entries = rows[1..]
            .iter()
            .map(|row| HistoryEntry {
                version: pick(row, version_col),
                date: pick(row, date_col),
                description: pick(row, description_col),
                author: pick(row, author_col),
            })
            .filter(|entry| *entry != HistoryEntry::default())
            .collect();

        return Some((idx, entries));
    }
    None
}

fn pick(row: &[String], col: Option<usize>) -> Option<String> {
    col.and_then(|i| row.get(i))
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
}

/// Scan the list blocks preceding the first heading for `Key: Value` items
/// carrying the same labels as the control table.
fn apply_list_fallback(blocks: &[Block], metadata: &mut DocumentMetadata) -> Option<usize> {
    for (idx, block) in blocks.iter().enumerate() {
        match block {
            Block::Heading { .. } => break,
            Block::List { items, .. } => {
                let mut matched = false;
                for item in items {
                    if let Some((key, value)) = item.split_once(':') {
                        matched |= metadata.apply_field(key, value);
                    }
                }
                if matched {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}
