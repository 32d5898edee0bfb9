//! Section tree construction
//!
//! Walks the normalized block sequence and partitions it into a
//! hierarchical section tree:
//! - A heading's dotted numbering prefix ("2.1.3") determines its nesting
//!   level when present and plausible; structural depth is authoritative
//!   when the two disagree by more than one level
//! - Content between headings attaches to the preceding heading's section
//! - Content preceding the first heading becomes a synthetic "Preamble"
//!   section when non-empty

use crate::extract::extract_requirement_ids;
use crate::normalize::{render_block, Block};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)[.)]?\s+(.+)$").unwrap());

/// One node of the section tree.
///
/// `content` and `requirement_ids` cover this node's own text only, never
/// its children. Child levels are strictly greater than the parent's and
/// tree order matches document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub level: usize,
    pub number: Option<String>,
    pub content: String,
    pub children: Vec<Section>,
    pub requirement_ids: Vec<String>,
}

impl Section {
    /// The normalized heading line for this section.
    pub fn heading_marker(&self) -> String {
        match &self.number {
            Some(number) => format!("{} {} {}", "#".repeat(self.level), number, self.title),
            None => format!("{} {}", "#".repeat(self.level), self.title),
        }
    }

    /// Visit this section and its descendants in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Section)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Flatten a forest of sections into pre-order.
pub fn flatten<'a>(sections: &'a [Section]) -> Vec<&'a Section> {
    let mut out = Vec::new();
    for section in sections {
        section.walk(&mut |s| out.push(s));
    }
    out
}

/// Build the section tree from a block sequence, skipping the block indices
/// already consumed by the metadata extractor.
pub fn split_sections(blocks: &[Block], skip: &HashSet<usize>) -> Vec<Section> {
    let mut builder = TreeBuilder::default();
    let mut heading_ordinal = 0usize;

    for (idx, block) in blocks.iter().enumerate() {
        if skip.contains(&idx) {
            continue;
        }
        match block {
            Block::Heading { level, text } => {
                heading_ordinal += 1;
                let (number, title) = parse_numbering(text);
                let effective = effective_level(number.as_deref(), *level as usize);
                builder.open_section(effective, title, number, heading_ordinal);
            }
            other => builder.append_content(render_block(other)),
        }
    }

    builder.finish()
}

/// Split a heading into its dotted numbering prefix and bare title.
fn parse_numbering(text: &str) -> (Option<String>, String) {
    match NUMBERING_RE.captures(text.trim()) {
        Some(caps) => (Some(caps[1].to_string()), caps[2].trim().to_string()),
        None => (None, text.trim().to_string()),
    }
}

/// Numbering depth wins when within one level of the structural depth;
/// otherwise the numbering is treated as advisory and structure decides.
fn effective_level(number: Option<&str>, structural: usize) -> usize {
    match number {
        Some(number) => {
            let depth = number.split('.').count();
            if depth.abs_diff(structural) > 1 {
                structural
            } else {
                depth
            }
        }
        None => structural,
    }
}

#[derive(Default)]
struct TreeBuilder {
    roots: Vec<Section>,
    stack: Vec<Section>,
    preamble: Vec<String>,
    used_ids: HashSet<String>,
}

impl TreeBuilder {
    fn append_content(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        match self.stack.last_mut() {
            Some(open) => {
                if !open.content.is_empty() {
                    open.content.push_str("\n\n");
                }
                open.content.push_str(&text);
            }
            None => self.preamble.push(text),
        }
    }

    fn open_section(
        &mut self,
        level: usize,
        title: String,
        number: Option<String>,
        ordinal: usize,
    ) {
        while self.stack.last().is_some_and(|open| open.level >= level) {
            let Some(done) = self.stack.pop() else { break };
            self.close(done);
        }
        let id = self.unique_id(number.as_deref(), ordinal);
        self.stack.push(Section {
            id,
            title,
            level,
            number,
            content: String::new(),
            children: Vec::new(),
            requirement_ids: Vec::new(),
        });
    }

    fn close(&mut self, mut done: Section) {
        done.requirement_ids = extract_requirement_ids(&done.content);
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => self.roots.push(done),
        }
    }

    fn unique_id(&mut self, number: Option<&str>, ordinal: usize) -> String {
        let base = match number {
            Some(number) => format!("section_{}", number.replace('.', "_")),
            None => format!("section_{}", ordinal),
        };
        let id = if self.used_ids.contains(&base) {
            format!("{}_{}", base, ordinal)
        } else {
            base
        };
        self.used_ids.insert(id.clone());
        id
    }

    fn finish(mut self) -> Vec<Section> {
        while let Some(done) = self.stack.pop() {
            self.close(done);
        }
        if !self.preamble.is_empty() {
            let content = self.preamble.join("\n\n");
            let requirement_ids = extract_requirement_ids(&content);
            self.roots.insert(
                0,
                Section {
                    id: "preamble".to_string(),
                    title: "Preamble".to_string(),
                    level: 1,
                    number: None,
                    content,
                    children: Vec::new(),
                    requirement_ids,
                },
            );
        }
        self.roots
    }
}
