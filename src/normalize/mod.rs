//! Markup normalization
//!
//! Converts raw wiki storage markup (XHTML) into an ordered sequence of
//! typed block nodes:
//! - Headings, paragraphs, tables, lists, images
//! - Document order is preserved
//! - Malformed or partially-unclosed markup degrades to plain paragraph
//!   text instead of failing the pipeline
//!
//! Also provides the canonical text rendering used for section content,
//! the full-document text, and the content fingerprint.

use crate::error::PipelineError;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// A block-level node recovered from page markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    Table { rows: Vec<Vec<String>> },
    List { ordered: bool, items: Vec<String> },
    Image { source: String },
}

/// Parse raw markup into an ordered block sequence.
///
/// Fails only on structurally empty input. Fragments the parser cannot
/// make sense of are retained as paragraph text so no content is dropped.
pub fn parse_blocks(raw: &str) -> Result<Vec<Block>, PipelineError> {
    if raw.trim().is_empty() {
        return Err(PipelineError::EmptyContent);
    }

    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;

    let mut state = ParseState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => state.open_element(&e),
            Ok(Event::Empty(e)) => state.empty_element(&e),
            Ok(Event::End(e)) => state.close_element(e.local_name().as_ref()),
            Ok(Event::Text(t)) => state.push_text(&text_of(&t)),
            Ok(Event::CData(c)) => {
                state.push_text(&String::from_utf8_lossy(&c));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                // Keep whatever the reader choked on rather than dropping it.
                tracing::debug!("markup parse stopped early: {}", e);
                let mut position = reader.buffer_position() as usize;
                while position < raw.len() && !raw.is_char_boundary(position) {
                    position += 1;
                }
                state.push_text(&strip_tags(&raw[position.min(raw.len())..]));
                break;
            }
        }
    }

    let blocks = state.finish();
    if blocks.is_empty() {
        return Err(PipelineError::EmptyContent);
    }
    Ok(blocks)
}

/// Render blocks into normalized plain text, blocks separated by blank lines.
pub fn render_blocks(blocks: &[Block]) -> String {
    let rendered: Vec<String> = blocks.iter().map(render_block).collect();
    rendered.join("\n\n")
}

/// Render a single block into its normalized text form.
pub fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, text } => {
            format!("{} {}", "#".repeat(*level as usize), text)
        }
        Block::Paragraph { text } => text.clone(),
        Block::Table { rows } => rows
            .iter()
            .map(|row| format!("| {} |", row.join(" | ")))
            .collect::<Vec<_>>()
            .join("\n"),
        Block::List { ordered, items } => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if *ordered {
                    format!("{}. {}", i + 1, item)
                } else {
                    format!("- {}", item)
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Block::Image { source } => format!("[image: {}]", source),
    }
}

/// Streaming parser state. Text is routed to the innermost open construct:
/// table cell, then list item, then heading, then the paragraph buffer.
#[derive(Default)]
struct ParseState {
    blocks: Vec<Block>,
    paragraph: String,
    heading: Option<(u8, String)>,
    table_depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Option<String>,
    list_depth: usize,
    list_ordered: bool,
    items: Vec<String>,
    item: Option<String>,
    skip_depth: usize,
}

impl ParseState {
    fn open_element(&mut self, e: &BytesStart<'_>) {
        let name = e.local_name().as_ref().to_vec();
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }
        match name.as_slice() {
            b"script" | b"style" => self.skip_depth = 1,
            b"table" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.flush_paragraph();
                    self.rows.clear();
                }
            }
            b"tr" if self.table_depth == 1 => self.row = Vec::new(),
            b"td" | b"th" if self.table_depth == 1 => self.cell = Some(String::new()),
            b"ul" | b"ol" => {
                self.list_depth += 1;
                if self.list_depth == 1 && self.table_depth == 0 {
                    self.flush_paragraph();
                    self.items.clear();
                    self.list_ordered = name == b"ol";
                }
            }
            b"li" if self.list_depth == 1 && self.table_depth == 0 => {
                self.item = Some(String::new());
            }
            b"p" => {
                if self.table_depth == 0 && self.list_depth == 0 {
                    self.flush_paragraph();
                }
            }
            b"img" | b"image" => self.push_image(e),
            _ if is_heading(&name) => {
                if self.table_depth == 0 && self.list_depth == 0 {
                    self.flush_paragraph();
                    self.heading = Some((heading_level(&name), String::new()));
                }
            }
            _ => {}
        }
    }

    fn empty_element(&mut self, e: &BytesStart<'_>) {
        if self.skip_depth > 0 {
            return;
        }
        match e.local_name().as_ref() {
            b"img" | b"image" | b"attachment" | b"url" => self.push_image(e),
            b"br" => self.push_text(" "),
            _ => {}
        }
    }

    fn close_element(&mut self, name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match name {
            b"table" => {
                if self.table_depth == 1 && !self.rows.is_empty() {
                    self.blocks.push(Block::Table {
                        rows: std::mem::take(&mut self.rows),
                    });
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            b"tr" if self.table_depth == 1 => {
                if !self.row.is_empty() {
                    self.rows.push(std::mem::take(&mut self.row));
                }
            }
            b"td" | b"th" if self.table_depth == 1 => {
                if let Some(cell) = self.cell.take() {
                    self.row.push(cell.trim().to_string());
                }
            }
            b"ul" | b"ol" => {
                if self.list_depth == 1 && self.table_depth == 0 && !self.items.is_empty() {
                    self.blocks.push(Block::List {
                        ordered: self.list_ordered,
                        items: std::mem::take(&mut self.items),
                    });
                }
                self.list_depth = self.list_depth.saturating_sub(1);
            }
            b"li" if self.list_depth == 1 && self.table_depth == 0 => {
                if let Some(item) = self.item.take() {
                    let item = item.trim().to_string();
                    if !item.is_empty() {
                        self.items.push(item);
                    }
                }
            }
            b"p" => {
                if self.table_depth == 0 && self.list_depth == 0 {
                    self.flush_paragraph();
                }
            }
            _ if is_heading(name) => {
                if let Some((level, text)) = self.heading.take() {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        self.blocks.push(Block::Heading { level, text });
                    }
                }
            }
            _ => {}
        }
    }

    /// Route text to the innermost open construct.
    fn push_text(&mut self, text: &str) {
        if self.skip_depth > 0 || text.is_empty() {
            return;
        }
        let target = if let Some(cell) = self.cell.as_mut() {
            cell
        } else if let Some(item) = self.item.as_mut() {
            item
        } else if let Some((_, heading)) = self.heading.as_mut() {
            heading
        } else {
            &mut self.paragraph
        };
        if !target.is_empty() && !target.ends_with(char::is_whitespace) {
            target.push(' ');
        }
        target.push_str(text.trim());
    }

    fn push_image(&mut self, e: &BytesStart<'_>) {
        // src for plain <img>, filename/value for wiki attachment refs
        for attr in e.attributes().flatten() {
            let key = attr.key.local_name();
            if matches!(key.as_ref(), b"src" | b"filename" | b"value") {
                let source = String::from_utf8_lossy(&attr.value).into_owned();
                if source.is_empty() {
                    return;
                }
                // Inside a cell or list item the reference stays inline text.
                if self.cell.is_some() || self.item.is_some() {
                    let placeholder = format!("[image: {}]", source);
                    self.push_text(&placeholder);
                } else {
                    self.flush_paragraph();
                    self.blocks.push(Block::Image { source });
                }
                return;
            }
        }
    }

    fn flush_paragraph(&mut self) {
        let text = std::mem::take(&mut self.paragraph);
        let text = text.trim().to_string();
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph { text });
        }
    }

    fn finish(mut self) -> Vec<Block> {
        // Close anything the markup left open.
        if let Some(cell) = self.cell.take() {
            self.row.push(cell.trim().to_string());
        }
        if !self.row.is_empty() {
            let row = std::mem::take(&mut self.row);
            self.rows.push(row);
        }
        if !self.rows.is_empty() {
            let rows = std::mem::take(&mut self.rows);
            self.blocks.push(Block::Table { rows });
        }
        if let Some(item) = self.item.take() {
            if !item.trim().is_empty() {
                self.items.push(item.trim().to_string());
            }
        }
        if !self.items.is_empty() {
            let items = std::mem::take(&mut self.items);
            self.blocks.push(Block::List {
                ordered: self.list_ordered,
                items,
            });
        }
        if let Some((level, text)) = self.heading.take() {
            let text = text.trim().to_string();
            if !text.is_empty() {
                self.blocks.push(Block::Heading { level, text });
            }
        }
        self.flush_paragraph();
        self.blocks
    }
}

fn is_heading(name: &[u8]) -> bool {
    name.len() == 2 && name[0] == b'h' && (b'1'..=b'6').contains(&name[1])
}

fn heading_level(name: &[u8]) -> u8 {
    name[1] - b'0'
}

fn text_of(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(cow) => cow.into_owned(),
        // Non-XML entities (e.g. &nbsp;) fail to unescape; keep the raw text.
        Err(_) => String::from_utf8_lossy(t)
            .replace("&nbsp;", " ")
            .replace("&amp;", "&"),
    }
}

/// Crude tag stripper used only for the tail of input the reader gave up on.
fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
