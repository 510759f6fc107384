//! Document segmentation.
//!
//! Splits a document into ordered cells so the script-dialect cells can be
//! analyzed. Markdown-family documents use fenced code blocks; notebooks are
//! read as JSON and their markdown cells are segmented the same way.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

use crate::config::ResolverConfig;

lazy_static! {
    /// Opening fence: indentation, fence run, info string
    static ref FENCE_OPEN_RE: Regex = Regex::new(r"^( {0,3})(`{3,}|~{3,})\s*(.*?)\s*$").unwrap();

    /// `{ojs}`, `{ojs echo=false}`, `{.ojs}`, `{=html}` or a bare word
    static ref INFO_LANG_RE: Regex =
        Regex::new(r"^\{\s*(=?)\.?([A-Za-z0-9_+-]+)[^}]*\}|^([A-Za-z0-9_+-]+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Markdown,
    Code,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub kind: CellKind,
    pub language: String,
    pub source: String,
    /// Byte range of the cell source within the segmented text.
    pub range: Range<usize>,
}

pub trait DocumentSegmenter {
    fn segment(&self, document: &str) -> Vec<Cell>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// FENCED (MARKDOWN) DOCUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct FencedSegmenter;

struct OpenFence {
    marker: char,
    len: usize,
    kind: CellKind,
    language: String,
    body_start: usize,
}

impl DocumentSegmenter for FencedSegmenter {
    fn segment(&self, document: &str) -> Vec<Cell> {
        let mut cells = Vec::new();
        let mut markdown_start = 0;
        let mut fence: Option<OpenFence> = None;
        let mut offset = 0;

        for line in document.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let trimmed = line.trim_end_matches(['\n', '\r']);

            match &fence {
                Some(open) => {
                    if closes_fence(trimmed, open.marker, open.len) {
                        cells.push(Cell {
                            kind: open.kind,
                            language: open.language.clone(),
                            source: document[open.body_start..line_start].to_string(),
                            range: open.body_start..line_start,
                        });
                        fence = None;
                        markdown_start = offset;
                    }
                }
                None => {
                    let Some(caps) = FENCE_OPEN_RE.captures(trimmed) else {
                        continue;
                    };
                    let run = &caps[2];
                    let info = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                    let marker = run.chars().next().unwrap_or('`');
                    // Backtick fences may not carry backticks in their info string
                    if marker == '`' && info.contains('`') {
                        continue;
                    }

                    push_markdown(&mut cells, document, markdown_start..line_start);
                    let (kind, language) = classify_info(info);
                    fence = Some(OpenFence {
                        marker,
                        len: run.len(),
                        kind,
                        language,
                        body_start: offset,
                    });
                }
            }
        }

        match fence {
            // Unterminated fences run to the end of the document
            Some(open) => cells.push(Cell {
                kind: open.kind,
                language: open.language,
                source: document[open.body_start..].to_string(),
                range: open.body_start..document.len(),
            }),
            None => push_markdown(&mut cells, document, markdown_start..document.len()),
        }

        cells
    }
}

fn push_markdown(cells: &mut Vec<Cell>, document: &str, range: Range<usize>) {
    if range.is_empty() || document[range.clone()].trim().is_empty() {
        return;
    }
    cells.push(Cell {
        kind: CellKind::Markdown,
        language: "markdown".to_string(),
        source: document[range.clone()].to_string(),
        range,
    });
}

fn closes_fence(line: &str, marker: char, len: usize) -> bool {
    let stripped = line.trim_start_matches(' ');
    if line.len() - stripped.len() > 3 {
        return false;
    }
    let run = stripped.chars().take_while(|c| *c == marker).count();
    run >= len && stripped[run..].trim().is_empty()
}

fn classify_info(info: &str) -> (CellKind, String) {
    match INFO_LANG_RE.captures(info) {
        Some(caps) => {
            if let Some(lang) = caps.get(2) {
                let raw = caps.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
                let kind = if raw { CellKind::Raw } else { CellKind::Code };
                (kind, lang.as_str().to_lowercase())
            } else {
                let lang = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                (CellKind::Code, lang.to_lowercase())
            }
        }
        None => (CellKind::Code, String::new()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NOTEBOOKS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: NotebookSource,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NotebookSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for NotebookSource {
    fn default() -> Self {
        NotebookSource::Text(String::new())
    }
}

impl NotebookSource {
    fn joined(&self) -> String {
        match self {
            NotebookSource::Lines(lines) => lines.concat(),
            NotebookSource::Text(text) => text.clone(),
        }
    }
}

/// Segments `.ipynb` JSON. Cell ranges are relative to each notebook cell's
/// own source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotebookSegmenter;

impl DocumentSegmenter for NotebookSegmenter {
    fn segment(&self, document: &str) -> Vec<Cell> {
        let notebook: Notebook = match serde_json::from_str(document) {
            Ok(nb) => nb,
            Err(e) => {
                tracing::debug!("Skipping unparsable notebook: {}", e);
                return Vec::new();
            }
        };

        let kernel_language = notebook
            .metadata
            .pointer("/kernelspec/language")
            .and_then(|v| v.as_str())
            .unwrap_or("python")
            .to_lowercase();

        let mut cells = Vec::new();
        for cell in &notebook.cells {
            let source = cell.source.joined();
            match cell.cell_type.as_str() {
                "code" => cells.push(Cell {
                    kind: CellKind::Code,
                    language: kernel_language.clone(),
                    range: 0..source.len(),
                    source,
                }),
                "markdown" | "raw" => cells.extend(FencedSegmenter.segment(&source)),
                _ => {}
            }
        }
        cells
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT CELL SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Script-dialect cell sources of a document, in document order.
pub fn script_cells(path: &Path, document: &str, config: &ResolverConfig) -> Vec<String> {
    let is_notebook = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("ipynb"))
        .unwrap_or(false);

    let cells = if is_notebook {
        NotebookSegmenter.segment(document)
    } else {
        FencedSegmenter.segment(document)
    };

    cells
        .into_iter()
        .filter(|c| c.kind == CellKind::Code && c.language == config.script_language)
        .map(|c| c.source)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_cells() {
        let doc = "# Title\n\n```{ojs}\nx = 1\n```\n\nText\n\n```{python}\nprint(1)\n```\n";
        let cells = FencedSegmenter.segment(doc);
        let kinds: Vec<_> = cells.iter().map(|c| (c.kind, c.language.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (CellKind::Markdown, "markdown"),
                (CellKind::Code, "ojs"),
                (CellKind::Markdown, "markdown"),
                (CellKind::Code, "python"),
            ]
        );
        assert_eq!(cells[1].source, "x = 1\n");
        assert_eq!(&doc[cells[1].range.clone()], "x = 1\n");
    }

    #[test]
    fn test_fence_info_variants() {
        assert_eq!(classify_info("{ojs echo=false}"), (CellKind::Code, "ojs".into()));
        assert_eq!(classify_info("{.ojs}"), (CellKind::Code, "ojs".into()));
        assert_eq!(classify_info("ojs"), (CellKind::Code, "ojs".into()));
        assert_eq!(classify_info("{=html}"), (CellKind::Raw, "html".into()));
        assert_eq!(classify_info(""), (CellKind::Code, "".into()));
    }

    #[test]
    fn test_longer_fence_contains_shorter() {
        let doc = "````{ojs}\nmd`\n```\ninner\n```\n`\n````\n";
        let cells = FencedSegmenter.segment(doc);
        assert_eq!(cells.len(), 1);
        assert!(cells[0].source.contains("inner"));
    }

    #[test]
    fn test_unterminated_fence() {
        let doc = "~~~{ojs}\nimport {a} from \"./a.js\"\n";
        let cells = FencedSegmenter.segment(doc);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].source, "import {a} from \"./a.js\"\n");
    }

    #[test]
    fn test_notebook_cells() {
        let nb = r#"{
            "metadata": { "kernelspec": { "language": "python" } },
            "cells": [
                { "cell_type": "markdown", "source": ["```{ojs}\n", "y = 2\n", "```\n"] },
                { "cell_type": "code", "source": "print(1)" }
            ]
        }"#;
        let cells = script_cells(Path::new("nb.ipynb"), nb, &ResolverConfig::default());
        assert_eq!(cells, vec!["y = 2\n".to_string()]);
    }

    #[test]
    fn test_script_cells_filters_language() {
        let doc = "```{ojs}\na = 1\n```\n```{r}\nb <- 2\n```\n```{ojs}\nc = 3\n```\n";
        let cells = script_cells(Path::new("doc.qmd"), doc, &ResolverConfig::default());
        assert_eq!(cells, vec!["a = 1\n".to_string(), "c = 3\n".to_string()]);
    }
}
