//! Turns a directory of `.txt` files into [`Document`]s.
//!
//! The document id is the file path relative to the corpus root, without the
//! extension (`manuals/pump`). Files containing `--- Page N ---` marker lines
//! (as written by PDF text extraction) are split into pages labelled `page N`.
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{Document, Section};

#[derive(Debug, Clone, Default)]
pub struct CorpusLoader {
    limit: Option<usize>,
}

impl CorpusLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        let mut files = list_txt_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        if let Some(limit) = self.limit {
            if files.len() > limit {
                files.truncate(limit);
                tracing::info!(limit, "limited corpus to first files");
            }
        }
        let mut documents = Vec::with_capacity(files.len());
        for file_path in &files {
            let content = read_file_content(file_path)?;
            let doc_id = extract_doc_id(file_path, data_dir);
            tracing::debug!(doc_id = %doc_id, path = %file_path.display(), "loaded document");
            documents.push(parse_document(doc_id, &content));
        }
        tracing::info!(files = documents.len(), dir = %data_dir.display(), "corpus loaded");
        Ok(documents)
    }
}

/// Build a document, splitting on page markers when present. Text before the
/// first marker is kept as an unlabelled lead-in.
pub fn parse_document(id: impl Into<String>, content: &str) -> Document {
    let mut preface = String::new();
    let mut pages: Vec<(String, String)> = Vec::new();
    for line in content.lines() {
        if let Some(number) = page_marker(line) {
            pages.push((format!("page {number}"), String::new()));
        } else {
            let body = match pages.last_mut() {
                Some((_, body)) => body,
                None => &mut preface,
            };
            body.push_str(line);
            body.push('\n');
        }
    }
    if pages.is_empty() {
        return Document::new(id, content);
    }

    let mut text = preface.trim().to_string();
    let mut offset = text.chars().count();
    let mut sections = Vec::with_capacity(pages.len());
    for (label, body) in pages {
        let body = body.trim();
        if !text.is_empty() {
            text.push_str("\n\n");
            offset += 2;
        }
        sections.push(Section { start: offset, label });
        text.push_str(body);
        offset += body.chars().count();
    }
    Document::new(id, text).with_sections(sections)
}

fn page_marker(line: &str) -> Option<u32> {
    line.trim()
        .strip_prefix("--- Page ")?
        .strip_suffix(" ---")?
        .trim()
        .parse()
        .ok()
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

fn extract_doc_id(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    txt_files.sort();
    txt_files
}
