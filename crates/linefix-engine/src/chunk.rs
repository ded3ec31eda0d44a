//! Source loading and language-aware chunking.
//!
//! Files are split on Python structure first (classes, then functions), then
//! on blank lines, lines, words and finally characters. Each separator stays
//! attached to the start of the piece it introduces, so a chunk that begins
//! at a `def` reads `def ...`.

use anyhow::Context;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GLOB: &str = "**/*.py";

/// Tried in order; the empty separator splits into characters.
pub const PYTHON_SEPARATORS: &[&str] = &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub source: PathBuf,
    pub content: String,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` at every occurrence of `separator`, keeping the separator at
/// the start of the following piece. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    /// Sizes are in characters. The overlap must not exceed the chunk size.
    pub fn python(chunk_size: usize, chunk_overlap: usize) -> anyhow::Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk size must be positive");
        }
        if chunk_overlap > chunk_size {
            anyhow::bail!(
                "chunk overlap ({}) is larger than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: PYTHON_SEPARATORS.to_vec(),
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        // First separator present in the text; the empty one always matches.
        let (separator, remaining) = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .map(|i| (separators[i], &separators[i + 1..]))
            .unwrap_or(("", &[]));

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Pack pieces greedily into chunks of at most `chunk_size` characters,
    /// carrying up to `chunk_overlap` characters of trailing pieces into the
    /// next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    chunks.push(chunk);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        if let Some(chunk) = join_window(&window) {
            chunks.push(chunk);
        }
        chunks
    }
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Collect files under `root` matching `glob`, in path order. Hidden and
/// git-ignored files are skipped; unreadable or non-UTF-8 files are logged
/// and skipped. `limit` caps the number of files read.
pub fn load_documents(root: &Path, glob: &str, limit: Option<usize>) -> anyhow::Result<Vec<Document>> {
    if !root.exists() {
        anyhow::bail!("Path not found: {}", root.display());
    }

    let mut overrides = OverrideBuilder::new(root);
    overrides
        .add(glob)
        .with_context(|| format!("Invalid glob pattern: {}", glob))?;
    let overrides = overrides.build()?;

    let walker = WalkBuilder::new(root)
        .overrides(overrides)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut documents = Vec::new();
    for entry in walker {
        if limit.is_some_and(|limit| documents.len() >= limit) {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.into_path();
        match fs::read_to_string(&path) {
            Ok(content) => documents.push(Document {
                source: path,
                content,
            }),
            Err(err) => tracing::warn!(path = %path.display(), "skipping file: {}", err),
        }
    }

    tracing::debug!(count = documents.len(), root = %root.display(), "loaded documents");
    Ok(documents)
}

/// Split every document in parallel; chunk order follows document order.
pub fn split_documents(documents: &[Document], splitter: &RecursiveSplitter) -> Vec<Chunk> {
    documents
        .par_iter()
        .map(|doc| {
            splitter
                .split_text(&doc.content)
                .into_iter()
                .map(|content| Chunk {
                    source: doc.source.clone(),
                    content,
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}
