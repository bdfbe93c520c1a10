//! Sliding-window text chunker with page provenance.
//!
//! Splits [`PageRecord`]s into [`Chunk`]s of at most `size` characters,
//! consecutive chunks sharing `overlap` characters. Windows are counted in
//! Unicode scalar values, so a chunk never ends inside a multi-byte sequence.
//! No sentence or paragraph awareness: pure character windowing.
//!
//! # Page boundaries
//!
//! [`PageBoundary::Page`] (the default) windows every page on its own, so a
//! chunk never spans two pages and its provenance is exact.
//! [`PageBoundary::Document`] windows the concatenation of a file's pages
//! (joined with `\n`) and attributes each chunk to the page it starts on.
//!
//! # Chunk count
//!
//! For a text of `n` characters the number of windows is
//!
//! ```text
//! 0                                   if n == 0
//! 1                                   if n <= size
//! 1 + ceil((n - size) / (size - overlap))   otherwise
//! ```
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_pages, ChunkParams};
//! use docqa_core::models::PageRecord;
//!
//! let pages = vec![PageRecord::new("notes.txt", 1, "x".repeat(2500))];
//! let chunks = chunk_pages(&pages, &ChunkParams::new(1000, 100));
//! assert_eq!(chunks.len(), 3);
//! assert!(chunks.iter().all(|c| c.filename == "notes.txt" && c.page == 1));
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, PageRecord};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// How chunks relate to page boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageBoundary {
    /// Window each page independently.
    #[default]
    Page,
    /// Window the whole file; a chunk belongs to the page it starts on.
    Document,
}

/// Window size, overlap and boundary policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
    pub boundary: PageBoundary,
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size,
            overlap,
            boundary: PageBoundary::Page,
        }
    }

    pub fn with_boundary(mut self, boundary: PageBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Rejects parameters that would never advance the window.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            bail!("chunk size must be > 0");
        }
        if self.overlap >= self.size {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap,
                self.size
            );
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.size.saturating_sub(self.overlap).max(1)
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

/// Number of windows [`chunk_pages`] cuts from a text of `chars` characters.
pub fn expected_chunk_count(chars: usize, params: &ChunkParams) -> usize {
    if chars == 0 {
        0
    } else if chars <= params.size {
        1
    } else {
        1 + (chars - params.size).div_ceil(params.step())
    }
}

/// Split page records into chunks, preserving record order.
///
/// Chunk indices are contiguous per file starting at 0. Pages containing only
/// whitespace produce no chunks.
pub fn chunk_pages(pages: &[PageRecord], params: &ChunkParams) -> Vec<Chunk> {
    match params.boundary {
        PageBoundary::Page => chunk_per_page(pages, params),
        PageBoundary::Document => chunk_per_document(pages, params),
    }
}

fn chunk_per_page(pages: &[PageRecord], params: &ChunkParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_file: Option<&str> = None;
    let mut chunk_index = 0usize;

    for page in pages {
        if current_file != Some(page.filename.as_str()) {
            current_file = Some(page.filename.as_str());
            chunk_index = 0;
        }
        if page.text.trim().is_empty() {
            continue;
        }
        for (start, end) in char_windows(&page.text, params) {
            chunks.push(make_chunk(
                &page.filename,
                page.page,
                chunk_index,
                &page.text[start..end],
            ));
            chunk_index += 1;
        }
    }

    chunks
}

fn chunk_per_document(pages: &[PageRecord], params: &ChunkParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut rest = pages;

    while let Some(first) = rest.first() {
        let len = rest
            .iter()
            .take_while(|p| p.filename == first.filename)
            .count();
        let (file_pages, tail) = rest.split_at(len);
        rest = tail;

        // Byte offset at which each page starts in the joined text.
        let mut joined = String::new();
        let mut starts: Vec<(usize, u32)> = Vec::with_capacity(file_pages.len());
        for (i, page) in file_pages.iter().enumerate() {
            if i > 0 {
                joined.push('\n');
            }
            starts.push((joined.len(), page.page));
            joined.push_str(&page.text);
        }
        if joined.trim().is_empty() {
            continue;
        }

        for (chunk_index, (start, end)) in char_windows(&joined, params).into_iter().enumerate() {
            let page = starts
                .iter()
                .take_while(|(offset, _)| *offset <= start)
                .last()
                .map(|(_, page)| *page)
                .unwrap_or(first.page);
            chunks.push(make_chunk(
                &first.filename,
                page,
                chunk_index,
                &joined[start..end],
            ));
        }
    }

    chunks
}

/// Byte ranges of each window over `text`, measured in characters.
fn char_windows(text: &str, params: &ChunkParams) -> Vec<(usize, usize)> {
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = offsets.len();
    if n == 0 {
        return Vec::new();
    }
    let byte_at = |ci: usize| if ci >= n { text.len() } else { offsets[ci] };

    let mut windows = Vec::with_capacity(expected_chunk_count(n, params));
    let mut start = 0usize;
    loop {
        let end = (start + params.size).min(n);
        windows.push((byte_at(start), byte_at(end)));
        if end == n {
            break;
        }
        start += params.step();
    }
    windows
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(filename: &str, page: u32, index: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

/// Collapse whitespace runs to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
