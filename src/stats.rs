//! Chunk statistics for a folder of documents.
//!
//! `docqa chunks <dir>` extracts and chunks every PDF and text file with the
//! configured chunker and prints what an index build would embed, without
//! calling any embedding service.

use anyhow::Result;
use docqa_core::chunk::chunk_pages;
use std::path::Path;

use crate::config::Config;
use crate::ingest::{extract_uploads, read_uploads, SkippedFile, Upload};
use crate::progress::NoProgress;

/// Per-file breakdown of page and chunk counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub filename: String,
    pub bytes: u64,
    pub pages: usize,
    pub chunks: usize,
}

#[derive(Debug, Default)]
pub struct ChunkStats {
    pub files: Vec<FileStats>,
    pub skipped: Vec<SkippedFile>,
}

impl ChunkStats {
    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }
}

/// Chunk `uploads` with the configured parameters.
pub fn count_chunks(config: &Config, uploads: &[Upload]) -> ChunkStats {
    let params = config.chunking.params();
    let ingested = extract_uploads(uploads, config.chunking.collapse_whitespace, &NoProgress);
    let skipped_names: Vec<&str> = ingested.skipped.iter().map(|s| s.filename.as_str()).collect();

    let mut files = Vec::new();
    for upload in uploads {
        if skipped_names.contains(&upload.filename.as_str()) {
            continue;
        }
        let pages: Vec<_> = ingested
            .pages
            .iter()
            .filter(|p| p.filename == upload.filename)
            .cloned()
            .collect();
        files.push(FileStats {
            filename: upload.filename.clone(),
            bytes: upload.bytes.len() as u64,
            pages: pages.len(),
            chunks: chunk_pages(&pages, &params).len(),
        });
    }

    ChunkStats {
        files,
        skipped: ingested.skipped,
    }
}

/// Run the chunks command: scan `dir` and print a summary.
pub fn run_chunks(config: &Config, dir: &Path, recursive: bool) -> Result<()> {
    let uploads = read_uploads(&[dir.to_path_buf()], recursive)?;
    if uploads.is_empty() {
        println!("No PDF or TXT files found in {}", dir.display());
        return Ok(());
    }

    let stats = count_chunks(config, &uploads);

    println!("docqa — Chunk Stats");
    println!("===================");
    println!();
    println!("  Folder:      {}", dir.display());
    println!(
        "  Chunking:    size {} / overlap {} ({:?} boundary)",
        config.chunking.size, config.chunking.overlap, config.chunking.boundary
    );
    println!();
    println!(
        "  {:<40} {:>10} {:>6} {:>8}",
        "FILE", "SIZE", "PAGES", "CHUNKS"
    );
    println!("  {}", "-".repeat(67));
    for f in &stats.files {
        println!(
            "  {:<40} {:>10} {:>6} {:>8}",
            f.filename,
            format_bytes(f.bytes),
            f.pages,
            f.chunks
        );
    }
    for s in &stats.skipped {
        println!("  {:<40} skipped: {}", s.filename, s.reason);
    }
    println!();
    println!("Total chunks: {}", stats.total_chunks());

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
