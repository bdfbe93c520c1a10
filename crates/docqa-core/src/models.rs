//! Core data models shared by the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Text of one page of an uploaded document.
///
/// Plain-text files produce a single record with `page == 1`; PDFs produce
/// one record per physical page, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub filename: String,
    pub page: u32,
    pub text: String,
}

impl PageRecord {
    pub fn new(filename: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            page,
            text: text.into(),
        }
    }
}

/// A bounded window of page text, the unit of embedding and retrieval.
///
/// Carries the filename and page it was cut from. Chunks are never mutated
/// after the chunker creates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Random UUID, unique within an index.
    pub id: String,
    pub filename: String,
    /// 1-based page the chunk starts on.
    pub page: u32,
    /// Position of the chunk within its file, contiguous from 0.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned by an index query together with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
