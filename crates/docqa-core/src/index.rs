//! In-memory similarity index.
//!
//! [`InMemoryIndex`] holds `(vector, chunk)` pairs and answers nearest-neighbour
//! queries by brute-force cosine similarity. An index is built once from a
//! complete chunk set and never updated in place: a new document set means a
//! new index.
//!
//! The [`SimilarityIndex`] trait is the query surface the retriever depends on,
//! so other backends can be plugged in without touching the pipeline.

use thiserror::Error;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

/// Errors raised while assembling an index from chunks and vectors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no chunks to index")]
    Empty,
    #[error("got {vectors} vectors for {chunks} chunks")]
    LengthMismatch { chunks: usize, vectors: usize },
    #[error("vector {position} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },
}

/// Query surface of a similarity index.
pub trait SimilarityIndex: Send + Sync {
    /// Embedding model the stored vectors came from.
    fn model_name(&self) -> &str;
    /// Number of stored chunks.
    fn len(&self) -> usize;
    /// Vector dimensionality shared by every entry.
    fn dims(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Return at most `k` chunks ordered by descending similarity.
    ///
    /// Equal scores keep insertion order, so repeated queries against the
    /// same index return the same sequence.
    fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredChunk>;
}

struct StoredVector {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine index over all stored vectors.
pub struct InMemoryIndex {
    model: String,
    dims: usize,
    entries: Vec<StoredVector>,
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("model", &self.model)
            .field("dims", &self.dims)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl InMemoryIndex {
    /// Build an index from chunks and their vectors, paired by position.
    pub fn build(
        model: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let dims = vectors[0].len();
        if let Some((position, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dims || v.is_empty())
        {
            return Err(IndexError::DimensionMismatch {
                position,
                expected: dims,
                found: v.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredVector { chunk, vector })
            .collect();

        Ok(Self {
            model: model.into(),
            dims,
            entries,
        })
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

impl SimilarityIndex for InMemoryIndex {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut candidates: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        // stable sort: ties keep insertion order
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }
}
