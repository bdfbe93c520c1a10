//! Index construction and question retrieval.
//!
//! Both halves go through the same [`EmbeddingProvider`], so chunk and
//! question vectors always live in the same embedding space.
//!
//! # Build
//!
//! 1. Embed chunk texts in batches of `batch_size`.
//! 2. Check that every batch returned one vector per input.
//! 3. Assemble a fresh [`InMemoryIndex`]. Any failure aborts the whole build.
//!
//! # Retrieve
//!
//! 1. Reject blank questions.
//! 2. Reject indexes built with a different embedding model.
//! 3. Embed the question in query mode and take the top `k` by cosine similarity.

use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{QaError, Result};
use crate::index::{InMemoryIndex, SimilarityIndex};
use crate::models::{Chunk, ScoredChunk};

/// Default number of chunks handed to the synthesizer.
pub const DEFAULT_TOP_K: usize = 4;

/// Embed `chunks` and build a new index from them.
pub async fn build_index(
    provider: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<InMemoryIndex> {
    build_index_with_progress(provider, chunks, batch_size, &mut |_, _| {}).await
}

/// Like [`build_index`], calling `on_batch(embedded, total)` after each batch.
pub async fn build_index_with_progress(
    provider: &dyn EmbeddingProvider,
    chunks: Vec<Chunk>,
    batch_size: usize,
    on_batch: &mut (dyn FnMut(usize, usize) + Send),
) -> Result<InMemoryIndex> {
    if chunks.is_empty() {
        return Err(QaError::IndexBuild(
            "no text could be extracted from the uploaded documents".to_string(),
        ));
    }

    let batch_size = batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = provider
            .embed_documents(&texts)
            .await
            .map_err(|e| QaError::IndexBuild(format!("embedding request failed: {:#}", e)))?;
        if embedded.len() != texts.len() {
            return Err(QaError::IndexBuild(format!(
                "embedding service returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            )));
        }
        debug!(batch = batch_no, size = texts.len(), "embedded chunk batch");
        vectors.extend(embedded);
        on_batch(vectors.len(), chunks.len());
    }

    let chunk_count = chunks.len();
    let index = InMemoryIndex::build(provider.model_name(), chunks, vectors)
        .map_err(|e| QaError::IndexBuild(e.to_string()))?;
    info!(
        chunks = chunk_count,
        dims = index.dims(),
        model = provider.model_name(),
        "built similarity index"
    );
    Ok(index)
}

/// Return the `k` chunks most similar to `question`.
pub async fn retrieve(
    provider: &dyn EmbeddingProvider,
    index: &dyn SimilarityIndex,
    question: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QaError::EmptyQuestion);
    }
    if provider.model_name() != index.model_name() {
        return Err(QaError::Retrieval(format!(
            "index was built with embedding model '{}' but questions are embedded with '{}'; rebuild the index",
            index.model_name(),
            provider.model_name()
        )));
    }

    let vector = provider
        .embed_query(question)
        .await
        .map_err(|e| QaError::Retrieval(format!("could not embed question: {:#}", e)))?;
    if vector.len() != index.dims() {
        return Err(QaError::Retrieval(format!(
            "question embedding has {} dimensions but the index holds {}-dimensional vectors",
            vector.len(),
            index.dims()
        )));
    }

    Ok(index.query(&vector, k))
}
