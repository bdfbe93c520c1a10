//! Error taxonomy for the question-answering pipeline.
//!
//! Every variant is recoverable at single-request granularity: callers
//! report it and keep the session alive.

use thiserror::Error;

/// Errors surfaced by ingestion, index building, retrieval and synthesis.
#[derive(Debug, Error)]
pub enum QaError {
    /// A single file could not be read or extracted. The file is skipped.
    #[error("could not ingest {filename}: {message}")]
    Ingestion { filename: String, message: String },

    /// The index could not be built. The previous index, if any, is kept.
    #[error("index build failed: {0}")]
    IndexBuild(String),

    /// A question was asked before any index exists.
    #[error("index not ready: upload documents to build the index first")]
    IndexNotReady,

    /// The question could not be matched against the index.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The chat-completion service failed or timed out.
    #[error("answer generation failed: {0}")]
    Synthesis(String),

    #[error("question must not be empty")]
    EmptyQuestion,
}

impl QaError {
    /// Machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QaError::Ingestion { .. } => "ingestion_failed",
            QaError::IndexBuild(_) => "index_build_failed",
            QaError::IndexNotReady => "index_not_ready",
            QaError::Retrieval(_) => "retrieval_failed",
            QaError::Synthesis(_) => "synthesis_failed",
            QaError::EmptyQuestion => "bad_request",
        }
    }
}

pub type Result<T> = std::result::Result<T, QaError>;
