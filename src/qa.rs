//! Question-answering pipeline.
//!
//! Wires ingestion, chunking, indexing, retrieval, synthesis and provenance
//! together around the core types:
//!
//! ```text
//! uploads ─▶ extract ─▶ chunk ─▶ embed ─▶ InMemoryIndex
//!                                             │
//! question ─▶ embed ─▶ top-k ─▶ prompt ─▶ chat model ─▶ answer + sources
//! ```
//!
//! [`Pipeline::build_corpus`] never touches a [`Session`]: the caller
//! installs the result, so a failed build leaves the current index in place.

use docqa_core::chunk::chunk_pages;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::error::{QaError, Result};
use docqa_core::history::QaEntry;
use docqa_core::index::InMemoryIndex;
use docqa_core::models::ScoredChunk;
use docqa_core::prompt::{build_answer_prompt, AnswerStyle};
use docqa_core::provenance::{collect_sources, SourceMap};
use docqa_core::retrieve::{build_index_with_progress, retrieve};
use docqa_core::session::{IndexedCorpus, Session};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{ChunkingConfig, Config};
use crate::embedding::create_provider;
use crate::ingest::{extract_uploads, upload_names, SkippedFile, Upload};
use crate::llm::{ChatMessage, ChatModel, OpenAiCompatClient};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};

/// Summary of an index build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub files: Vec<String>,
    pub skipped: Vec<SkippedFile>,
    pub pages: usize,
    pub chunks: usize,
}

/// What loading documents into a session did.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The same file names were already indexed; nothing was rebuilt.
    Unchanged,
    Rebuilt(BuildReport),
}

/// An answer with the chunks and sources it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: SourceMap,
    pub chunks: Vec<ScoredChunk>,
}

pub struct Pipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    chunking: ChunkingConfig,
    top_k: usize,
    batch_size: usize,
}

impl Pipeline {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self {
            embedder,
            chat,
            chunking: config.chunking.clone(),
            top_k: config.retrieval.top_k,
            batch_size: config.embedding.batch_size,
        }
    }

    /// Pipeline with the embedding provider and chat client named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let chat = Arc::new(OpenAiCompatClient::from_config(&config.llm)?);
        Ok(Self::new(embedder, chat, config))
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Extract, chunk and embed `uploads` into a new corpus.
    pub async fn build_corpus(
        &self,
        uploads: Vec<Upload>,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(IndexedCorpus, BuildReport)> {
        let ingested = extract_uploads(&uploads, self.chunking.collapse_whitespace, progress);
        let chunks = chunk_pages(&ingested.pages, &self.chunking.params());
        let chunk_count = chunks.len();

        let index = build_index_with_progress(
            self.embedder.as_ref(),
            chunks,
            self.batch_size,
            &mut |n, total| {
                progress.report(BuildProgressEvent::Embedding {
                    n: n as u64,
                    total: total as u64,
                })
            },
        )
        .await?;

        let files = upload_names(&uploads);
        let report = BuildReport {
            files: files.clone(),
            skipped: ingested.skipped,
            pages: ingested.pages.len(),
            chunks: chunk_count,
        };
        let mut uploads_by_name: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for upload in uploads {
            uploads_by_name.entry(upload.filename).or_insert(upload.bytes);
        }
        info!(
            files = report.files.len(),
            skipped = report.skipped.len(),
            pages = report.pages,
            chunks = report.chunks,
            "document set indexed"
        );
        Ok((
            IndexedCorpus {
                index,
                files,
                uploads: uploads_by_name,
            },
            report,
        ))
    }

    /// Load `uploads` into `session`, rebuilding only when the set of file
    /// names changed.
    pub async fn load(
        &self,
        session: &mut Session,
        uploads: Vec<Upload>,
        progress: &dyn BuildProgressReporter,
    ) -> Result<LoadOutcome> {
        if !session.needs_rebuild(&upload_names(&uploads)) {
            return Ok(LoadOutcome::Unchanged);
        }
        let (corpus, report) = self.build_corpus(uploads, progress).await?;
        session.install(corpus);
        Ok(LoadOutcome::Rebuilt(report))
    }

    /// Answer `question` from `index`.
    pub async fn answer(&self, index: &InMemoryIndex, question: &str, style: AnswerStyle) -> Result<Answer> {
        let chunks = retrieve(self.embedder.as_ref(), index, question, self.top_k).await?;
        let prompt = build_answer_prompt(question, &chunks, style);
        let text = self
            .chat
            .complete(&[ChatMessage::user(prompt)])
            .await
            .map_err(|e| QaError::Synthesis(format!("{:#}", e)))?;
        let sources = collect_sources(&chunks);
        info!(
            chunks = chunks.len(),
            files = sources.len(),
            model = self.chat.model_name(),
            "answered question"
        );
        Ok(Answer {
            text,
            sources,
            chunks,
        })
    }

    /// Answer `question` against the session's index and record it in history.
    ///
    /// Uses `style` when given, the session's answer style otherwise.
    pub async fn ask(
        &self,
        session: &mut Session,
        question: &str,
        style: Option<AnswerStyle>,
    ) -> Result<QaEntry> {
        if question.trim().is_empty() {
            return Err(QaError::EmptyQuestion);
        }
        let index = session.index()?;
        let style = style.unwrap_or(session.answer_style);
        let answer = self.answer(&index, question, style).await?;
        let entry = QaEntry::new(question.trim(), answer.text, answer.sources, style);
        Ok(session.record(entry).clone())
    }
}
