//! # docqa core
//!
//! I/O-free logic for the docqa question-answering pipeline: page and chunk
//! models, sliding-window chunking, the embedding trait, the in-memory
//! similarity index, retrieval, prompt building, provenance tracking, the
//! QA history and the session object that owns them.
//!
//! This crate does no network or filesystem access and has no tokio
//! dependency. The `docqa` app crate supplies extraction, HTTP embedding
//! providers and the chat-completion client.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod models;
pub mod prompt;
pub mod provenance;
pub mod retrieve;
pub mod session;
