//! # docqa
//!
//! Ask questions about your own PDF and text documents and get answers that
//! cite the file and page they came from.
//!
//! Documents are split into overlapping chunks, embedded with a hosted
//! embedding service and held in an in-memory similarity index. A question
//! retrieves the closest chunks, which become the context of a chat
//! completion prompt. Every answered question is kept in an append-only
//! history for the life of the session.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Uploads   │──▶│ Extract +   │──▶│  In-memory    │
//! │  PDF/TXT   │   │ Chunk+Embed │   │  index        │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │ top-k
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │ (docqa)  │        │   API    │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! The I/O-free parts (chunking, index, prompt, provenance, history,
//! session) live in the `docqa-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Page text from PDF and plain-text bytes |
//! | [`ingest`] | Uploads, directory scans, page records |
//! | [`embedding`] | Hosted embedding providers |
//! | [`llm`] | OpenAI-compatible chat client |
//! | [`qa`] | Index build and question answering |
//! | [`session_cmd`] | `ask` and the interactive session |
//! | [`chat`] | Persistent multi-conversation store |
//! | [`chat_cmd`] | `chat` and `complete` |
//! | [`recipe`] | Recipe generation |
//! | [`stats`] | Chunk statistics |
//! | [`server`] | HTTP API |
//! | [`progress`] | Index build progress reporting |

pub mod chat;
pub mod chat_cmd;
pub mod config;
pub mod embedding;
pub mod extract;
mod http;
pub mod ingest;
pub mod llm;
pub mod progress;
pub mod qa;
pub mod recipe;
pub mod server;
pub mod session_cmd;
pub mod stats;
