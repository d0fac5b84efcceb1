//! # docchat
//!
//! Multi-session chat over a private document collection.
//!
//! Uploaded files are split into overlapping chunks, embedded, and stored
//! in a vector index alongside a manifest that records which chunks belong
//! to which document. Each chat session keeps its own persisted message
//! log. A turn rewrites the user's follow-up into a standalone question,
//! retrieves the most relevant chunks, streams an answer conditioned on
//! them, and only then saves the exchange.
//!
//! ## Architecture
//!
//! ```text
//!  files ──▶ extract ──▶ chunk ──▶ DocumentStore ◀── (index.json + files.json)
//!                                        │
//!                                        ▼ similarity_search
//!  utterance ──▶ HistoryAwareRetriever ──▶ AnswerGenerator ──▶ fragments
//!                      ▲                                          │
//!                      └────── SessionOrchestrator ◀──────────────┘
//!                                    │ persist
//!                                    ▼
//!                         <chat>_history.json + chat_paths.json
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat keys set generation "$GOOGLE_API_KEY"
//! docchat keys set embedding "$COHERE_API_KEY"
//! docchat docs add ./papers
//! docchat chat new "Trip Planning"
//! docchat chat ask "Where is Paris?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`app`] | Wiring components from a validated config |
//! | [`persist`] | Atomic JSON files |
//! | [`embedding`] | Cohere and local hashing embedders |
//! | [`generation`] | Gemini generator with streaming |
//! | [`index_file`] | File-snapshotted vector index |
//! | [`documents`] | Index + manifest kept in lockstep |
//! | [`extract`] | PDF and text extraction |
//! | [`ingest`] | File → document ingestion |
//! | [`memory`] | Per-session message logs |
//! | [`registry`] | Session → history file registry |
//! | [`chats`] | Create, delete, and list chats |
//! | [`retriever`] | History-aware retrieval |
//! | [`answer`] | Answer prompt and streaming |
//! | [`orchestrator`] | One chat turn, end to end |

pub mod answer;
pub mod app;
pub mod chats;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
mod http;
pub mod index_file;
pub mod ingest;
pub mod memory;
pub mod orchestrator;
pub mod persist;
pub mod registry;
pub mod retriever;
