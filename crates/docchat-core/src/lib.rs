//! # docchat core
//!
//! Shared logic for docchat with no tokio, network, or filesystem
//! dependencies: the chat data model, the overlapping text splitter, the
//! vector index abstraction, the embedding and generation capability
//! traits, and the error taxonomy.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod store;

pub use error::{Error, Result};
