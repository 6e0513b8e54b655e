//! Embedding generation and caching.
//!
//! - `embeddings`: the `TextEncoder` seam and its fastembed implementation
//! - `preprocess`: text preparation for embedding input
//! - `cache`: binary file I/O for embeddings.bin persistence
//! - `provider`: lazy-initialized, hash-keyed embedding provider

pub mod embeddings;
mod cache;
mod preprocess;
mod provider;

pub use embeddings::{EmbeddingError, TextEncoder};
pub use provider::{EmbedReport, EmbeddingProvider, ProviderError};
