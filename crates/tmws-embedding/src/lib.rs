//! # tmws-embedding
//!
//! Thin adapter between the memory service and an external embedding
//! model. The [`EmbeddingGateway`] is the only component allowed to hold
//! a provider reference; it caches by content hash and coalesces
//! concurrent requests into batches.

pub mod gateway;
pub mod hash;
pub mod provider;
pub mod vector;

pub use gateway::{EmbeddingGateway, DEFAULT_COALESCE_WINDOW, MAX_BATCH};
pub use hash::HashEmbedding;
pub use provider::{EmbeddingProvider, OpenAiEmbedding};
pub use vector::{cosine_similarity, embedding_from_bytes, embedding_to_bytes};
