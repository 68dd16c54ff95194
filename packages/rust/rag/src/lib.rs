//! Embedding store and retriever for section-level retrieval.
//!
//! This crate provides:
//! - [`Embedder`]: the embedding backend seam, with [`HttpEmbedder`] for
//!   OpenAI-compatible `/embeddings` endpoints
//! - [`FlatL2Index`]: exact nearest-neighbor search by squared L2 distance
//! - [`EmbeddingIndex`]: the per-run index over a page's sections
//! - [`Retriever`]: top-K context retrieval for a query text

pub mod embedder;
pub mod index;
pub mod store;

pub use embedder::{Embedder, HttpEmbedder};
pub use index::{FlatL2Index, IndexBuilder, Neighbor};
pub use store::{CONTEXT_SEPARATOR, EmbeddingIndex, Retriever};
