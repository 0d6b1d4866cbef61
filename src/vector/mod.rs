//! Profile vectors: types, similarity math, the vector store port and the
//! embedding functions that produce vectors from text.

mod embedding;
mod similarity;
mod store;
mod types;

pub use embedding::{EmbeddingFunction, FastEmbedFunction, HashingEmbedder, parse_embedding_model};
pub use similarity::{cosine_similarity, magnitude, nudge, rescale};
pub use store::{InMemoryVectorStore, VectorStore};
pub use types::{ProfileVector, VectorDimension, VectorError};
