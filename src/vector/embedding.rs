//! Embedding functions: text in, fixed-dimension vector out.
//!
//! [`FastEmbedFunction`] runs a local ONNX model through fastembed.
//! [`HashingEmbedder`] is a deterministic feature-hashing embedder that needs
//! no model download; it backs offline runs and tests.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingFunction: Send + Sync {
    /// Generate embeddings for multiple texts, one per input, in order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this function.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Map a configured model name to a fastembed model and its output dimension.
pub fn parse_embedding_model(name: &str) -> Result<(EmbeddingModel, usize), VectorError> {
    match name {
        "AllMiniLML6V2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "BGESmallENV15" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BGEBaseENV15" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "MultilingualE5Small" => Ok((EmbeddingModel::MultilingualE5Small, 384)),
        other => Err(VectorError::UnknownModel(other.to_string())),
    }
}

/// fastembed-backed embedding function.
pub struct FastEmbedFunction {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedFunction {
    /// Load the named model, downloading it on first use.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the model fails to load.
    pub fn new(model_name: &str) -> Result<Self, VectorError> {
        let (model, dim) = parse_embedding_model(model_name)?;
        let model = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension: VectorDimension::new(dim)?,
        })
    }
}

impl EmbeddingFunction for FastEmbedFunction {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each lowercase alphanumeric token lands in one bucket chosen by its
/// SHA-256 digest, with a sign taken from the same digest. The result is
/// normalized to unit length, so texts sharing vocabulary score high under
/// cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl HashingEmbedder {
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0f32; dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // Normalize to unit length (like real embeddings)
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingFunction for HashingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
