//! Embedding provider seam.
//!
//! The index builder, query engine, and batch-apply pipeline only ever
//! talk to an [`Embedder`]; the production implementation is the candle
//! CLIP model in [`crate::clip`]. Text and image embeddings must live in
//! the same vector space and share one dimensionality for similarity
//! comparisons to be meaningful.
//!
//! Embedders return raw vectors; L2 normalization is applied by the
//! callers via [`crate::normalize`].

use image::DynamicImage;

use crate::error::Result;

/// A vector embedding.
pub type Embedding = Vec<f32>;

/// Dual-modality embedding model.
///
/// Batch methods exist because model inference carries a fixed per-call
/// overhead; callers with many inputs should batch aggressively rather
/// than loop over the single-item variants.
pub trait Embedder: Send + Sync {
    /// Embed a single text query.
    fn embed_text(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts in one forward pass.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single decoded image.
    fn embed_image(&self, image: &DynamicImage) -> Result<Embedding>;

    /// Embed a batch of decoded images in one forward pass.
    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Embedding>>;

    /// Dimensionality of the shared embedding space.
    fn dimension(&self) -> usize;

    /// Model identifier, for logs and the health endpoint.
    fn model_name(&self) -> &str;
}
