//! CLIP embedding provider using Candle (pure Rust ML framework).
//!
//! Loads `openai/clip-vit-base-patch32` (or a compatible checkpoint) from
//! the Hugging Face Hub and embeds text and images into CLIP's shared
//! 512-dimensional space. Text and image features come out of the same
//! projection head, which is what makes text-to-image retrieval work.
//!
//! Device selection prefers CUDA, then Metal, then CPU. Inference is
//! synchronous; callers batch inputs to amortize per-call overhead.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::{Repo, RepoType, api::sync::Api};
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::info;

use crate::embed::{Embedder, Embedding};
use crate::error::{Error, Result};

/// Default model checkpoint; the index and all queries must use the same
/// checkpoint or their vectors live in different spaces.
pub const DEFAULT_MODEL_ID: &str = "openai/clip-vit-base-patch32";

// CLIP image preprocessing constants (ImageNet-style mean/std).
const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const IMAGE_STD: [f32; 3] = [0.268_629_5, 0.261_302_6, 0.275_777_1];

/// CLIP text+vision embedder.
pub struct ClipEmbedder {
    model: ClipModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    image_size: usize,
    max_tokens: usize,
    pad_token_id: u32,
    model_id: String,
}

/// Pick the best available device: CUDA, then Metal, then CPU.
pub fn pick_device() -> Device {
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }
    if let Ok(device) = Device::new_metal(0) {
        return device;
    }
    Device::Cpu
}

fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

impl ClipEmbedder {
    /// Download (or reuse the cached copy of) the model weights and
    /// tokenizer from the Hugging Face Hub and load them onto the best
    /// available device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Embedding`] if the download, tokenizer, or weight
    /// loading fails.
    pub fn new(model_id: &str) -> Result<Self> {
        let device = pick_device();
        info!(model = model_id, device = device_label(&device), "loading CLIP model");

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(|e| Error::Embedding(e.to_string()))?;
        let api_repo = api.repo(repo);

        let tokenizer_filename = api_repo
            .get("tokenizer.json")
            .map_err(|e| Error::Embedding(format!("tokenizer download failed: {e}")))?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| Error::Embedding(format!("tokenizer load failed: {e}")))?;

        // Safetensors preferred, pytorch checkpoint as fallback.
        let weights_filename = api_repo
            .get("model.safetensors")
            .or_else(|_| api_repo.get("pytorch_model.bin"))
            .map_err(|e| Error::Embedding(format!("weights download failed: {e}")))?;

        let vb = if weights_filename.extension().is_some_and(|ext| ext == "safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(&weights_filename, DType::F32, &device)?
        };

        let config = ClipConfig::vit_base_patch32();
        let model = ClipModel::new(vb, &config)?;

        let pad_token_id = tokenizer.token_to_id("<|endoftext|>").unwrap_or(0);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: config.text_config.projection_dim,
            image_size: config.vision_config.image_size,
            max_tokens: config.text_config.max_position_embeddings,
            pad_token_id,
            model_id: model_id.to_string(),
        })
    }

    /// Human-readable device label for logs and the health endpoint.
    pub fn device_name(&self) -> &'static str {
        device_label(&self.device)
    }

    /// Tokenize a batch of texts, truncate to the model's context length,
    /// and pad every sequence to the longest one with the EOS token (the
    /// text transformer pools at the end-of-text position).
    fn tokenize_batch(&self, texts: &[String]) -> Result<Tensor> {
        let mut sequences = Vec::with_capacity(texts.len());
        let mut max_len = 1;
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
            let mut ids = encoding.get_ids().to_vec();
            ids.truncate(self.max_tokens);
            max_len = max_len.max(ids.len());
            sequences.push(ids);
        }

        let mut flat = Vec::with_capacity(sequences.len() * max_len);
        for mut ids in sequences {
            ids.resize(max_len, self.pad_token_id);
            flat.extend_from_slice(&ids);
        }
        Ok(Tensor::from_vec(flat, (texts.len(), max_len), &self.device)?)
    }

    /// Resize, RGB-convert, and mean/std-normalize one image into a
    /// `(3, size, size)` tensor.
    fn preprocess_image(&self, image: &DynamicImage) -> Result<Tensor> {
        let size = self.image_size;
        let resized = image.resize_exact(
            size as u32,
            size as u32,
            image::imageops::FilterType::Triangle,
        );
        let rgb = resized.to_rgb8();

        let raw = rgb.into_raw();
        let pixels = Tensor::from_vec(raw, (size, size, 3), &self.device)?;

        let mean = Tensor::new(&IMAGE_MEAN, &self.device)?.reshape((1, 1, 3))?;
        let std = Tensor::new(&IMAGE_STD, &self.device)?.reshape((1, 1, 3))?;

        let normalized = pixels
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;

        // (H, W, C) -> (C, H, W)
        Ok(normalized.permute((2, 0, 1))?)
    }
}

impl Embedder for ClipEmbedder {
    fn embed_text(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.embed_texts(&[text.to_string()])?;
        batch
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no embedding".to_string()))
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input_ids = self.tokenize_batch(texts)?;
        let features = self.model.get_text_features(&input_ids)?;
        Ok(features.to_vec2::<f32>()?)
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Embedding> {
        let mut batch = self.embed_images(std::slice::from_ref(image))?;
        batch
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no embedding".to_string()))
    }

    fn embed_images(&self, images: &[DynamicImage]) -> Result<Vec<Embedding>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let mut tensors = Vec::with_capacity(images.len());
        for image in images {
            tensors.push(self.preprocess_image(image)?);
        }
        let pixel_values = Tensor::stack(&tensors, 0)?;
        let features = self.model.get_image_features(&pixel_values)?;
        Ok(features.to_vec2::<f32>()?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
