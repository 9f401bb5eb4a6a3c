//! Index builder: asset discovery, batched embedding, persistence.
//!
//! Builds are full, exclusive, offline operations. The catalog order
//! fixes id assignment; a file that fails to decode is skipped without
//! consuming an id, so ids always equal the running count of
//! successfully embedded images and the metadata sequence stays aligned
//! with the index positions.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::catalog::{self, AssetRecord};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::meta::{self, MetadataRecord};
use crate::normalize::l2_normalize;

/// Default number of images embedded per model call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// How many corrupted file paths are listed in the warning log.
const CORRUPTED_LIST_CAP: usize = 20;

/// Index file name under the output directory.
pub const INDEX_FILE: &str = "iconseek.index";
/// Metadata file name under the output directory.
pub const METADATA_FILE: &str = "metadata.jsonl";

/// Summary of a completed build.
#[derive(Debug)]
pub struct BuildReport {
    /// Number of images embedded and indexed.
    pub indexed: usize,
    /// Relative paths of files that could not be decoded.
    pub corrupted: Vec<String>,
    /// Embedding dimensionality of the built index.
    pub dimension: usize,
}

/// Build the vector index and metadata for every image under
/// `asset_root`, persisting both under `out_dir`.
///
/// Corrupted or unreadable images are skipped, collected into the report,
/// and never abort the build.
///
/// # Errors
///
/// Returns [`Error::AssetsNotFound`] for a missing asset root and
/// [`Error::EmptyCatalog`] when no indexable image exists.
pub fn build_index<E: Embedder>(
    embedder: &E,
    asset_root: &Path,
    out_dir: &Path,
    batch_size: usize,
) -> Result<BuildReport> {
    let assets = catalog::collect(asset_root)?;
    if assets.is_empty() {
        return Err(Error::EmptyCatalog(asset_root.to_path_buf()));
    }
    info!(total = assets.len(), root = %asset_root.display(), "collected asset catalog");

    let batch_size = batch_size.max(1);
    let progress = ProgressBar::new(assets.len() as u64);
    progress.set_style(ProgressStyle::default_bar());

    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(assets.len());
    let mut metadata: Vec<MetadataRecord> = Vec::with_capacity(assets.len());
    let mut corrupted: Vec<String> = Vec::new();

    let mut batch_images = Vec::with_capacity(batch_size);
    let mut batch_assets: Vec<&AssetRecord> = Vec::with_capacity(batch_size);

    for asset in &assets {
        progress.inc(1);
        let full_path = asset_root.join(&asset.relative_path);
        match image::open(&full_path) {
            Ok(img) => {
                batch_images.push(img);
                batch_assets.push(asset);
            }
            Err(_) => {
                corrupted.push(asset.relative_path.clone());
                continue;
            }
        }

        if batch_images.len() >= batch_size {
            embed_batch(embedder, &mut batch_images, &mut batch_assets, &mut embeddings, &mut metadata)?;
        }
    }
    if !batch_images.is_empty() {
        embed_batch(embedder, &mut batch_images, &mut batch_assets, &mut embeddings, &mut metadata)?;
    }
    progress.finish_and_clear();

    report_corrupted(&corrupted);

    if embeddings.is_empty() {
        return Err(Error::EmptyCatalog(asset_root.to_path_buf()));
    }

    let dimension = embedder.dimension();
    let mut index = FlatIndex::new(dimension);
    index.add(&embeddings)?;

    std::fs::create_dir_all(out_dir)?;
    let index_path = out_dir.join(INDEX_FILE);
    let metadata_path = out_dir.join(METADATA_FILE);
    index.save(&index_path)?;
    meta::save_metadata(&metadata_path, &metadata)?;
    info!(
        indexed = metadata.len(),
        dimension,
        index = %index_path.display(),
        metadata = %metadata_path.display(),
        "index build complete"
    );

    Ok(BuildReport {
        indexed: metadata.len(),
        corrupted,
        dimension,
    })
}

/// Embed one accumulated batch and emit its metadata records. Ids equal
/// the running count of embeddings produced so far.
fn embed_batch<E: Embedder>(
    embedder: &E,
    batch_images: &mut Vec<image::DynamicImage>,
    batch_assets: &mut Vec<&AssetRecord>,
    embeddings: &mut Vec<Vec<f32>>,
    metadata: &mut Vec<MetadataRecord>,
) -> Result<()> {
    let vectors = embedder.embed_images(batch_images)?;
    for (asset, vector) in batch_assets.iter().zip(vectors) {
        let id = embeddings.len() as i64;
        embeddings.push(l2_normalize(vector));
        metadata.push(MetadataRecord {
            id,
            path: asset.relative_path.clone(),
            category: asset.category.clone(),
        });
    }
    batch_images.clear();
    batch_assets.clear();
    Ok(())
}

fn report_corrupted(corrupted: &[String]) {
    if corrupted.is_empty() {
        return;
    }
    warn!(count = corrupted.len(), "corrupted/unreadable files skipped");
    for path in corrupted.iter().take(CORRUPTED_LIST_CAP) {
        warn!(path = %path, "skipped");
    }
    if corrupted.len() > CORRUPTED_LIST_CAP {
        warn!("... and {} more", corrupted.len() - CORRUPTED_LIST_CAP);
    }
}
