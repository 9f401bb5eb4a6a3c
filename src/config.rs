//! Application configuration.
//!
//! Defaults work out of the box; a YAML file can override them, and CLI
//! flags override both. The index and metadata live together under
//! `data_dir` — they are built and replaced as a pair, never separately.
//!
//! ```yaml
//! model_id: "openai/clip-vit-base-patch32"
//! data_dir: "data"
//! batch_size: 32
//! bind: "127.0.0.1:8000"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::build::{INDEX_FILE, METADATA_FILE};
use crate::error::Result;

fn default_model_id() -> String {
    crate::clip::DEFAULT_MODEL_ID.to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    crate::build::DEFAULT_BATCH_SIZE
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Configuration shared by all subcommands.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct IconSeekConfig {
    /// Hugging Face model identifier for the CLIP checkpoint.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Directory holding the index and metadata files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Images embedded per model call during index builds.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bind address for the query service.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for IconSeekConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            data_dir: default_data_dir(),
            batch_size: default_batch_size(),
            bind: default_bind(),
        }
    }
}

impl IconSeekConfig {
    /// Path of the index file under `data_dir`.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE)
    }

    /// Path of the metadata file under `data_dir`.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_FILE)
    }
}

/// Load the configuration from a YAML file.
///
/// # Errors
///
/// Returns [`crate::error::Error::Io`] if the file cannot be read and
/// [`crate::error::Error::Config`] if the YAML does not parse.
pub fn load_config(path: &Path) -> Result<IconSeekConfig> {
    debug!(path = %path.display(), "loading config");
    let content = fs::read_to_string(path)?;
    let config: IconSeekConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
