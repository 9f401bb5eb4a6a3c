//! # IconSeek (library root)
//!
//! This crate provides the core plumbing for the **IconSeek** CLI and library:
//! - Image asset discovery & categorization (`catalog`).
//! - CLIP text/image embeddings backed by candle (`clip`, `embed`, `normalize`).
//! - A flat exact inner-product vector index with JSONL metadata (`index`, `meta`).
//! - Index construction from an asset tree (`build`).
//! - Query validation, filtering & ranking (`engine`).
//! - Bulk image assignment for spell records (`apply`).
//! - CLI parsing & the HTTP query service (`commands`, `server`).
//! - Configuration & error types (`config`, `error`).
//!
//! In addition, this module exposes [`config_dir`] for discovering the
//! per-platform configuration directory where `config.yaml` and the default
//! data directory live.
//!
//! ## Index layout
//! A built index is a pair of sibling files inside the data directory:
//!
//! - `iconseek.index` — the flat vector index (bincode).
//! - `metadata.jsonl` — one JSON record per indexed image, line `i` holding id `i`.
//!
//! Both are produced by [`build::build_index`] and consumed together by
//! [`engine::SearchEngine`]; neither file is useful on its own.
//!
//! ## Modules
//! - [`apply`], [`build`], [`catalog`], [`clip`], [`commands`], [`config`],
//!   [`embed`], [`engine`], [`error`], [`index`], [`meta`], [`normalize`],
//!   [`server`]

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod apply;
pub mod build;
pub mod catalog;
pub mod clip;
pub mod commands;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod index;
pub mod meta;
pub mod normalize;
pub mod server;

pub use error::{Error, Result};

/// Return the per-platform configuration directory used by IconSeek.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "iconseek", "iconseek")`, so you get the right place on each OS
/// (e.g., `~/.config/iconseek` on Linux under XDG).
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined
/// (which is rare but possible in heavily sandboxed environments).
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "iconseek", "iconseek")
        .ok_or_else(|| Error::Config("unable to determine config directory".into()))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}
