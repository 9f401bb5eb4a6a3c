//! Main module for the IconSeek CLI application.
//!
//! This module provides the main function and auxiliary functionalities for
//! the CLI application. It handles command parsing, configuration loading, and
//! initialization, as well as invoking the appropriate functionalities based on
//! the provided command-line arguments.
//!
//! # Examples
//!
//! Building an index and querying it:
//!
//! ```sh
//! iconseek build --assets-root ./icons
//! iconseek search "red fireball" --top-k 5
//! ```
//!
//! Running the long-lived query service:
//!
//! ```sh
//! iconseek serve --bind 127.0.0.1:8900
//! ```

use std::{env, path::PathBuf, process::ExitCode};

use clap::Parser;
use once_cell::sync::OnceCell;
use serde_json::json;
use tracing::{debug, error};

use iconseek::{
    apply, build,
    clip::ClipEmbedder,
    commands::{Cli, Commands},
    config::{self, IconSeekConfig},
    engine::SearchEngine,
    index::FlatIndex,
    meta, server, Result,
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> ExitCode {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Main asynchronous function of the IconSeek CLI application.
///
/// Loads configuration, parses command-line arguments, and executes the
/// appropriate command.
///
/// # Errors
///
/// Returns an error if there is an issue loading the configuration, opening
/// the index, or executing the specified command.
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.clone())?;
    debug!(?config, "configuration resolved");

    match cli.command {
        Commands::Build {
            assets_root,
            out_dir,
            batch_size,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| config.data_dir.clone());
            let batch_size = batch_size.unwrap_or(config.batch_size);
            let embedder = ClipEmbedder::new(&config.model_id)?;
            let report = build::build_index(&embedder, &assets_root, &out_dir, batch_size)?;
            println!(
                "indexed {} images (dimension {}) into {}",
                report.indexed,
                report.dimension,
                out_dir.display()
            );
            if !report.corrupted.is_empty() {
                println!("skipped {} corrupted files", report.corrupted.len());
            }
        }
        Commands::Search {
            query,
            top_k,
            category,
            data_dir,
        } => {
            let config = with_data_dir(config, data_dir);
            let embedder = ClipEmbedder::new(&config.model_id)?;
            let engine =
                SearchEngine::open(embedder, &config.index_path(), &config.metadata_path())?;
            let results = engine.search(&query, top_k, category.as_deref())?;
            let output = json!({
                "query": query,
                "top_k": top_k,
                "category_filter": category,
                "results": results,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Serve { bind, data_dir } => {
            let config = with_data_dir(config, data_dir);
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            server::serve(
                &bind,
                config.model_id.clone(),
                config.index_path(),
                config.metadata_path(),
            )
            .await?;
        }
        Commands::Apply {
            spells_dir,
            data_dir,
            dry_run,
        } => {
            let config = with_data_dir(config, data_dir);
            let index = FlatIndex::load(&config.index_path())?;
            let metadata = meta::load_metadata(&config.metadata_path())?;
            let embedder = ClipEmbedder::new(&config.model_id)?;
            let report = apply::apply_images(&embedder, &index, &metadata, &spells_dir, dry_run)?;
            let mode = if dry_run { "dry run: " } else { "" };
            println!(
                "{mode}{} spells, {} updated, {} errors",
                report.total, report.updated, report.errors
            );
        }
    }

    Ok(())
}

/// Load the configuration from an explicit `--config` path, falling back to
/// `config.yaml` under the per-platform config directory, and finally to the
/// built-in defaults when neither exists.
fn resolve_config(explicit: Option<PathBuf>) -> Result<IconSeekConfig> {
    if let Some(path) = explicit {
        return config::load_config(&path);
    }
    if env::var("ICONSEEK_NO_DEFAULT_CONFIG").is_err() {
        let default_path = iconseek::config_dir()?.join("config.yaml");
        if default_path.is_file() {
            return config::load_config(&default_path);
        }
    }
    Ok(IconSeekConfig::default())
}

/// Apply a `--data-dir` override on top of the loaded configuration.
fn with_data_dir(mut config: IconSeekConfig, data_dir: Option<PathBuf>) -> IconSeekConfig {
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    config
}
