//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options. Flags given on the command line override values from the optional
//! YAML configuration file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, short = 'c', global = true, env = "ICONSEEK_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Build the vector index and metadata from a directory of images.
    #[clap(name = "build", alias = "b")]
    Build {
        /// Root directory containing the image assets.
        #[arg(long)]
        assets_root: PathBuf,

        /// Output directory for the index and metadata files.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Number of images embedded per model call.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search the index with a text query and print results as JSON.
    #[clap(name = "search", alias = "s")]
    Search {
        /// The text query to search for.
        query: String,

        /// Number of results to return.
        #[arg(long, short = 'k', default_value_t = 12)]
        top_k: usize,

        /// Restrict results to one category (case-insensitive).
        #[arg(long)]
        category: Option<String>,

        /// Data directory holding the index and metadata.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Run the long-lived HTTP query service.
    Serve {
        /// Address to bind (host:port).
        #[arg(long)]
        bind: Option<String>,

        /// Data directory holding the index and metadata.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Resolve an image for every spell record in a directory.
    Apply {
        /// Directory of spell JSON files to update.
        #[arg(long)]
        spells_dir: PathBuf,

        /// Data directory holding the index and metadata.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Compute and report counts without rewriting any file.
        #[arg(long)]
        dry_run: bool,
    },
}
