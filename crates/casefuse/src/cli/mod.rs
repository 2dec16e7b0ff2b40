pub mod config;
pub mod extract;
pub mod fuse;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use casefuse_core::{ExtractionMode, ReconcileConfig};

#[derive(Parser)]
#[command(
    name = "casefuse",
    about = "Reconcile legal case fields extracted from several unreliable sources",
    version
)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "CASEFUSE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the extraction strategies over one document
    Extract {
        /// Document text file
        file: PathBuf,
        /// How strategy outputs are combined (best, merge, complement)
        #[arg(short, long)]
        mode: Option<ExtractionMode>,
    },
    /// Extract every given source and fuse them into canonical records
    Fuse {
        /// Text produced by the structured markup pipeline
        #[arg(long)]
        markup: Option<PathBuf>,
        /// Text produced by the optical scan pipeline
        #[arg(long)]
        scan: Option<PathBuf>,
        /// Text produced by the word processor pipeline
        #[arg(long)]
        document: Option<PathBuf>,
        /// Case label used in logs and output
        #[arg(long, default_value = "case")]
        label: String,
        /// Record type selecting the mandatory field set
        #[arg(long)]
        record_type: Option<String>,
        /// TOML catalog file (category = [values])
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Include per-source extraction traces in the output
        #[arg(long)]
        trace: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Explicit file if given, else the user config; environment overrides apply last.
pub fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    let config = match path {
        Some(path) => ReconcileConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReconcileConfig::load_or_default().context("Failed to load user config")?,
    };
    config
        .with_env_overrides()
        .context("Invalid configuration override")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
