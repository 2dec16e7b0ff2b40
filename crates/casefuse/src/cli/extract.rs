use std::path::Path;

use anyhow::Result;

use casefuse_core::{ExtractionMode, Orchestrator};

use super::{load_config, print_json, read_text};

pub async fn run(config: Option<&Path>, file: &Path, mode: Option<ExtractionMode>) -> Result<()> {
    let config = load_config(config)?;
    let text = read_text(file)?;
    let mode = mode.unwrap_or(config.mode);

    let extraction = Orchestrator::new().run(&text, mode).await;
    tracing::info!(
        file = %file.display(),
        %mode,
        primary = ?extraction.primary,
        "Extracted document"
    );
    print_json(&extraction)
}
