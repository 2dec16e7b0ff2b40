use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use casefuse_core::{
    CanonicalRecord, CaseSources, InMemoryCatalog, ReconcileOutput, ReconcileStats, Reconciler,
    SourceKind,
};

use super::{load_config, print_json, read_text};

pub struct Inputs {
    pub markup: Option<PathBuf>,
    pub scan: Option<PathBuf>,
    pub document: Option<PathBuf>,
    pub label: String,
    pub record_type: Option<String>,
    pub catalog: Option<PathBuf>,
    pub trace: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    label: &'a str,
    records: &'a [CanonicalRecord],
    stats: &'a ReconcileStats,
}

pub async fn run(config: Option<&Path>, inputs: Inputs) -> Result<()> {
    let config = load_config(config)?;

    let mut case = CaseSources::new(&inputs.label);
    for (kind, path) in [
        (SourceKind::StructuredMarkup, &inputs.markup),
        (SourceKind::OpticalScan, &inputs.scan),
        (SourceKind::WordProcessor, &inputs.document),
    ] {
        if let Some(path) = path {
            case = case.with_source(kind, read_text(path)?);
        }
    }
    if case.is_empty() {
        bail!("At least one of --markup, --scan or --document must name a non-empty file");
    }
    if let Some(record_type) = inputs.record_type {
        case = case.with_record_type(record_type);
    }

    let mut reconciler = Reconciler::new(config);
    if let Some(path) = &inputs.catalog {
        let catalog = InMemoryCatalog::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?;
        reconciler = reconciler.with_catalog(Arc::new(catalog));
    }

    let output: ReconcileOutput = reconciler
        .reconcile_case(&case)
        .await
        .context("Reconciliation failed")?;

    for record in output.needs_review() {
        tracing::warn!(
            record = %record.id,
            conflicts = ?record.conflicts,
            "Record requires manual review"
        );
    }

    if inputs.trace {
        print_json(&output)
    } else {
        print_json(&Summary {
            label: &output.label,
            records: &output.records,
            stats: &output.stats,
        })
    }
}
