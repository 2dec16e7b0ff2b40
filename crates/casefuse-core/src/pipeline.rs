//! Case-level reconciliation: extract each source, then fuse them into records.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::ReconcileConfig;
use crate::extract::{Orchestrator, SourceExtraction};
use crate::fusion::{FusionEngine, SourceFieldSet};
use crate::record::CanonicalRecord;
use crate::source::SourceKind;
use crate::validate::{CatalogCache, CatalogSource, CatalogValidator};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Case {0} has no source text")]
    NoSources(String),
    #[error("Reconciliation of case {0} was aborted")]
    Aborted(String),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// The raw text each pipeline produced for one case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSources {
    pub label: String,
    pub markup: Option<String>,
    pub scan: Option<String>,
    pub document: Option<String>,
    pub record_type: Option<String>,
}

impl CaseSources {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_source(mut self, kind: SourceKind, text: impl Into<String>) -> Self {
        let slot = match kind {
            SourceKind::StructuredMarkup => &mut self.markup,
            SourceKind::OpticalScan => &mut self.scan,
            SourceKind::WordProcessor => &mut self.document,
        };
        *slot = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    #[must_use]
    pub fn text(&self, kind: SourceKind) -> Option<&str> {
        match kind {
            SourceKind::StructuredMarkup => self.markup.as_deref(),
            SourceKind::OpticalScan => self.scan.as_deref(),
            SourceKind::WordProcessor => self.document.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        SourceKind::ALL
            .iter()
            .all(|kind| self.text(*kind).is_none_or(|t| t.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub sources_processed: usize,
    pub fields_fused: usize,
    pub conflicts: usize,
    pub records_produced: usize,
    pub manual_review: usize,
    pub duration_ms: u64,
}

impl ReconcileStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn absorb(&mut self, other: &Self) {
        self.sources_processed += other.sources_processed;
        self.fields_fused += other.fields_fused;
        self.conflicts += other.conflicts;
        self.records_produced += other.records_produced;
        self.manual_review += other.manual_review;
        self.duration_ms += other.duration_ms;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutput {
    pub label: String,
    pub records: Vec<CanonicalRecord>,
    pub extractions: Vec<(SourceKind, SourceExtraction)>,
    pub stats: ReconcileStats,
}

impl ReconcileOutput {
    pub fn needs_review(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.iter().filter(|r| r.requires_manual_review)
    }
}

/// Runs the orchestrator over every source of a case and fuses the results.
#[derive(Clone)]
pub struct Reconciler {
    orchestrator: Arc<Orchestrator>,
    fusion: FusionEngine,
    config: Arc<ReconcileConfig>,
}

impl Reconciler {
    #[must_use]
    pub fn new(config: ReconcileConfig) -> Self {
        let config = Arc::new(config);
        Self {
            orchestrator: Arc::new(Orchestrator::new()),
            fusion: FusionEngine::new(Arc::clone(&config)),
            config,
        }
    }

    /// Validate catalog-backed fields against `source`, cached per the configured TTL.
    #[must_use]
    pub fn with_catalog(mut self, source: Arc<dyn CatalogSource>) -> Self {
        let cache = Arc::new(CatalogCache::new(self.config.catalog_ttl()));
        let validator =
            CatalogValidator::new(source, cache).with_timeout(self.config.catalog_timeout());
        self.fusion = FusionEngine::new(Arc::clone(&self.config)).with_catalog(validator);
        self
    }

    #[must_use]
    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = Arc::new(orchestrator);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    #[must_use]
    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    pub async fn extract(&self, text: &str) -> SourceExtraction {
        self.orchestrator.run(text, self.config.mode).await
    }

    pub async fn reconcile_case(&self, case: &CaseSources) -> ReconcileResult<ReconcileOutput> {
        let start = Instant::now();
        if case.is_empty() {
            return Err(ReconcileError::NoSources(case.label.clone()));
        }

        let (markup, scan, document) = tokio::join!(
            self.extract_source(case, SourceKind::StructuredMarkup),
            self.extract_source(case, SourceKind::OpticalScan),
            self.extract_source(case, SourceKind::WordProcessor),
        );
        let extractions: Vec<(SourceKind, SourceExtraction)> =
            [markup, scan, document].into_iter().flatten().collect();

        let sources: Vec<SourceFieldSet> = extractions
            .iter()
            .map(|(kind, extraction)| SourceFieldSet::new(*kind, extraction.fields.clone()))
            .collect();
        let mandatory = self.config.mandatory_fields(case.record_type.as_deref());
        let records = self.fusion.fuse_sources(&sources, mandatory).await;

        let stats = ReconcileStats {
            sources_processed: extractions.len(),
            fields_fused: records.first().map_or(0, |r| r.fusion_results.len()),
            conflicts: records.first().map_or(0, |r| r.conflicts.len()),
            records_produced: records.len(),
            manual_review: records.iter().filter(|r| r.requires_manual_review).count(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            case = %case.label,
            sources = stats.sources_processed,
            records = stats.records_produced,
            conflicts = stats.conflicts,
            "Reconciled case"
        );

        Ok(ReconcileOutput {
            label: case.label.clone(),
            records,
            extractions,
            stats,
        })
    }

    async fn extract_source(
        &self,
        case: &CaseSources,
        kind: SourceKind,
    ) -> Option<(SourceKind, SourceExtraction)> {
        let text = case.text(kind).filter(|t| !t.trim().is_empty())?;
        Some((kind, self.orchestrator.run(text, self.config.mode).await))
    }

    /// Reconcile many cases concurrently; results keep the input order.
    pub async fn reconcile_batch(&self, cases: Vec<CaseSources>) -> BatchReconcileResult {
        let labels: Vec<String> = cases.iter().map(|c| c.label.clone()).collect();
        let mut slots: Vec<Option<ReconcileResult<ReconcileOutput>>> =
            labels.iter().map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (index, case) in cases.into_iter().enumerate() {
            let reconciler = self.clone();
            tasks.spawn(async move { (index, reconciler.reconcile_case(&case).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::warn!("Case reconciliation task failed: {e}"),
            }
        }

        let mut result = BatchReconcileResult::new();
        for (label, slot) in labels.into_iter().zip(slots) {
            match slot {
                Some(Ok(output)) => result.add_success(output),
                Some(Err(e)) => result.add_failure(label, e),
                None => {
                    let error = ReconcileError::Aborted(label.clone());
                    result.add_failure(label, error);
                }
            }
        }
        result
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("fusion", &self.fusion)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct BatchReconcileResult {
    pub successful: Vec<ReconcileOutput>,
    pub failed: Vec<(String, ReconcileError)>,
    pub total_stats: ReconcileStats,
}

impl BatchReconcileResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_success(&mut self, output: ReconcileOutput) {
        self.total_stats.absorb(&output.stats);
        self.successful.push(output);
    }

    fn add_failure(&mut self, label: String, error: ReconcileError) {
        self.failed.push((label, error));
    }

    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}
