//! Field extraction from one source document.
//!
//! Each strategy reads the whole text and returns a flat [`ExtractedFieldSet`] of
//! raw values. The [`Orchestrator`] ranks strategies by the structural signals of
//! the text and combines their outputs.

mod analyzer;
mod contextual;
mod cross_reference;
mod gap_fill;
mod labels;
mod orchestrator;
mod structured;
mod tabular;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::ExtractedFieldSet;

pub use analyzer::{analyze, StructuralSignals};
pub use contextual::ContextualStrategy;
pub use cross_reference::CrossReferenceStrategy;
pub use gap_fill::GapFillingStrategy;
pub use labels::LabelTarget;
pub use orchestrator::{
    ExtractionMode, Orchestrator, OrchestratorState, SourceExtraction, StrategyOutput,
};
pub use structured::StructuredLabelStrategy;
pub use tabular::TabularStrategy;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction failed: {0}")]
    Failed(String),
    #[error("Strategy {0} aborted")]
    Aborted(StrategyKind),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// The closed set of extraction strategies, declared in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    StructuredLabel,
    Tabular,
    Contextual,
    CrossReference,
    GapFilling,
}

impl StrategyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredLabel => "structured_label",
            Self::Tabular => "tabular",
            Self::Contextual => "contextual",
            Self::CrossReference => "cross_reference",
            Self::GapFilling => "gap_filling",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Confidence in `[0, 100]` from precomputed signals; no extraction happens.
    fn score(&self, signals: &StructuralSignals) -> u8;

    fn confidence(&self, text: &str) -> u8 {
        self.score(&analyze(text))
    }

    fn can_extract(&self, text: &str) -> bool {
        self.confidence(text) > 0
    }

    /// `Ok(None)` means the strategy found nothing it recognizes.
    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>>;
}

/// All five strategies in priority order.
#[must_use]
pub fn default_strategies() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(StructuredLabelStrategy),
        Arc::new(TabularStrategy),
        Arc::new(ContextualStrategy),
        Arc::new(CrossReferenceStrategy),
        Arc::new(GapFillingStrategy),
    ]
}

/// `None` for a set with nothing in it, so strategies can report "found nothing".
pub(crate) fn non_empty(fields: ExtractedFieldSet) -> Option<ExtractedFieldSet> {
    (!fields.is_empty()).then_some(fields)
}
