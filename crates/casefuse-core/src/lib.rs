#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::option_if_let_else)]

pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod fusion;
pub mod pipeline;
pub mod record;
pub mod sanitize;
pub mod source;
pub mod validate;

pub use config::ReconcileConfig;
pub use error::{Error, Result};
pub use extract::{
    ExtractionError, ExtractionMode, Orchestrator, SourceExtraction, Strategy, StrategyKind,
};
pub use fields::FieldKind;
pub use fusion::{FusionEngine, RawCandidate, SourceFieldSet};
pub use pipeline::{
    BatchReconcileResult, CaseSources, ReconcileError, ReconcileOutput, ReconcileStats, Reconciler,
};
pub use record::{
    CanonicalRecord, ExtractedFieldSet, FieldCandidate, FieldFusionResult, FusionDecision,
    MonetaryAmount, Party, PartyRole,
};
pub use sanitize::{sanitize, sanitize_amount};
pub use source::{SourceKind, SourceReliability};
pub use validate::{CatalogCategory, CatalogSource, CatalogValidator, InMemoryCatalog};
