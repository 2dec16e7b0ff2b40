use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    analyze, default_strategies, ExtractionError, Strategy, StrategyKind, StructuralSignals,
};
use crate::fusion::merge_intra_source;
use crate::record::ExtractedFieldSet;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Run only the highest-ranked strategy that produces anything.
    BestStrategyOnly,
    /// Run every applicable strategy and merge by confidence.
    MergeAll,
    /// Primary strategy, then cross-reference and gap-filling into its gaps.
    #[default]
    Complement,
}

impl ExtractionMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestStrategyOnly => "best_strategy_only",
            Self::MergeAll => "merge_all",
            Self::Complement => "complement",
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_strategy_only" | "best" => Ok(Self::BestStrategyOnly),
            "merge_all" | "merge" => Ok(Self::MergeAll),
            "complement" => Ok(Self::Complement),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Analyzing,
    SelectingStrategy,
    Extracting,
    Complementing,
    Done,
}

/// What one strategy produced for the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutput {
    pub strategy: StrategyKind,
    pub confidence: u8,
    pub fields: ExtractedFieldSet,
}

/// Result of one orchestrated extraction, with its provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceExtraction {
    pub fields: ExtractedFieldSet,
    pub primary: Option<StrategyKind>,
    pub signals: StructuralSignals,
    pub outputs: Vec<StrategyOutput>,
    pub trace: Vec<OrchestratorState>,
}

impl SourceExtraction {
    fn enter(&mut self, state: OrchestratorState) {
        tracing::debug!(?state, "Orchestrator state");
        self.trace.push(state);
    }
}

type Ranked = (Arc<dyn Strategy>, u8);

/// Drives the strategies over one source document.
pub struct Orchestrator {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }

    #[must_use]
    pub fn with_strategies(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub async fn reconcile_source(&self, text: &str, mode: ExtractionMode) -> ExtractedFieldSet {
        self.run(text, mode).await.fields
    }

    pub async fn run(&self, text: &str, mode: ExtractionMode) -> SourceExtraction {
        let mut extraction = SourceExtraction::default();
        let text: Arc<str> = Arc::from(text);

        extraction.enter(OrchestratorState::Analyzing);
        extraction.signals = analyze(&text);

        extraction.enter(OrchestratorState::SelectingStrategy);
        let ranked = self.rank(&extraction.signals);

        extraction.enter(OrchestratorState::Extracting);
        match mode {
            ExtractionMode::MergeAll => {
                extraction.outputs = run_concurrently(&text, &ranked).await;
                extraction.primary = extraction.outputs.first().map(|o| o.strategy);
                extraction.fields = merge_intra_source(&extraction.outputs);
            }
            ExtractionMode::BestStrategyOnly => {
                if let Some(primary) = run_primary(&text, &ranked).await {
                    extraction.primary = Some(primary.strategy);
                    extraction.fields = primary.fields.clone();
                    extraction.outputs.push(primary);
                }
            }
            ExtractionMode::Complement => complement(&text, &ranked, &mut extraction).await,
        }

        extraction.enter(OrchestratorState::Done);
        tracing::debug!(
            primary = ?extraction.primary,
            populated = extraction.fields.populated_count(),
            "Source extraction finished"
        );
        extraction
    }

    /// Applicable strategies, best first; equal confidence falls back to priority.
    fn rank(&self, signals: &StructuralSignals) -> Vec<Ranked> {
        let mut ranked: Vec<Ranked> = self
            .strategies
            .iter()
            .map(|s| (Arc::clone(s), s.score(signals).min(100)))
            .filter(|(_, confidence)| *confidence > 0)
            .collect();
        ranked.sort_by_key(|(s, confidence)| (Reverse(*confidence), s.kind()));

        tracing::debug!(
            ranking = ?ranked.iter().map(|(s, c)| (s.kind(), *c)).collect::<Vec<_>>(),
            "Ranked strategies"
        );
        ranked
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Primary output, then cross-reference and gap-filling merged into its gaps.
async fn complement(text: &Arc<str>, ranked: &[Ranked], extraction: &mut SourceExtraction) {
    let primary_candidates: Vec<Ranked> = ranked
        .iter()
        .filter(|(s, _)| s.kind() != StrategyKind::GapFilling)
        .cloned()
        .collect();

    let primary = run_primary(text, &primary_candidates).await;
    let primary_kind = primary.as_ref().map(|p| p.strategy);
    if let Some(primary) = primary {
        extraction.primary = Some(primary.strategy);
        extraction.fields = primary.fields.clone();
        extraction.outputs.push(primary);
    }

    let mut complements: Vec<Ranked> = Vec::new();
    if extraction.signals.cross_reference_phrase_count > 0
        && primary_kind != Some(StrategyKind::CrossReference)
    {
        complements.extend(find(ranked, StrategyKind::CrossReference));
    }
    complements.extend(find(ranked, StrategyKind::GapFilling));
    if complements.is_empty() {
        return;
    }

    extraction.enter(OrchestratorState::Complementing);
    for output in run_concurrently(text, &complements).await {
        let filled = extraction.fields.fill_gaps(&output.fields);
        tracing::debug!(strategy = %output.strategy, filled, "Complemented primary output");
        if extraction.primary.is_none() {
            extraction.primary = Some(output.strategy);
        }
        extraction.outputs.push(output);
    }
}

fn find(ranked: &[Ranked], kind: StrategyKind) -> Option<Ranked> {
    ranked.iter().find(|(s, _)| s.kind() == kind).cloned()
}

/// First strategy, in rank order, that yields a non-empty field set.
async fn run_primary(text: &Arc<str>, ranked: &[Ranked]) -> Option<StrategyOutput> {
    for (strategy, confidence) in ranked {
        if let Some(output) = run_one(text, Arc::clone(strategy), *confidence).await {
            return Some(output);
        }
    }
    None
}

/// Run strategies on the blocking pool and collect outputs in the given order.
async fn run_concurrently(text: &Arc<str>, ranked: &[Ranked]) -> Vec<StrategyOutput> {
    let handles: Vec<_> = ranked
        .iter()
        .map(|(strategy, confidence)| {
            let strategy = Arc::clone(strategy);
            let text = Arc::clone(text);
            let confidence = *confidence;
            let kind = strategy.kind();
            (kind, confidence, tokio::task::spawn_blocking(move || strategy.extract(&text)))
        })
        .collect();

    let mut outputs = Vec::new();
    for (kind, confidence, handle) in handles {
        let result = handle.await.map_err(|_| ExtractionError::Aborted(kind));
        if let Some(output) = settle(kind, confidence, result.and_then(|r| r)) {
            outputs.push(output);
        }
    }
    outputs
}

async fn run_one(
    text: &Arc<str>,
    strategy: Arc<dyn Strategy>,
    confidence: u8,
) -> Option<StrategyOutput> {
    let kind = strategy.kind();
    let text = Arc::clone(text);
    let result = tokio::task::spawn_blocking(move || strategy.extract(&text))
        .await
        .map_err(|_| ExtractionError::Aborted(kind));
    settle(kind, confidence, result.and_then(|r| r))
}

fn settle(
    kind: StrategyKind,
    confidence: u8,
    result: std::result::Result<Option<ExtractedFieldSet>, ExtractionError>,
) -> Option<StrategyOutput> {
    match result {
        Ok(Some(fields)) if !fields.is_empty() => Some(StrategyOutput {
            strategy: kind,
            confidence,
            fields,
        }),
        Ok(_) => {
            tracing::debug!(strategy = %kind, "Strategy found nothing");
            None
        }
        Err(e) => {
            tracing::warn!("Strategy {} failed: {}", kind, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionResult;
    use crate::fields;

    const FORM_WITH_REFERENCES: &str = "\
EXPEDIENTE: A/B1-22-2025-X
OFICIO: UIF/110/2025
AUTORIDAD: Unidad de Inteligencia Financiera
Se ordena el aseguramiento de la cuenta 012180001234567891 por $236,569.68.
Inmovilizar dicha cuenta hasta nuevo aviso.
";

    struct Exploding;

    impl Strategy for Exploding {
        fn kind(&self) -> StrategyKind {
            StrategyKind::StructuredLabel
        }

        fn score(&self, _signals: &StructuralSignals) -> u8 {
            100
        }

        fn extract(&self, _text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
            panic!("strategy bug")
        }
    }

    struct Failing;

    impl Strategy for Failing {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Tabular
        }

        fn score(&self, _signals: &StructuralSignals) -> u8 {
            95
        }

        fn extract(&self, _text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
            Err(ExtractionError::Failed("malformed table".into()))
        }
    }

    #[tokio::test]
    async fn test_complement_fills_gaps_after_primary() {
        let extraction = Orchestrator::new()
            .run(FORM_WITH_REFERENCES, ExtractionMode::Complement)
            .await;

        assert_eq!(extraction.primary, Some(StrategyKind::StructuredLabel));
        assert_eq!(extraction.fields.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(
            extraction.fields.get(fields::ACCOUNT_NUMBER),
            Some("012180001234567891")
        );
        assert_eq!(extraction.fields.amounts.len(), 1);
        assert_eq!(
            extraction.trace,
            vec![
                OrchestratorState::Analyzing,
                OrchestratorState::SelectingStrategy,
                OrchestratorState::Extracting,
                OrchestratorState::Complementing,
                OrchestratorState::Done,
            ]
        );
        let strategies: Vec<_> = extraction.outputs.iter().map(|o| o.strategy).collect();
        assert_eq!(
            strategies,
            vec![
                StrategyKind::StructuredLabel,
                StrategyKind::CrossReference,
                StrategyKind::GapFilling,
            ]
        );
    }

    #[tokio::test]
    async fn test_gap_filling_never_overwrites_primary() {
        let text = "Ver tambien ZZZ/99/Q\nEXPEDIENTE: FIRST-1-A\nOFICIO: X/1/2\nAUTORIDAD: SAT";
        let extraction = Orchestrator::new().run(text, ExtractionMode::Complement).await;

        let gap = extraction
            .outputs
            .iter()
            .find(|o| o.strategy == StrategyKind::GapFilling)
            .unwrap();
        assert_eq!(gap.fields.case_number(), Some("ZZZ/99/Q"));
        assert_eq!(extraction.fields.case_number(), Some("FIRST-1-A"));
    }

    #[tokio::test]
    async fn test_best_strategy_only_skips_complements() {
        let extraction = Orchestrator::new()
            .run(FORM_WITH_REFERENCES, ExtractionMode::BestStrategyOnly)
            .await;

        assert_eq!(extraction.outputs.len(), 1);
        assert_eq!(extraction.fields.get(fields::ACCOUNT_NUMBER), None);
        assert!(!extraction.trace.contains(&OrchestratorState::Complementing));
    }

    #[tokio::test]
    async fn test_merge_all_prefers_higher_confidence() {
        let extraction = Orchestrator::new()
            .run(FORM_WITH_REFERENCES, ExtractionMode::MergeAll)
            .await;

        assert_eq!(extraction.outputs.len(), 4);
        assert_eq!(extraction.fields.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(
            extraction.fields.get(fields::ACCOUNT_NUMBER),
            Some("012180001234567891")
        );
    }

    #[tokio::test]
    async fn test_plain_text_falls_back_to_gap_filling() {
        let extraction = Orchestrator::new()
            .run("Oficio sin formato, expediente A/B1-22-2025-X.", ExtractionMode::Complement)
            .await;

        assert_eq!(extraction.primary, Some(StrategyKind::GapFilling));
        assert_eq!(extraction.fields.case_number(), Some("A/B1-22-2025-X"));
    }

    #[tokio::test]
    async fn test_failing_strategies_are_not_fatal() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Arc::new(Exploding),
            Arc::new(Failing),
            Arc::new(crate::extract::GapFillingStrategy),
        ]);

        let extraction = orchestrator
            .run("Expediente A/B1-22-2025-X", ExtractionMode::Complement)
            .await;

        assert_eq!(extraction.primary, Some(StrategyKind::GapFilling));
        assert_eq!(extraction.fields.case_number(), Some("A/B1-22-2025-X"));
    }

    #[tokio::test]
    async fn test_empty_text_yields_empty_set() {
        let fields = Orchestrator::new()
            .reconcile_source("", ExtractionMode::Complement)
            .await;
        assert!(fields.is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("merge-all".parse::<ExtractionMode>().unwrap(), ExtractionMode::MergeAll);
        assert_eq!("BEST".parse::<ExtractionMode>().unwrap(), ExtractionMode::BestStrategyOnly);
        assert!(matches!(
            "everything".parse::<ExtractionMode>(),
            Err(Error::UnknownMode(_))
        ));
    }
}
