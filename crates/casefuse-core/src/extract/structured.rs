use super::labels::{self, CANONICAL_LINE};
use super::{non_empty, ExtractionResult, Strategy, StrategyKind, StructuralSignals};
use crate::record::ExtractedFieldSet;

const MIN_CANONICAL_LABELS: usize = 3;

/// Reads `LABEL: value` lines printed by the standard request templates.
pub struct StructuredLabelStrategy;

impl Strategy for StructuredLabelStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StructuredLabel
    }

    fn score(&self, signals: &StructuralSignals) -> u8 {
        if signals.label_count >= MIN_CANONICAL_LABELS {
            90
        } else {
            0
        }
    }

    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
        let mut set = ExtractedFieldSet::new();

        for caps in CANONICAL_LINE.captures_iter(text) {
            let Some(target) = labels::canonical_target(&caps[1]) else {
                continue;
            };
            labels::apply(&mut set, target, &caps[2]);
        }

        Ok(non_empty(set))
    }
}
