use super::labels::{self, leading_label};
use super::{non_empty, ExtractionResult, Strategy, StrategyKind, StructuralSignals};
use crate::record::ExtractedFieldSet;

const MIN_CONTEXTUAL_LABELS: usize = 2;

/// Tolerant label matching for free-form documents: any case, accents optional,
/// synonyms accepted, and the value may sit on the line after its label.
pub struct ContextualStrategy;

impl Strategy for ContextualStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Contextual
    }

    fn score(&self, signals: &StructuralSignals) -> u8 {
        if signals.contextual_label_count >= MIN_CONTEXTUAL_LABELS {
            75
        } else {
            0
        }
    }

    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
        let mut set = ExtractedFieldSet::new();
        let lines: Vec<&str> = text.lines().collect();

        for (i, line) in lines.iter().enumerate() {
            let Some((target, value)) = leading_label(line) else {
                continue;
            };

            if !value.is_empty() {
                labels::apply(&mut set, target, value);
                continue;
            }

            let next = lines[i + 1..].iter().find(|l| !l.trim().is_empty());
            if let Some(next) = next.filter(|l| leading_label(l).is_none()) {
                labels::apply(&mut set, target, next);
            }
        }

        Ok(non_empty(set))
    }
}
