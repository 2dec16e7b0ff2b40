use std::cmp::Reverse;

use crate::extract::StrategyOutput;
use crate::record::ExtractedFieldSet;

/// Combine several strategy outputs for the same document.
///
/// Outputs are taken in descending confidence, ties by strategy priority; each
/// later output only fills what the earlier ones left empty.
#[must_use]
pub fn merge_intra_source(outputs: &[StrategyOutput]) -> ExtractedFieldSet {
    let mut ordered: Vec<&StrategyOutput> = outputs.iter().collect();
    ordered.sort_by_key(|o| (Reverse(o.confidence), o.strategy));

    let mut merged = ExtractedFieldSet::new();
    for output in ordered {
        let filled = merged.fill_gaps(&output.fields);
        tracing::debug!(strategy = %output.strategy, filled, "Merged strategy output");
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::StrategyKind;
    use crate::fields;

    fn output(strategy: StrategyKind, confidence: u8, fields: ExtractedFieldSet) -> StrategyOutput {
        StrategyOutput {
            strategy,
            confidence,
            fields,
        }
    }

    #[test]
    fn test_higher_confidence_wins_regardless_of_input_order() {
        let outputs = vec![
            output(
                StrategyKind::GapFilling,
                50,
                ExtractedFieldSet::new()
                    .with_field(fields::CASE_NUMBER, "GAP/1/2")
                    .with_field(fields::ACCOUNT_NUMBER, "012180001234567891"),
            ),
            output(
                StrategyKind::StructuredLabel,
                90,
                ExtractedFieldSet::new().with_field(fields::CASE_NUMBER, "A/B1-22-2025-X"),
            ),
        ];

        let merged = merge_intra_source(&outputs);

        assert_eq!(merged.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(merged.get(fields::ACCOUNT_NUMBER), Some("012180001234567891"));
    }

    #[test]
    fn test_equal_confidence_uses_priority() {
        let outputs = vec![
            output(
                StrategyKind::Contextual,
                80,
                ExtractedFieldSet::new().with_field(fields::CAUSE, "contextual"),
            ),
            output(
                StrategyKind::Tabular,
                80,
                ExtractedFieldSet::new().with_field(fields::CAUSE, "tabular"),
            ),
        ];

        assert_eq!(merge_intra_source(&outputs).get(fields::CAUSE), Some("tabular"));
    }

    #[test]
    fn test_no_outputs() {
        assert!(merge_intra_source(&[]).is_empty());
    }
}
