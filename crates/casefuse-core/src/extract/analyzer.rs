use serde::{Deserialize, Serialize};

use super::cross_reference::reference_count;
use super::labels::{leading_label, CANONICAL_LINE};
use super::tabular::{header_columns, table_cells};

/// Layout cues strategies use to rate themselves without extracting anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSignals {
    /// `LABEL:` lines using the exact template labels.
    pub label_count: usize,
    /// Lines opening with any known label or synonym.
    pub contextual_label_count: usize,
    pub table_like_row_count: usize,
    pub table_header_present: bool,
    pub cross_reference_phrase_count: usize,
}

#[must_use]
pub fn analyze(text: &str) -> StructuralSignals {
    let mut signals = StructuralSignals {
        label_count: CANONICAL_LINE.find_iter(text).count(),
        cross_reference_phrase_count: reference_count(text),
        ..StructuralSignals::default()
    };

    for line in text.lines() {
        if leading_label(line).is_some() {
            signals.contextual_label_count += 1;
        }
        if let Some(cells) = table_cells(line) {
            signals.table_like_row_count += 1;
            if header_columns(&cells).is_some() {
                signals.table_header_present = true;
            }
        }
    }

    tracing::debug!(?signals, "Analyzed document structure");
    signals
}
