use std::sync::LazyLock;

use regex::Regex;

use super::labels::{self, LabelTarget};
use super::{non_empty, ExtractionResult, Strategy, StrategyKind, StructuralSignals};
use crate::record::{ExtractedFieldSet, Party};

static WIDE_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

static RULE_CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:?-{2,}:?$").unwrap());

/// Split a line into table cells on `|`, tabs, or runs of two or more spaces.
///
/// Returns `None` for lines with fewer than two cells and for `---|---` rules.
pub(super) fn table_cells(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    let cells: Vec<&str> = if line.contains('|') {
        line.trim_matches('|').split('|').map(str::trim).collect()
    } else if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        WIDE_GAP.split(line).map(str::trim).collect()
    };

    if cells.len() < 2 || cells.iter().all(|c| RULE_CELL.is_match(c)) {
        return None;
    }
    Some(cells)
}

fn is_rule_row(line: &str) -> bool {
    let line = line.trim().trim_matches('|');
    !line.is_empty() && line.split('|').all(|c| RULE_CELL.is_match(c.trim()))
}

/// Column targets when at least two cells of the row name known fields.
pub(super) fn header_columns(cells: &[&str]) -> Option<Vec<Option<LabelTarget>>> {
    let columns: Vec<Option<LabelTarget>> =
        cells.iter().map(|c| labels::header_target(c)).collect();
    (columns.iter().flatten().count() >= 2).then_some(columns)
}

pub struct TabularStrategy;

impl TabularStrategy {
    fn apply_row(set: &mut ExtractedFieldSet, columns: &[Option<LabelTarget>], cells: &[&str]) {
        let mut row_party: Option<usize> = None;

        for (target, cell) in columns.iter().zip(cells) {
            let Some(target) = *target else { continue };
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }

            match (target, row_party) {
                (LabelTarget::Party(role), _) => {
                    set.parties.push(Party::new(cell, role));
                    row_party = Some(set.parties.len() - 1);
                }
                (LabelTarget::PartyTaxId, Some(i)) => {
                    set.parties[i].tax_id.get_or_insert_with(|| cell.to_string());
                }
                (LabelTarget::PartyAddress, Some(i)) => {
                    set.parties[i].address.get_or_insert_with(|| cell.to_string());
                }
                _ => labels::apply(set, target, cell),
            }
        }
    }
}

impl Strategy for TabularStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tabular
    }

    fn score(&self, signals: &StructuralSignals) -> u8 {
        if signals.table_header_present && signals.table_like_row_count >= 2 {
            85
        } else {
            0
        }
    }

    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
        let mut set = ExtractedFieldSet::new();
        let mut columns: Option<Vec<Option<LabelTarget>>> = None;

        for line in text.lines() {
            if is_rule_row(line) {
                continue;
            }
            let Some(cells) = table_cells(line) else {
                columns = None;
                continue;
            };

            if let Some(header) = header_columns(&cells) {
                columns = Some(header);
                continue;
            }

            if let Some(columns) = &columns {
                Self::apply_row(&mut set, columns, &cells);
            }
        }

        Ok(non_empty(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::analyze;
    use crate::fields;
    use crate::record::PartyRole;

    const PIPE_TABLE: &str = "\
Relación de cuentas
| EXPEDIENTE | TITULAR | RFC | CUENTA | MONTO |
|---|---|---|---|---|
| A/B1-22-2025-X | Juan Perez | PEPJ800101AB1 | 012180001234567891 | $236,569.68 |
| A/B1-22-2025-X | Maria Lopez | LOMM900202CD2 | 012180009876543210 | $1,000.00 |
";

    #[test]
    fn test_table_cells() {
        assert_eq!(table_cells("a | b | c"), Some(vec!["a", "b", "c"]));
        assert_eq!(table_cells("a\tb"), Some(vec!["a", "b"]));
        assert_eq!(table_cells("Holder    Amount"), Some(vec!["Holder", "Amount"]));
        assert_eq!(table_cells("just one sentence here"), None);
        assert_eq!(table_cells("|---|:---:|"), None);
    }

    #[test]
    fn test_pipe_table_rows() {
        let set = TabularStrategy.extract(PIPE_TABLE).unwrap().unwrap();

        assert_eq!(set.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(set.get(fields::ACCOUNT_NUMBER), Some("012180001234567891"));
        assert_eq!(set.parties.len(), 2);
        assert_eq!(set.parties[1].name, "Maria Lopez");
        assert_eq!(set.parties[1].role, PartyRole::Holder);
        assert_eq!(set.parties[1].tax_id.as_deref(), Some("LOMM900202CD2"));
        assert_eq!(set.amounts.len(), 2);
        assert_eq!(set.amounts[0].currency.as_deref(), Some("MXN"));
    }

    #[test]
    fn test_whitespace_table() {
        let text = "Holder        Co-Holder       Amount\nJuan Perez    Maria Lopez     1500 USD\n";
        let set = TabularStrategy.extract(text).unwrap().unwrap();
        assert_eq!(set.parties.len(), 2);
        assert_eq!(set.parties[1].role, PartyRole::CoHolder);
        assert_eq!(set.amounts[0].currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_score_needs_header_and_rows() {
        assert_eq!(TabularStrategy.score(&analyze(PIPE_TABLE)), 85);
        assert_eq!(TabularStrategy.score(&analyze("a | b\nc | d")), 0);
        assert_eq!(TabularStrategy.extract("a | b\nc | d").unwrap(), None);
    }
}
