use std::sync::LazyLock;

use regex::Regex;

use super::{non_empty, ExtractionResult, Strategy, StrategyKind, StructuralSignals};
use crate::fields;
use crate::record::{ExtractedFieldSet, MonetaryAmount};

const AMOUNT_PHRASES: &[&str] = &[
    "the amount mentioned above",
    "the amount indicated above",
    "the aforementioned amount",
    "the said amount",
    "said amount",
    "el monto antes mencionado",
    "el monto señalado anteriormente",
    "el monto senalado anteriormente",
    "el importe antes señalado",
    "el importe antes senalado",
    "la cantidad antes mencionada",
    "dicho monto",
    "dicha cantidad",
];

const ACCOUNT_PHRASES: &[&str] = &[
    "the account indicated previously",
    "the account mentioned above",
    "the aforementioned account",
    "the said account",
    "said account",
    "la cuenta señalada anteriormente",
    "la cuenta senalada anteriormente",
    "la cuenta antes mencionada",
    "la cuenta referida",
    "dicha cuenta",
];

const DATE_PHRASES: &[&str] = &[
    "the date mentioned above",
    "the aforementioned date",
    "said date",
    "la fecha antes mencionada",
    "la fecha señalada",
    "la fecha senalada",
    "dicha fecha",
];

fn phrase_regex(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
}

static AMOUNT_REFERENCE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(AMOUNT_PHRASES));
static ACCOUNT_REFERENCE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(ACCOUNT_PHRASES));
static DATE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(DATE_PHRASES));

pub(super) static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:US\$|\$|€)\s?\d{1,3}(?:,\d{3})*(?:\.\d+)?(?:\s?(?:MXN|USD|EUR|M\.N\.))?|\b\d[\d,]*(?:\.\d+)?\s?(?:MXN|USD|EUR|M\.N\.|pesos|dólares|dolares)",
    )
    .unwrap()
});

pub(super) static ACCOUNT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{18}\b").unwrap());

pub(super) static DATE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b|\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}\s+de\s+[a-záéíóú]+\s+de(?:l)?\s+\d{4}\b",
    )
    .unwrap()
});

/// Number of backward-reference phrases in `text`.
#[must_use]
pub(super) fn reference_count(text: &str) -> usize {
    [&*AMOUNT_REFERENCE, &*ACCOUNT_REFERENCE, &*DATE_REFERENCE]
        .iter()
        .map(|re| re.find_iter(text).count())
        .sum()
}

/// Resolves phrases such as "the amount mentioned above" to the nearest preceding
/// value of the referenced type.
pub struct CrossReferenceStrategy;

impl CrossReferenceStrategy {
    fn nearest_before<'t>(value: &Regex, text: &'t str, end: usize) -> Option<&'t str> {
        value.find_iter(&text[..end]).last().map(|m| m.as_str())
    }
}

impl Strategy for CrossReferenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CrossReference
    }

    fn score(&self, signals: &StructuralSignals) -> u8 {
        if signals.cross_reference_phrase_count > 0 {
            80
        } else {
            0
        }
    }

    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
        let mut set = ExtractedFieldSet::new();

        for phrase in AMOUNT_REFERENCE.find_iter(text) {
            if let Some(raw) = Self::nearest_before(&CURRENCY_AMOUNT, text, phrase.start()) {
                let amount = MonetaryAmount::from_raw(raw);
                if !set.amounts.contains(&amount) {
                    set.amounts.push(amount);
                }
            }
        }

        for phrase in ACCOUNT_REFERENCE.find_iter(text) {
            if let Some(account) = Self::nearest_before(&ACCOUNT_CODE, text, phrase.start()) {
                if !set.has(fields::ACCOUNT_NUMBER) {
                    set.set(fields::ACCOUNT_NUMBER, account);
                }
            }
        }

        for phrase in DATE_REFERENCE.find_iter(text) {
            if let Some(date) = Self::nearest_before(&DATE_MENTION, text, phrase.start()) {
                if !set.dates.iter().any(|d| d == date) {
                    set.dates.push(date.to_string());
                }
            }
        }

        Ok(non_empty(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: &str = "\
Se solicita el aseguramiento de $236,569.68 depositados en la cuenta 012180001234567891
el día 15/03/2025. Se ordena inmovilizar el monto antes mencionado y dicha cuenta,
a partir de la fecha antes mencionada.";

    #[test]
    fn test_reference_count() {
        assert_eq!(reference_count(LETTER), 3);
        assert_eq!(reference_count("THE AMOUNT MENTIONED ABOVE and said account"), 2);
        assert_eq!(reference_count("no references here"), 0);
    }

    #[test]
    fn test_resolves_nearest_preceding_values() {
        let set = CrossReferenceStrategy.extract(LETTER).unwrap().unwrap();

        assert_eq!(set.amounts, vec![MonetaryAmount::new("$236,569.68").with_currency("MXN")]);
        assert_eq!(set.get(fields::ACCOUNT_NUMBER), Some("012180001234567891"));
        assert_eq!(set.dates, vec!["15/03/2025"]);
    }

    #[test]
    fn test_nearest_wins_over_earlier() {
        let text = "Primero $10.00, luego $20.00. Retener dicho monto.";
        let set = CrossReferenceStrategy.extract(text).unwrap().unwrap();
        assert_eq!(set.amounts[0].value, "$20.00");
    }

    #[test]
    fn test_reference_without_antecedent() {
        let text = "Retener dicho monto de inmediato.";
        assert_eq!(CrossReferenceStrategy.extract(text).unwrap(), None);
    }

    #[test]
    fn test_score() {
        let signals = StructuralSignals {
            cross_reference_phrase_count: 1,
            ..StructuralSignals::default()
        };
        assert_eq!(CrossReferenceStrategy.score(&signals), 80);
        assert_eq!(CrossReferenceStrategy.score(&StructuralSignals::default()), 0);
    }
}
