use std::sync::LazyLock;

use regex::Regex;

use super::cross_reference::{ACCOUNT_CODE, CURRENCY_AMOUNT, DATE_MENTION};
use super::{non_empty, ExtractionResult, Strategy, StrategyKind, StructuralSignals};
use crate::fields;
use crate::record::{ExtractedFieldSet, MonetaryAmount};

const FIXED_CONFIDENCE: u8 = 50;

static CASE_NUMBER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z0-9]{1,12}(?:[/\-][A-Z0-9]{1,12}){2,}\b").unwrap()
});

static TAX_ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3}\b").unwrap());

/// Last-resort pattern scan over the whole text.
///
/// Finds values by shape alone, so it always runs after the label-driven
/// strategies and only ever fills what they left empty.
pub struct GapFillingStrategy;

impl Strategy for GapFillingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GapFilling
    }

    fn score(&self, _signals: &StructuralSignals) -> u8 {
        FIXED_CONFIDENCE
    }

    fn confidence(&self, _text: &str) -> u8 {
        FIXED_CONFIDENCE
    }

    fn extract(&self, text: &str) -> ExtractionResult<Option<ExtractedFieldSet>> {
        let mut set = ExtractedFieldSet::new();

        // A bare date like 15/03/2025 has the same shape; case numbers carry a letter.
        if let Some(case) = CASE_NUMBER_TOKEN
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|t| {
                t.bytes().any(|b| b.is_ascii_alphabetic()) && t.bytes().any(|b| b.is_ascii_digit())
            })
        {
            set.set(fields::CASE_NUMBER, case);
        }

        if let Some(account) = ACCOUNT_CODE.find(text) {
            set.set(fields::ACCOUNT_NUMBER, account.as_str());
        }

        if let Some(tax_id) = TAX_ID_TOKEN.find(text) {
            set.additional_fields.insert(
                fields::PARTY_TAX_ID.to_string(),
                Some(tax_id.as_str().to_string()),
            );
        }

        for date in DATE_MENTION.find_iter(text) {
            if !set.dates.iter().any(|d| d == date.as_str()) {
                set.dates.push(date.as_str().to_string());
            }
        }

        for raw in CURRENCY_AMOUNT.find_iter(text) {
            let amount = MonetaryAmount::from_raw(raw.as_str());
            if !set.amounts.contains(&amount) {
                set.amounts.push(amount);
            }
        }

        Ok(non_empty(set))
    }
}
