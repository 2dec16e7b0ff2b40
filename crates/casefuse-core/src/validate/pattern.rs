use std::sync::LazyLock;

use regex::Regex;

use crate::fields::FieldKind;
use crate::sanitize::{parse_compact_date, sanitize_amount};

static RFC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3}$").unwrap());

static CURP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{4}\d{6}[HMX][A-Z]{5}[A-Z0-9]\d$").unwrap());

static CASE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{1,12}(?:[/\-.][A-Z0-9]{1,12}){2,}$").unwrap());

static PERSON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}][\p{L} .'\-]{1,119}$").unwrap());

const ACCOUNT_CODE_LEN: usize = 18;

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Tax registry (RFC) or population registry (CURP) code.
#[must_use]
pub fn is_identifier_code(value: Option<&str>) -> bool {
    present(value).is_some_and(|v| {
        let upper = v.to_uppercase();
        RFC.is_match(&upper) || CURP.is_match(&upper)
    })
}

/// Legal case number: three or more alphanumeric segments joined by `/`, `-` or `.`,
/// with at least one digit somewhere.
#[must_use]
pub fn is_case_number(value: Option<&str>) -> bool {
    present(value).is_some_and(|v| {
        let upper = v.to_uppercase();
        CASE_NUMBER.is_match(&upper) && upper.bytes().any(|b| b.is_ascii_digit())
    })
}

/// `YYYYMMDD` that names a real calendar day.
#[must_use]
pub fn is_compact_date(value: Option<&str>) -> bool {
    present(value).is_some_and(|v| parse_compact_date(v).is_some())
}

/// Fixed-length interbank routing code (CLABE).
#[must_use]
pub fn is_account_code(value: Option<&str>) -> bool {
    present(value)
        .is_some_and(|v| v.len() == ACCOUNT_CODE_LEN && v.bytes().all(|b| b.is_ascii_digit()))
}

#[must_use]
pub fn is_amount(value: Option<&str>) -> bool {
    sanitize_amount(value).is_some()
}

#[must_use]
pub fn is_bounded_text(value: Option<&str>, max_chars: usize) -> bool {
    present(value).is_some_and(|v| {
        v.chars().count() <= max_chars && v.chars().any(char::is_alphanumeric)
    })
}

#[must_use]
pub fn is_person_name(value: Option<&str>) -> bool {
    present(value).is_some_and(|v| PERSON_NAME.is_match(v))
}

/// Format rule for a field's semantic kind.
#[must_use]
pub fn matches_kind(kind: FieldKind, value: Option<&str>) -> bool {
    match kind {
        FieldKind::Identifier => is_identifier_code(value),
        FieldKind::CaseNumber => is_case_number(value),
        FieldKind::Date => is_compact_date(value),
        FieldKind::AccountNumber => is_account_code(value),
        FieldKind::Amount => is_amount(value),
        FieldKind::PersonName => is_person_name(value),
        FieldKind::Address | FieldKind::FreeText => is_bounded_text(value, kind.text_limit()),
    }
}
