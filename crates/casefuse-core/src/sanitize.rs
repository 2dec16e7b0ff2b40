//! Normalization of raw extracted strings.
//!
//! Every function here is total: any input, including `None` and garbage, yields
//! either a cleaned value or `None`. Every function is idempotent.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::fields::FieldKind;

static SPACE_ENTITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&nbsp;|&#0*160;|&#x0*a0;").unwrap());

static ANGLE_ENTITIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)&lt;|&gt;|&#0*60;|&#0*62;|&#x0*3c;|&#x0*3e;").unwrap()
});

static SEPARATOR_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([/\-.])\s*").unwrap());

static SPANISH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})\s+de\s+([a-záéíóú]+)\s+(?:de|del)\s+(\d{4})$").unwrap()
});

/// Human annotations that mean "no value here". Compared lowercase.
const EMPTY_ANNOTATIONS: &[&str] = &[
    "no se cuenta",
    "no se cuenta con el dato",
    "no se cuenta con la información",
    "no aplica",
    "no disponible",
    "no especificado",
    "sin dato",
    "sin datos",
    "sin información",
    "sin informacion",
    "ver monto mencionado en el texto",
    "ver monto señalado en el texto",
    "see amount mentioned in text",
    "not available",
    "not applicable",
    "not specified",
    "n/a",
    "n/d",
    "s/d",
    "n.a.",
    "na",
    "none",
    "null",
    "-",
    "--",
    "---",
];

/// Currency markers stripped from amounts, longest first so prefixes do not
/// leave fragments behind.
const CURRENCY_MARKERS: &[&str] = &[
    "dólares", "dolares", "pesos", "euros", "m.n.", "us$", "usd", "mxn", "mxp", "eur",
    "peso", "dls", "mn", "$", "€",
];

const SPANISH_MONTHS: &[&str] = &[
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%d %B %Y",
];

#[must_use]
pub fn sanitize(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }

    let stripped = strip_entities(raw.trim());
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() || is_empty_annotation(&collapsed) {
        return None;
    }

    if collapsed.chars().all(|c| c == ' ' || c == '_') {
        return None;
    }

    Some(collapsed)
}

fn strip_entities(input: &str) -> String {
    let mut current: String = input
        .chars()
        .filter(|c| !matches!(c, '\u{200b}' | '\u{feff}'))
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect();

    // Removing one entity can expose another ("&l&lt;t;"), so run to a fixpoint.
    loop {
        let spaced = SPACE_ENTITIES.replace_all(&current, " ");
        let next = ANGLE_ENTITIES.replace_all(&spaced, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn is_empty_annotation(value: &str) -> bool {
    let lower = value.to_lowercase();
    let trimmed = lower.trim_end_matches('.').trim();
    EMPTY_ANNOTATIONS
        .iter()
        .any(|a| *a == lower || a.trim_end_matches('.') == trimmed)
}

/// Parse a monetary amount and round it half away from zero to whole units.
///
/// Negative values and anything that is not a plain decimal once currency markers
/// and thousands separators are removed yield `None`.
#[must_use]
pub fn sanitize_amount(raw: Option<&str>) -> Option<String> {
    let cleaned = sanitize(raw)?.to_lowercase();

    let mut number = cleaned;
    for marker in CURRENCY_MARKERS {
        number = number.replace(marker, "");
    }
    number.retain(|c| c != ',' && !c.is_whitespace());

    if number.starts_with('-') || (number.starts_with('(') && number.ends_with(')')) {
        return None;
    }

    round_decimal(number.trim_start_matches('+'))
}

fn round_decimal(number: &str) -> Option<String> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut units: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    if fraction.as_bytes().first().is_some_and(|d| *d >= b'5') {
        units = units.checked_add(1)?;
    }

    Some(units.to_string())
}

/// Lowercase, accent-free form of a character for tolerant comparisons.
#[must_use]
pub fn fold_char(c: char) -> char {
    match c.to_lowercase().next().unwrap_or(c) {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        other => other,
    }
}

/// ISO currency code implied by markers in a raw amount, if any.
#[must_use]
pub fn detect_currency(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    if ["usd", "us$", "dólar", "dolar", "dls"].iter().any(|m| lower.contains(m)) {
        Some("USD")
    } else if ["eur", "€"].iter().any(|m| lower.contains(m)) {
        Some("EUR")
    } else if ["mxn", "m.n.", "peso", "$"].iter().any(|m| lower.contains(m)) {
        Some("MXN")
    } else {
        None
    }
}

/// Kind-aware canonical form, so equal values from different pipelines compare equal.
#[must_use]
pub fn sanitize_for(kind: FieldKind, raw: Option<&str>) -> Option<String> {
    match kind {
        FieldKind::Amount => sanitize_amount(raw),
        FieldKind::Date => settle(raw, |v| normalize_date(v).unwrap_or_else(|| v.to_string())),
        FieldKind::AccountNumber => settle(raw, |v| {
            v.chars().filter(|c| !matches!(c, ' ' | '-' | '.')).collect()
        }),
        FieldKind::Identifier => settle(raw, |v| {
            v.chars()
                .filter(|c| !matches!(c, ' ' | '-'))
                .flat_map(char::to_uppercase)
                .collect()
        }),
        FieldKind::CaseNumber => settle(raw, |v| {
            SEPARATOR_SPACING
                .replace_all(&v.to_uppercase(), "$1")
                .into_owned()
        }),
        FieldKind::PersonName | FieldKind::Address | FieldKind::FreeText => sanitize(raw),
    }
}

/// Apply `transform` and re-sanitize until neither changes the value.
///
/// A transform can turn a harmless value into an annotation ("n / a" into "N/A"),
/// so the result must be a fixpoint of both steps.
fn settle(raw: Option<&str>, transform: impl Fn(&str) -> String) -> Option<String> {
    let mut current = sanitize(raw)?;
    loop {
        let next = sanitize(Some(transform(&current).as_str()))?;
        if next == current {
            return Some(current);
        }
        current = next;
    }
}

/// Convert a recognizable calendar date to compact `YYYYMMDD`.
#[must_use]
pub fn normalize_date(value: &str) -> Option<String> {
    let value = value.trim();

    if let Some(date) = parse_compact_date(value) {
        return Some(date.format("%Y%m%d").to_string());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.format("%Y%m%d").to_string());
        }
    }

    let caps = SPANISH_DATE.captures(value)?;
    let day: u32 = caps[1].parse().ok()?;
    let month_name = caps[2].to_lowercase();
    let month = SPANISH_MONTHS.iter().position(|m| *m == month_name)?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()? + 1, day)?;
    Some(date.format("%Y%m%d").to_string())
}

/// Strict `YYYYMMDD` parse; rejects anything that is not a real calendar date.
#[must_use]
pub fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = value[0..4].parse().ok()?;
    let month: u32 = value[4..6].parse().ok()?;
    let day: u32 = value[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
