//! Field labels shared by the label-driven strategies.

use std::sync::LazyLock;

use regex::Regex;

use crate::fields;
use crate::record::{ExtractedFieldSet, MonetaryAmount, Party, PartyRole};
use crate::sanitize::fold_char;

/// Where a labelled value lands in an [`ExtractedFieldSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTarget {
    Field(&'static str),
    Date,
    Amount,
    Party(PartyRole),
    /// Attaches to the most recent party.
    PartyTaxId,
    PartyAddress,
}

struct Label {
    target: LabelTarget,
    /// Uppercase form printed by form templates, followed by a colon.
    canonical: &'static [&'static str],
    /// Accent-free lowercase variants seen in free-form documents.
    synonyms: &'static [&'static str],
}

const LABELS: &[Label] = &[
    Label {
        target: LabelTarget::Field(fields::CASE_NUMBER),
        canonical: &["CASE NUMBER", "EXPEDIENTE"],
        synonyms: &[
            "case no",
            "case file",
            "file number",
            "numero de expediente",
            "no. de expediente",
            "expediente no",
        ],
    },
    Label {
        target: LabelTarget::Field(fields::OFFICE_NUMBER),
        canonical: &["OFFICE NUMBER", "NÚMERO DE OFICIO", "OFICIO"],
        synonyms: &[
            "office no",
            "reference number",
            "reference",
            "ref",
            "oficio no",
            "no. de oficio",
            "numero de oficio",
        ],
    },
    Label {
        target: LabelTarget::Field(fields::AUTHORITY),
        canonical: &["AUTHORITY", "AUTORIDAD"],
        synonyms: &[
            "requesting authority",
            "issuing authority",
            "autoridad solicitante",
            "autoridad requirente",
        ],
    },
    Label {
        target: LabelTarget::Field(fields::CAUSE),
        canonical: &["CAUSE", "CAUSA"],
        synonyms: &["reason", "grounds", "motivo"],
    },
    Label {
        target: LabelTarget::Field(fields::REQUESTED_ACTION),
        canonical: &["REQUESTED ACTION", "ACCIÓN SOLICITADA"],
        synonyms: &[
            "action requested",
            "requested measure",
            "accion requerida",
            "medida solicitada",
            "action",
        ],
    },
    Label {
        target: LabelTarget::Field(fields::ACCOUNT_NUMBER),
        canonical: &["ACCOUNT NUMBER", "CUENTA", "CLABE"],
        synonyms: &[
            "account no",
            "account",
            "no. de cuenta",
            "numero de cuenta",
            "cuenta clabe",
        ],
    },
    Label {
        target: LabelTarget::Amount,
        canonical: &["AMOUNT", "MONTO"],
        synonyms: &["total amount", "monto total", "importe", "cantidad", "sum"],
    },
    Label {
        target: LabelTarget::Date,
        canonical: &["DATE", "FECHA"],
        synonyms: &["issue date", "date issued", "fecha de emision"],
    },
    Label {
        target: LabelTarget::Party(PartyRole::Holder),
        canonical: &["HOLDER", "TITULAR"],
        synonyms: &[
            "account holder",
            "holder name",
            "nombre del titular",
            "titular de la cuenta",
        ],
    },
    Label {
        target: LabelTarget::Party(PartyRole::CoHolder),
        canonical: &["CO-HOLDER", "COTITULAR"],
        synonyms: &["co holder", "joint holder", "co-titular", "cotitular de la cuenta"],
    },
    Label {
        target: LabelTarget::PartyTaxId,
        canonical: &["TAX ID", "RFC"],
        synonyms: &["tax identifier", "curp"],
    },
    Label {
        target: LabelTarget::PartyAddress,
        canonical: &["ADDRESS", "DOMICILIO"],
        synonyms: &["street address", "domicilio fiscal", "direccion"],
    },
];

const SEPARATORS: &[char] = &[':', '-', '–', '=', '.', '#'];

struct Phrase {
    folded: Vec<char>,
    target: LabelTarget,
}

/// Every canonical and synonym phrase, folded, longest first.
static PHRASES: LazyLock<Vec<Phrase>> = LazyLock::new(|| {
    let mut phrases: Vec<Phrase> = LABELS
        .iter()
        .flat_map(|label| {
            label
                .canonical
                .iter()
                .chain(label.synonyms)
                .map(|p| Phrase {
                    folded: p.chars().map(fold_char).collect(),
                    target: label.target,
                })
        })
        .collect();
    phrases.sort_by(|a, b| b.folded.len().cmp(&a.folded.len()));
    phrases
});

/// `LABEL: value` lines using the exact uppercase template labels.
pub static CANONICAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    let mut canonical: Vec<&str> = LABELS
        .iter()
        .flat_map(|l| l.canonical.iter().copied())
        .collect();
    canonical.sort_by_key(|p| std::cmp::Reverse(p.len()));
    let alternation = canonical
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?m)^[ \t]*({alternation})[ \t]*:[ \t]*(.*)$")).unwrap()
});

#[must_use]
pub fn canonical_target(label: &str) -> Option<LabelTarget> {
    LABELS
        .iter()
        .find(|l| l.canonical.contains(&label))
        .map(|l| l.target)
}

/// Match a label at the start of `line`, case- and accent-insensitively.
///
/// The label must be followed by a separator or the end of the line; the returned
/// remainder is the value text, empty when the value sits on the next line.
#[must_use]
pub fn leading_label(line: &str) -> Option<(LabelTarget, &str)> {
    let trimmed = line.trim_start();
    PHRASES.iter().find_map(|phrase| {
        let rest = strip_folded_prefix(trimmed, &phrase.folded)?.trim_start();
        if rest.is_empty() {
            return Some((phrase.target, rest));
        }
        if !rest.starts_with(SEPARATORS) {
            return None;
        }
        let value = rest.trim_start_matches(|c: char| SEPARATORS.contains(&c) || c.is_whitespace());
        Some((phrase.target, value.trim_end()))
    })
}

/// A table header cell naming a field, with an optional trailing colon.
#[must_use]
pub fn header_target(cell: &str) -> Option<LabelTarget> {
    let cell = cell.trim().trim_end_matches(':').trim_end();
    PHRASES.iter().find_map(|phrase| {
        strip_folded_prefix(cell, &phrase.folded)
            .filter(|rest| rest.is_empty())
            .map(|_| phrase.target)
    })
}

fn strip_folded_prefix<'a>(text: &'a str, folded: &[char]) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in folded {
        let (_, c) = chars.next()?;
        if fold_char(c) != *expected {
            return None;
        }
    }
    Some(chars.as_str())
}

/// Record a raw labelled value. Scalars keep their first occurrence.
pub fn apply(set: &mut ExtractedFieldSet, target: LabelTarget, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    match target {
        LabelTarget::Field(name) => {
            if !set.has(name) {
                set.set(name, value);
            }
        }
        LabelTarget::Date => set.dates.push(value.to_string()),
        LabelTarget::Amount => set.amounts.push(MonetaryAmount::from_raw(value)),
        LabelTarget::Party(role) => set.parties.push(Party::new(value, role)),
        LabelTarget::PartyTaxId => match set.parties.last_mut() {
            Some(party) if party.tax_id.is_none() => party.tax_id = Some(value.to_string()),
            _ => {
                set.additional_fields
                    .entry(fields::PARTY_TAX_ID.to_string())
                    .or_insert_with(|| Some(value.to_string()));
            }
        },
        LabelTarget::PartyAddress => match set.parties.last_mut() {
            Some(party) if party.address.is_none() => party.address = Some(value.to_string()),
            _ => {
                set.additional_fields
                    .entry(fields::PARTY_ADDRESS.to_string())
                    .or_insert_with(|| Some(value.to_string()));
            }
        },
    }
}
