//! Canonical field names and the semantic kind attached to each.
//!
//! The kind decides how a value is sanitized, which format rule validates it, and
//! whether approximate matching may reconcile disagreeing sources.

use serde::{Deserialize, Serialize};

use crate::validate::CatalogCategory;

pub const CASE_NUMBER: &str = "case_number";
pub const OFFICE_NUMBER: &str = "office_number";
pub const AUTHORITY: &str = "authority";
pub const CAUSE: &str = "cause";
pub const REQUESTED_ACTION: &str = "requested_action";
pub const ACCOUNT_NUMBER: &str = "account_number";
pub const DATES: &str = "dates";
pub const AMOUNTS: &str = "amounts";

/// Scalar fields promoted to first-class status, in canonical order.
pub const SCALAR_FIELDS: [&str; 6] = [
    CASE_NUMBER,
    OFFICE_NUMBER,
    AUTHORITY,
    CAUSE,
    REQUESTED_ACTION,
    ACCOUNT_NUMBER,
];

pub const PARTY_NAME: &str = "name";
pub const PARTY_TAX_ID: &str = "tax_id";
pub const PARTY_ADDRESS: &str = "address";

const FREE_TEXT_LIMIT: usize = 500;
const SHORT_TEXT_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Identifier,
    CaseNumber,
    Date,
    AccountNumber,
    Amount,
    PersonName,
    Address,
    FreeText,
}

impl FieldKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::CaseNumber => "case_number",
            Self::Date => "date",
            Self::AccountNumber => "account_number",
            Self::Amount => "amount",
            Self::PersonName => "person_name",
            Self::Address => "address",
            Self::FreeText => "free_text",
        }
    }

    /// Maximum length accepted by the bounded-text rule for this kind.
    #[must_use]
    pub const fn text_limit(&self) -> usize {
        match self {
            Self::FreeText => FREE_TEXT_LIMIT,
            _ => SHORT_TEXT_LIMIT,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic kind for a canonical, party, or additional field name.
#[must_use]
pub fn kind_of(field: &str) -> FieldKind {
    if let Some(attr) = party_attribute(field) {
        return match attr {
            PARTY_NAME => FieldKind::PersonName,
            PARTY_TAX_ID => FieldKind::Identifier,
            PARTY_ADDRESS => FieldKind::Address,
            _ => FieldKind::FreeText,
        };
    }

    match field {
        CASE_NUMBER | OFFICE_NUMBER => FieldKind::CaseNumber,
        ACCOUNT_NUMBER => FieldKind::AccountNumber,
        DATES => FieldKind::Date,
        AMOUNTS => FieldKind::Amount,
        "tax_id" | "curp" | "rfc" => FieldKind::Identifier,
        "address" => FieldKind::Address,
        "holder_name" | "co_holder_name" => FieldKind::PersonName,
        _ => FieldKind::FreeText,
    }
}

/// Authoritative vocabulary a field is checked against, if any.
#[must_use]
pub fn catalog_for(field: &str) -> Option<CatalogCategory> {
    match field {
        AUTHORITY => Some(CatalogCategory::Authority),
        "area_code" => Some(CatalogCategory::AreaCode),
        "state_code" => Some(CatalogCategory::StateCode),
        "product_code" => Some(CatalogCategory::ProductCode),
        _ => None,
    }
}

#[must_use]
pub fn party_field(index: usize, attribute: &str) -> String {
    format!("parties.{index}.{attribute}")
}

fn party_attribute(field: &str) -> Option<&str> {
    let rest = field.strip_prefix("parties.")?;
    let (index, attr) = rest.split_once('.')?;
    index.parse::<usize>().ok()?;
    Some(attr)
}
