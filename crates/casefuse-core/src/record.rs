use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fields;
use crate::sanitize::detect_currency;
use crate::source::SourceKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl MonetaryAmount {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            currency: None,
        }
    }

    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Keep the raw text and record any currency its markers imply.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let amount = Self::new(raw.trim());
        match detect_currency(raw) {
            Some(code) => amount.with_currency(code),
            None => amount,
        }
    }

    /// Whole units, once the value has been through amount sanitization.
    #[must_use]
    pub fn units(&self) -> Option<u128> {
        self.value.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Holder,
    CoHolder,
    Other,
}

impl PartyRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Holder => "holder",
            Self::CoHolder => "co_holder",
            Self::Other => "other",
        }
    }

    /// Title-holders and co-holders count toward the per-submission party limit.
    #[must_use]
    pub const fn is_holder_like(&self) -> bool {
        matches!(self, Self::Holder | Self::CoHolder)
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub role: PartyRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Party {
    #[must_use]
    pub fn new(name: impl Into<String>, role: PartyRole) -> Self {
        Self {
            name: name.into(),
            role,
            tax_id: None,
            address: None,
        }
    }

    #[must_use]
    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    fn fill_gaps(&mut self, other: &Self) -> usize {
        let mut filled = 0;
        if is_absent(self.tax_id.as_deref()) && !is_absent(other.tax_id.as_deref()) {
            self.tax_id.clone_from(&other.tax_id);
            filled += 1;
        }
        if is_absent(self.address.as_deref()) && !is_absent(other.address.as_deref()) {
            self.address.clone_from(&other.address);
            filled += 1;
        }
        filled
    }
}

/// Best-effort field set produced from one source document.
///
/// Values are raw strategy output until the fusion boundary sanitizes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFieldSet {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts: Vec<MonetaryAmount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parties: Vec<Party>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_fields: BTreeMap<String, Option<String>>,
}

impl ExtractedFieldSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.dates.push(date.into());
        self
    }

    #[must_use]
    pub fn with_amount(mut self, amount: MonetaryAmount) -> Self {
        self.amounts.push(amount);
        self
    }

    #[must_use]
    pub fn with_party(mut self, party: Party) -> Self {
        self.parties.push(party);
        self
    }

    #[must_use]
    pub fn with_additional(mut self, name: &str, value: Option<String>) -> Self {
        self.additional_fields.insert(name.to_string(), value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        !is_absent(self.get(name))
    }

    #[must_use]
    pub fn case_number(&self) -> Option<&str> {
        self.get(fields::CASE_NUMBER)
    }

    #[must_use]
    pub fn office_number(&self) -> Option<&str> {
        self.get(fields::OFFICE_NUMBER)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| is_absent(Some(v.as_str())))
            && self.dates.is_empty()
            && self.amounts.is_empty()
            && self.parties.is_empty()
            && self.additional_fields.values().all(|v| is_absent(v.as_deref()))
    }

    /// Number of populated entries across every field group.
    #[must_use]
    pub fn populated_count(&self) -> usize {
        self.fields.values().filter(|v| !is_absent(Some(v.as_str()))).count()
            + self.dates.len()
            + self.amounts.len()
            + self.parties.len()
            + self
                .additional_fields
                .values()
                .filter(|v| !is_absent(v.as_deref()))
                .count()
    }

    /// Copy values from `other` only where this set has nothing.
    ///
    /// Present values are never overwritten. Repeating fields are filled as a
    /// whole list when empty; parties with a matching name gain missing attributes.
    /// Returns the number of entries filled.
    pub fn fill_gaps(&mut self, other: &Self) -> usize {
        let mut filled = 0;

        for (name, value) in &other.fields {
            if !self.has(name) && !is_absent(Some(value)) {
                self.fields.insert(name.clone(), value.clone());
                filled += 1;
            }
        }

        if self.dates.is_empty() && !other.dates.is_empty() {
            self.dates.clone_from(&other.dates);
            filled += other.dates.len();
        }

        if self.amounts.is_empty() && !other.amounts.is_empty() {
            self.amounts.clone_from(&other.amounts);
            filled += other.amounts.len();
        }

        if self.parties.is_empty() {
            self.parties.clone_from(&other.parties);
            filled += other.parties.len();
        } else {
            for party in &mut self.parties {
                let key = party.name.trim().to_lowercase();
                if let Some(donor) = other
                    .parties
                    .iter()
                    .find(|p| p.name.trim().to_lowercase() == key)
                {
                    filled += party.fill_gaps(donor);
                }
            }
        }

        for (name, value) in &other.additional_fields {
            let present = self
                .additional_fields
                .get(name)
                .is_some_and(|v| !is_absent(v.as_deref()));
            if !present && !is_absent(value.as_deref()) {
                self.additional_fields.insert(name.clone(), value.clone());
                filled += 1;
            }
        }

        filled
    }
}

fn is_absent(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// A sanitized value proposed by one source, with its validation flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub value: String,
    pub source: SourceKind,
    pub source_reliability: f64,
    pub matches_pattern: bool,
    pub matches_catalog: bool,
}

/// How a fused field's value was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionDecision {
    ExactMatch,
    FuzzyMatch,
    WeightedVoting,
    Conflict,
    SingleSource,
    AllMissing,
}

impl FusionDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::FuzzyMatch => "fuzzy_match",
            Self::WeightedVoting => "weighted_voting",
            Self::Conflict => "conflict",
            Self::SingleSource => "single_source",
            Self::AllMissing => "all_missing",
        }
    }

    /// Sources disagreed and no agreement rule settled it.
    #[must_use]
    pub const fn is_disputed(&self) -> bool {
        matches!(self, Self::WeightedVoting | Self::Conflict)
    }
}

impl std::fmt::Display for FusionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFusionResult {
    pub field_name: String,
    pub value: Option<String>,
    pub decision: FusionDecision,
    pub confidence: f64,
    pub contributing_sources: Vec<SourceKind>,
}

impl FieldFusionResult {
    #[must_use]
    pub fn missing(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            value: None,
            decision: FusionDecision::AllMissing,
            confidence: 0.0,
            contributing_sources: Vec::new(),
        }
    }
}

/// The fused case record handed to downstream persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub data: ExtractedFieldSet,
    pub fusion_results: BTreeMap<String, FieldFusionResult>,
    pub conflicts: Vec<String>,
    pub overall_confidence: f64,
    pub requires_manual_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_from: Option<Uuid>,
}

impl CanonicalRecord {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name)
    }

    #[must_use]
    pub fn case_number(&self) -> Option<&str> {
        self.data.case_number()
    }

    #[must_use]
    pub fn office_number(&self) -> Option<&str> {
        self.data.office_number()
    }

    #[must_use]
    pub fn parties(&self) -> &[Party] {
        &self.data.parties
    }

    #[must_use]
    pub fn decision(&self, name: &str) -> Option<FusionDecision> {
        self.fusion_results.get(name).map(|r| r.decision)
    }

    #[must_use]
    pub fn holder_like_count(&self) -> usize {
        self.data
            .parties
            .iter()
            .filter(|p| p.role.is_holder_like())
            .count()
    }
}
