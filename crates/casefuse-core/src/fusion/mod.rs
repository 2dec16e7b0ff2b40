//! Cross-source fusion of extracted field sets into canonical records.

mod merge;
mod resolve;
mod split;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ReconcileConfig;
use crate::fields::{self, catalog_for, kind_of, party_field, FieldKind};
use crate::record::{
    CanonicalRecord, ExtractedFieldSet, FieldCandidate, FieldFusionResult, FusionDecision,
    MonetaryAmount, Party, PartyRole,
};
use crate::sanitize::{detect_currency, sanitize_amount, sanitize_for};
use crate::source::SourceKind;
use crate::validate::{matches_kind, CatalogValidator};

pub use merge::merge_intra_source;
pub use resolve::{candidate_score, fuzzy_threshold, resolve_field, similarity};
pub use split::{split_record, MAX_HOLDERS_PER_RECORD};

/// One source's unsanitized proposal for a field; `None` when the source has nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub source: SourceKind,
    pub value: Option<String>,
}

impl RawCandidate {
    #[must_use]
    pub fn new(source: SourceKind, value: Option<&str>) -> Self {
        Self {
            source,
            value: value.map(str::to_string),
        }
    }
}

/// The extraction result of one source, ready for cross-source fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFieldSet {
    pub source: SourceKind,
    pub fields: ExtractedFieldSet,
}

impl SourceFieldSet {
    #[must_use]
    pub fn new(source: SourceKind, fields: ExtractedFieldSet) -> Self {
        Self { source, fields }
    }
}

/// Fuses per-source field sets into canonical records.
#[derive(Clone)]
pub struct FusionEngine {
    config: Arc<ReconcileConfig>,
    catalog: Option<CatalogValidator>,
}

impl FusionEngine {
    #[must_use]
    pub fn new(config: Arc<ReconcileConfig>) -> Self {
        Self {
            config,
            catalog: None,
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: CatalogValidator) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Fuse an explicit candidate map; every key is treated as a scalar field.
    pub async fn fuse(
        &self,
        candidates_per_field: &BTreeMap<String, Vec<RawCandidate>>,
        mandatory: &[String],
    ) -> CanonicalRecord {
        let mut data = ExtractedFieldSet::new();
        let mut results = BTreeMap::new();

        for (name, raw) in candidates_per_field {
            let result = self.fuse_field(name, kind_of(name), raw).await;
            if fields::SCALAR_FIELDS.contains(&name.as_str()) {
                if let Some(value) = &result.value {
                    data.set(name, value.clone());
                }
            } else {
                data.additional_fields.insert(name.clone(), result.value.clone());
            }
            results.insert(name.clone(), result);
        }

        self.finish(data, results, mandatory)
    }

    /// Fuse every source into one record, then split it if it carries too many holders.
    pub async fn fuse_sources(
        &self,
        sources: &[SourceFieldSet],
        mandatory: &[String],
    ) -> Vec<CanonicalRecord> {
        let record = self.fuse_record(sources, mandatory).await;
        split_record(record, &self.config, mandatory)
    }

    pub async fn fuse_record(
        &self,
        sources: &[SourceFieldSet],
        mandatory: &[String],
    ) -> CanonicalRecord {
        let mut data = ExtractedFieldSet::new();
        let mut results = BTreeMap::new();

        let scalar_names: BTreeSet<&String> =
            sources.iter().flat_map(|s| s.fields.fields.keys()).collect();
        for name in scalar_names {
            let raw: Vec<RawCandidate> = sources
                .iter()
                .map(|s| RawCandidate::new(s.source, s.fields.get(name)))
                .collect();
            let result = self.fuse_field(name, kind_of(name), &raw).await;
            if let Some(value) = &result.value {
                data.set(name, value.clone());
            }
            results.insert(name.clone(), result);
        }

        let additional_names: BTreeSet<&String> = sources
            .iter()
            .flat_map(|s| s.fields.additional_fields.keys())
            .collect();
        for name in additional_names {
            let raw: Vec<RawCandidate> = sources
                .iter()
                .map(|s| RawCandidate {
                    source: s.source,
                    value: s.fields.additional_fields.get(name).cloned().flatten(),
                })
                .collect();
            let result = self.fuse_field(name, kind_of(name), &raw).await;
            data.additional_fields.insert(name.clone(), result.value.clone());
            results.insert(name.clone(), result);
        }

        if let Some(result) = self.fuse_dates(sources, &mut data) {
            results.insert(fields::DATES.to_string(), result);
        }
        if let Some(result) = self.fuse_amounts(sources, &mut data) {
            results.insert(fields::AMOUNTS.to_string(), result);
        }
        for result in self.fuse_parties(sources, &mut data).await {
            results.insert(result.field_name.clone(), result);
        }

        self.finish(data, results, mandatory)
    }

    /// Sanitize, validate, and resolve one field's candidates.
    pub async fn fuse_field(
        &self,
        name: &str,
        kind: FieldKind,
        raw: &[RawCandidate],
    ) -> FieldFusionResult {
        let mut candidates = Vec::with_capacity(raw.len());
        for proposal in raw {
            let Some(value) = sanitize_for(kind, proposal.value.as_deref()) else {
                continue;
            };
            let matches_pattern = matches_kind(kind, Some(value.as_str()));
            let matches_catalog = match (&self.catalog, catalog_for(name)) {
                (Some(catalog), Some(category)) => catalog.is_in_catalog(category, &value).await,
                _ => false,
            };
            candidates.push(FieldCandidate {
                value,
                source: proposal.source,
                source_reliability: self.config.reliability.get(proposal.source),
                matches_pattern,
                matches_catalog,
            });
        }

        resolve_field(name, kind, &candidates, &self.config)
    }

    /// Dates fuse as one list per source; the winning source's list is kept whole.
    fn fuse_dates(
        &self,
        sources: &[SourceFieldSet],
        data: &mut ExtractedFieldSet,
    ) -> Option<FieldFusionResult> {
        let per_source: Vec<(SourceKind, Vec<String>)> = sources
            .iter()
            .map(|s| {
                let mut dates: Vec<String> = Vec::new();
                for date in s
                    .fields
                    .dates
                    .iter()
                    .filter_map(|d| sanitize_for(FieldKind::Date, Some(d.as_str())))
                {
                    if !dates.contains(&date) {
                        dates.push(date);
                    }
                }
                (s.source, dates)
            })
            .collect();

        let winner = self.resolve_list(fields::DATES, FieldKind::Date, &per_source, |dates| {
            dates.iter().all(|d| matches_kind(FieldKind::Date, Some(d.as_str())))
        })?;
        data.dates = winner.0;
        Some(winner.1)
    }

    /// Amounts compare on their sanitized value. A source that gives no currency
    /// takes the one the other sources agree on for that value.
    fn fuse_amounts(
        &self,
        sources: &[SourceFieldSet],
        data: &mut ExtractedFieldSet,
    ) -> Option<FieldFusionResult> {
        let mut per_source: Vec<(SourceKind, Vec<MonetaryAmount>)> = sources
            .iter()
            .map(|s| {
                let amounts: Vec<MonetaryAmount> = s
                    .fields
                    .amounts
                    .iter()
                    .filter_map(|raw| {
                        let value = sanitize_amount(Some(raw.value.as_str()))?;
                        let currency = raw
                            .currency
                            .clone()
                            .or_else(|| detect_currency(&raw.value).map(str::to_string));
                        Some(MonetaryAmount { value, currency })
                    })
                    .collect();
                (s.source, amounts)
            })
            .collect();

        let mut currencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for amount in per_source.iter().flat_map(|(_, amounts)| amounts) {
            if let Some(currency) = &amount.currency {
                currencies
                    .entry(amount.value.clone())
                    .or_default()
                    .insert(currency.clone());
            }
        }
        for (_, amounts) in &mut per_source {
            for amount in amounts.iter_mut().filter(|a| a.currency.is_none()) {
                if let Some(known) = currencies.get(&amount.value).filter(|c| c.len() == 1) {
                    amount.currency = known.first().cloned();
                }
            }
            let mut unique: Vec<MonetaryAmount> = Vec::with_capacity(amounts.len());
            for amount in amounts.drain(..) {
                if !unique.contains(&amount) {
                    unique.push(amount);
                }
            }
            *amounts = unique;
        }

        let winner =
            self.resolve_list(fields::AMOUNTS, FieldKind::Amount, &per_source, |_| true)?;
        data.amounts = winner.0;
        Some(winner.1)
    }

    /// Run a whole-list comparison through the scalar decision procedure.
    fn resolve_list<T: Clone + ListKey>(
        &self,
        name: &str,
        kind: FieldKind,
        per_source: &[(SourceKind, Vec<T>)],
        well_formed: impl Fn(&[T]) -> bool,
    ) -> Option<(Vec<T>, FieldFusionResult)> {
        let candidates: Vec<FieldCandidate> = per_source
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(source, items)| FieldCandidate {
                value: list_key(items),
                source: *source,
                source_reliability: self.config.reliability.get(*source),
                matches_pattern: well_formed(items),
                matches_catalog: false,
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let result = resolve_field(name, kind, &candidates, &self.config);
        let items = result
            .value
            .as_ref()
            .and_then(|key| {
                per_source
                    .iter()
                    .find(|(_, items)| !items.is_empty() && list_key(items) == *key)
            })
            .map(|(_, items)| items.clone())
            .unwrap_or_default();
        Some((items, result))
    }

    /// Group parties across sources by name, most reliable source first, then fuse
    /// each attribute as `parties.N.<attr>`.
    ///
    /// A party whose name matches no group joins the group of the same role at the
    /// same position, so a misspelled name is voted on instead of becoming a second
    /// party.
    async fn fuse_parties(
        &self,
        sources: &[SourceFieldSet],
        data: &mut ExtractedFieldSet,
    ) -> Vec<FieldFusionResult> {
        let mut ordered: Vec<&SourceFieldSet> = sources.iter().collect();
        ordered.sort_by(|a, b| {
            self.config
                .reliability
                .get(b.source)
                .total_cmp(&self.config.reliability.get(a.source))
                .then(a.source.cmp(&b.source))
        });

        let mut clusters: Vec<PartyCluster<'_>> = Vec::new();
        for source in ordered {
            let mut named: Vec<(usize, &Party, String)> = Vec::new();
            for party in &source.fields.parties {
                let Some(name) = sanitize_for(FieldKind::PersonName, Some(party.name.as_str()))
                else {
                    continue;
                };
                let position = named.iter().filter(|(_, p, _)| p.role == party.role).count();
                named.push((position, party, name));
            }

            let mut unmatched = Vec::new();
            for (position, party, name) in named {
                let slot = clusters
                    .iter()
                    .enumerate()
                    .filter(|(_, cluster)| cluster.lacks(source.source))
                    .map(|(i, cluster)| (i, similarity(cluster.lead_name(), &name)))
                    .filter(|(_, score)| *score >= self.config.name_threshold)
                    .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
                    .map(|(i, _)| i);
                match slot {
                    Some(i) => clusters[i].members.push((source.source, party, name)),
                    None => unmatched.push((position, party, name)),
                }
            }

            // Same role at the same position is taken as the same party spelled differently.
            for (position, party, name) in unmatched {
                let slot = clusters.iter().position(|cluster| {
                    cluster.role == party.role
                        && cluster.position == position
                        && cluster.lacks(source.source)
                });
                match slot {
                    Some(i) => {
                        tracing::warn!(
                            "Party \"{}\" from {} matched \"{}\" by position only",
                            name,
                            source.source,
                            clusters[i].lead_name()
                        );
                        clusters[i].members.push((source.source, party, name));
                    }
                    None => clusters.push(PartyCluster {
                        role: party.role,
                        position,
                        members: vec![(source.source, party, name)],
                    }),
                }
            }
        }

        let mut results = Vec::new();
        for (index, cluster) in clusters.iter().enumerate() {
            let members = &cluster.members;
            let name_field = party_field(index, fields::PARTY_NAME);
            let names = party_candidates(members, |p| Some(p.name.as_str()));
            let name = self
                .fuse_field(&name_field, FieldKind::PersonName, &names)
                .await;
            let tax_field = party_field(index, fields::PARTY_TAX_ID);
            let tax_ids = party_candidates(members, |p| p.tax_id.as_deref());
            let tax_id = self
                .fuse_field(&tax_field, FieldKind::Identifier, &tax_ids)
                .await;
            let address_field = party_field(index, fields::PARTY_ADDRESS);
            let addresses = party_candidates(members, |p| p.address.as_deref());
            let address = self
                .fuse_field(&address_field, FieldKind::Address, &addresses)
                .await;

            let mut party = Party::new(
                name.value.clone().unwrap_or_else(|| cluster.lead_name().to_string()),
                cluster.role,
            );
            party.tax_id.clone_from(&tax_id.value);
            party.address.clone_from(&address.value);
            data.parties.push(party);

            results.push(name);
            if tax_id.decision != FusionDecision::AllMissing {
                results.push(tax_id);
            }
            if address.decision != FusionDecision::AllMissing {
                results.push(address);
            }
        }
        results
    }

    fn finish(
        &self,
        data: ExtractedFieldSet,
        fusion_results: BTreeMap<String, FieldFusionResult>,
        mandatory: &[String],
    ) -> CanonicalRecord {
        let mut record = CanonicalRecord {
            id: Uuid::now_v7(),
            data,
            fusion_results,
            conflicts: Vec::new(),
            overall_confidence: 0.0,
            requires_manual_review: false,
            split_from: None,
        };
        let mandatory_shortfall = assess(&mut record, &self.config, mandatory);

        tracing::info!(
            "Fused record {}: {} fields, {} conflicts, confidence {:.3}{}",
            record.id,
            record.fusion_results.len(),
            record.conflicts.len(),
            record.overall_confidence,
            if record.requires_manual_review {
                ", needs review"
            } else {
                ""
            }
        );
        if !mandatory_shortfall.is_empty() {
            tracing::info!(
                "Record {} mandatory fields missing or weak: {}",
                record.id,
                mandatory_shortfall.join(", ")
            );
        }
        record
    }
}

/// Recompute a record's conflicts, review flag and overall confidence from its
/// fusion results, filling in absent mandatory fields as missing.
///
/// Returns the mandatory fields that are missing or below the confidence floor.
fn assess(
    record: &mut CanonicalRecord,
    config: &ReconcileConfig,
    mandatory: &[String],
) -> Vec<String> {
    for name in mandatory {
        record
            .fusion_results
            .entry(name.clone())
            .or_insert_with(|| FieldFusionResult::missing(name));
    }

    record.conflicts = record
        .fusion_results
        .values()
        .filter(|r| r.decision.is_disputed())
        .map(|r| r.field_name.clone())
        .collect();

    let mandatory_shortfall: Vec<String> = mandatory
        .iter()
        .filter(|name| {
            record.fusion_results.get(*name).is_none_or(|r| {
                r.value.is_none() || r.confidence < config.min_mandatory_confidence
            })
        })
        .cloned()
        .collect();

    record.requires_manual_review = !record.conflicts.is_empty() || !mandatory_shortfall.is_empty();
    record.overall_confidence = overall_confidence(&record.fusion_results, config, mandatory);
    mandatory_shortfall
}

/// Criticality-weighted mean of the per-field confidences.
fn overall_confidence(
    results: &BTreeMap<String, FieldFusionResult>,
    config: &ReconcileConfig,
    mandatory: &[String],
) -> f64 {
    let (weighted, total) = results.values().fold((0.0, 0.0), |(sum, weight), r| {
        let w = if mandatory.contains(&r.field_name) {
            config.mandatory_weight
        } else {
            config.optional_weight
        };
        (sum + w * r.confidence, weight + w)
    });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(Arc::new(ReconcileConfig::default()))
    }
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("config", &self.config)
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

/// Parties from different sources taken to be the same person.
struct PartyCluster<'a> {
    role: PartyRole,
    /// Index among same-role parties in the source that opened the cluster.
    position: usize,
    members: Vec<(SourceKind, &'a Party, String)>,
}

impl PartyCluster<'_> {
    fn lead_name(&self) -> &str {
        &self.members[0].2
    }

    fn lacks(&self, source: SourceKind) -> bool {
        self.members.iter().all(|(s, _, _)| *s != source)
    }
}

fn party_candidates(
    members: &[(SourceKind, &Party, String)],
    get: impl Fn(&Party) -> Option<&str>,
) -> Vec<RawCandidate> {
    members
        .iter()
        .map(|(source, party, _)| RawCandidate::new(*source, get(party)))
        .collect()
}

/// Canonical text form of a repeating field, used to compare lists across sources.
trait ListKey {
    fn key(&self) -> String;
}

impl ListKey for String {
    fn key(&self) -> String {
        self.clone()
    }
}

impl ListKey for MonetaryAmount {
    fn key(&self) -> String {
        match &self.currency {
            Some(currency) => format!("{} {currency}", self.value),
            None => self.value.clone(),
        }
    }
}

fn list_key<T: ListKey>(items: &[T]) -> String {
    items.iter().map(ListKey::key).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{CatalogCache, CatalogCategory, InMemoryCatalog};

    fn mandatory() -> Vec<String> {
        ReconcileConfig::default().default_mandatory
    }

    fn engine() -> FusionEngine {
        FusionEngine::default()
    }

    fn full_set(case: &str) -> ExtractedFieldSet {
        ExtractedFieldSet::new()
            .with_field(fields::CASE_NUMBER, case)
            .with_field(fields::OFFICE_NUMBER, "UIF/110/2025")
            .with_field(fields::AUTHORITY, "Unidad de Inteligencia Financiera")
            .with_field(fields::REQUESTED_ACTION, "Aseguramiento")
    }

    #[tokio::test]
    async fn test_end_to_end_agreement() {
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, full_set("A/B1-22-2025-X")),
            SourceFieldSet::new(SourceKind::OpticalScan, full_set("A/B1-22-2025-X ")),
            SourceFieldSet::new(SourceKind::WordProcessor, full_set("a/b1-22-2025-x")),
        ];

        let records = engine().fuse_sources(&sources, &mandatory()).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(record.decision(fields::CASE_NUMBER), Some(FusionDecision::ExactMatch));
        assert!(record.fusion_results[fields::CASE_NUMBER].confidence >= 0.9);
        assert!(record.conflicts.is_empty());
        assert!(!record.requires_manual_review);
        assert!(record.overall_confidence > 0.9);
    }

    #[tokio::test]
    async fn test_missing_mandatory_field_forces_review() {
        let set = ExtractedFieldSet::new().with_field(fields::CASE_NUMBER, "A/B1-22-2025-X");
        let sources = vec![SourceFieldSet::new(SourceKind::StructuredMarkup, set)];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert!(record.requires_manual_review);
        assert_eq!(record.decision(fields::AUTHORITY), Some(FusionDecision::AllMissing));
    }

    #[tokio::test]
    async fn test_annotations_count_as_missing() {
        let markup = full_set("A/B1-22-2025-X").with_field(fields::CAUSE, "NO SE CUENTA");
        let scan = ExtractedFieldSet::new().with_field(fields::CAUSE, "             ");
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.decision(fields::CAUSE), Some(FusionDecision::AllMissing));
        assert_eq!(record.get(fields::CAUSE), None);
    }

    #[tokio::test]
    async fn test_disagreement_is_reported() {
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, full_set("A/B1-22-2025-X")),
            SourceFieldSet::new(SourceKind::OpticalScan, full_set("A/B7-22-2025-X")),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(record.conflicts, vec![fields::CASE_NUMBER.to_string()]);
        assert!(record.requires_manual_review);
    }

    #[tokio::test]
    async fn test_repeating_fields_fuse_as_lists() {
        let markup = full_set("A/B1-22-2025-X")
            .with_date("15/03/2025")
            .with_amount(MonetaryAmount::from_raw("$236,569.68"));
        let scan = full_set("A/B1-22-2025-X")
            .with_date("15 de marzo de 2025")
            .with_amount(MonetaryAmount::from_raw("236,569.68 MXN"));
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.data.dates, vec!["20250315"]);
        assert_eq!(record.decision(fields::DATES), Some(FusionDecision::ExactMatch));
        assert_eq!(
            record.data.amounts,
            vec![MonetaryAmount::new("236570").with_currency("MXN")]
        );
        assert_eq!(record.decision(fields::AMOUNTS), Some(FusionDecision::ExactMatch));
    }

    #[tokio::test]
    async fn test_amount_without_currency_takes_the_agreed_one() {
        let markup =
            full_set("A/B1-22-2025-X").with_amount(MonetaryAmount::from_raw("$236,569.68"));
        let scan = full_set("A/B1-22-2025-X").with_amount(MonetaryAmount::from_raw("236,569.68"));
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.decision(fields::AMOUNTS), Some(FusionDecision::ExactMatch));
        assert_eq!(
            record.data.amounts,
            vec![MonetaryAmount::new("236570").with_currency("MXN")]
        );
        assert!(record.conflicts.is_empty());
        assert!(!record.requires_manual_review);
    }

    #[tokio::test]
    async fn test_amounts_in_different_currencies_disagree() {
        let markup = full_set("A/B1-22-2025-X").with_amount(MonetaryAmount::from_raw("US$500.00"));
        let scan = full_set("A/B1-22-2025-X").with_amount(MonetaryAmount::from_raw("500.00 MXN"));
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.decision(fields::AMOUNTS), Some(FusionDecision::WeightedVoting));
        assert_eq!(
            record.data.amounts,
            vec![MonetaryAmount::new("500").with_currency("USD")]
        );
        assert_eq!(record.conflicts, vec![fields::AMOUNTS.to_string()]);
    }

    #[tokio::test]
    async fn test_parties_cluster_by_name() {
        let markup = full_set("A/B1-22-2025-X")
            .with_party(Party::new("Juan Perez Lopez", PartyRole::Holder))
            .with_party(Party::new("Maria Lopez", PartyRole::CoHolder));
        let scan = full_set("A/B1-22-2025-X")
            .with_party(
                Party::new("Maria Lopez", PartyRole::CoHolder).with_tax_id("LOMM900202CD2"),
            )
            .with_party(
                Party::new("JUAN PERES LOPEZ", PartyRole::Holder).with_tax_id("PEPJ800101AB1"),
            );
        let sources = vec![
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.parties().len(), 2);
        assert_eq!(record.parties()[0].name, "Juan Perez Lopez");
        assert_eq!(record.parties()[0].tax_id.as_deref(), Some("PEPJ800101AB1"));
        assert_eq!(record.parties()[1].role, PartyRole::CoHolder);
        assert_eq!(record.decision("parties.0.name"), Some(FusionDecision::FuzzyMatch));
        assert_eq!(record.decision("parties.1.name"), Some(FusionDecision::ExactMatch));
        assert_eq!(record.decision("parties.0.tax_id"), Some(FusionDecision::SingleSource));
    }

    #[tokio::test]
    async fn test_misspelled_holder_is_voted_on_not_duplicated() {
        let markup = full_set("A/B1-22-2025-X")
            .with_party(Party::new("Ana Ruiz", PartyRole::Holder))
            .with_party(Party::new("Luis Gil Mora", PartyRole::CoHolder));
        let scan = full_set("A/B1-22-2025-X")
            .with_party(Party::new("Ana Ruis", PartyRole::Holder))
            .with_party(Party::new("Luis Gil Mora", PartyRole::CoHolder));
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let records = engine().fuse_sources(&sources, &mandatory()).await;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.parties().len(), 2);
        assert_eq!(record.parties()[0].name, "Ana Ruiz");
        assert_eq!(record.office_number(), Some("UIF/110/2025"));
        assert_eq!(record.decision("parties.0.name"), Some(FusionDecision::WeightedVoting));
        assert_eq!(record.decision("parties.1.name"), Some(FusionDecision::ExactMatch));
        assert_eq!(record.conflicts, vec!["parties.0.name".to_string()]);
        assert!(record.requires_manual_review);
    }

    #[tokio::test]
    async fn test_positional_match_respects_role() {
        let markup =
            full_set("A/B1-22-2025-X").with_party(Party::new("Ana Ruiz", PartyRole::Holder));
        let scan = full_set("A/B1-22-2025-X")
            .with_party(Party::new("Banco del Centro", PartyRole::Other));
        let sources = vec![
            SourceFieldSet::new(SourceKind::StructuredMarkup, markup),
            SourceFieldSet::new(SourceKind::OpticalScan, scan),
        ];

        let record = engine().fuse_record(&sources, &mandatory()).await;

        assert_eq!(record.parties().len(), 2);
        assert_eq!(record.decision("parties.0.name"), Some(FusionDecision::SingleSource));
        assert_eq!(record.decision("parties.1.name"), Some(FusionDecision::SingleSource));
    }

    #[tokio::test]
    async fn test_oversized_party_list_splits() {
        let set = full_set("A/B1-22-2025-X")
            .with_party(Party::new("Juan Perez", PartyRole::Holder))
            .with_party(Party::new("Pedro Ramirez", PartyRole::Holder))
            .with_party(Party::new("Ana Torres", PartyRole::Holder))
            .with_party(Party::new("Maria Lopez", PartyRole::CoHolder));
        let sources = vec![SourceFieldSet::new(SourceKind::StructuredMarkup, set)];

        let records = engine().fuse_sources(&sources, &mandatory()).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].office_number(), Some("UIF/110/2025-002"));
    }

    #[tokio::test]
    async fn test_catalog_membership_boosts_confidence() {
        let catalog = InMemoryCatalog::new().with_entries(
            CatalogCategory::Authority,
            ["Unidad de Inteligencia Financiera"],
        );
        let validator =
            CatalogValidator::new(Arc::new(catalog), Arc::new(CatalogCache::default()));
        let with_catalog = engine().with_catalog(validator);

        let raw = vec![RawCandidate::new(
            SourceKind::OpticalScan,
            Some("UNIDAD DE INTELIGENCIA FINANCIERA"),
        )];
        let boosted = with_catalog
            .fuse_field(fields::AUTHORITY, FieldKind::FreeText, &raw)
            .await;
        let plain = engine()
            .fuse_field(fields::AUTHORITY, FieldKind::FreeText, &raw)
            .await;

        assert!(boosted.confidence > plain.confidence);
    }

    #[tokio::test]
    async fn test_fuse_raw_candidate_map() {
        let mut map = BTreeMap::new();
        map.insert(
            fields::ACCOUNT_NUMBER.to_string(),
            vec![
                RawCandidate::new(SourceKind::StructuredMarkup, Some("0121 8000 1234 5678 91")),
                RawCandidate::new(SourceKind::WordProcessor, Some("012180001234567891")),
                RawCandidate::new(SourceKind::OpticalScan, None),
            ],
        );
        map.insert(
            "branch".to_string(),
            vec![RawCandidate::new(SourceKind::OpticalScan, Some("Centro"))],
        );

        let record = engine().fuse(&map, &[fields::ACCOUNT_NUMBER.to_string()]).await;

        assert_eq!(record.get(fields::ACCOUNT_NUMBER), Some("012180001234567891"));
        assert_eq!(
            record.decision(fields::ACCOUNT_NUMBER),
            Some(FusionDecision::ExactMatch)
        );
        assert_eq!(
            record.data.additional_fields.get("branch"),
            Some(&Some("Centro".to_string()))
        );
        assert!(!record.requires_manual_review);
    }

    #[tokio::test]
    async fn test_trailing_space_and_absent_source_still_match() {
        let mut map = BTreeMap::new();
        map.insert(
            fields::CASE_NUMBER.to_string(),
            vec![
                RawCandidate::new(SourceKind::StructuredMarkup, Some("A/B1-22-2025-X")),
                RawCandidate::new(SourceKind::OpticalScan, Some("A/B1-22-2025-X ")),
                RawCandidate::new(SourceKind::WordProcessor, None),
            ],
        );

        let record = engine().fuse(&map, &[fields::CASE_NUMBER.to_string()]).await;

        let result = &record.fusion_results[fields::CASE_NUMBER];
        assert_eq!(record.case_number(), Some("A/B1-22-2025-X"));
        assert_eq!(result.decision, FusionDecision::ExactMatch);
        assert_eq!(
            result.contributing_sources,
            vec![SourceKind::StructuredMarkup, SourceKind::OpticalScan]
        );
        let config = ReconcileConfig::default();
        for source in [SourceKind::StructuredMarkup, SourceKind::OpticalScan] {
            assert!(result.confidence >= config.reliability.get(source));
        }
        assert!(!record.requires_manual_review);
    }

    #[tokio::test]
    async fn test_no_sources() {
        let record = engine().fuse_record(&[], &mandatory()).await;
        assert!(record.requires_manual_review);
        assert!(record.overall_confidence.abs() < f64::EPSILON);
        assert_eq!(record.fusion_results.len(), 4);
    }
}
