use uuid::Uuid;

use super::assess;
use crate::config::ReconcileConfig;
use crate::fields::{self, party_field};
use crate::record::{CanonicalRecord, PartyRole};

/// Most holder-like parties one submission may carry.
pub const MAX_HOLDERS_PER_RECORD: usize = 2;

const PARTY_ATTRIBUTES: [&str; 3] = [
    fields::PARTY_NAME,
    fields::PARTY_TAX_ID,
    fields::PARTY_ADDRESS,
];

/// Split a fused record whose holder count exceeds what one submission allows.
///
/// With at most one co-holder, each holder gets its own record and the co-holder
/// rides along in every one; otherwise every holder and co-holder is separated.
/// Non-party fields and `Other` parties are shared. The office number (or the case
/// number when there is none) gains a `-001`, `-002`, ... suffix in party order.
///
/// Each child carries the party fusion results of its own parties, renumbered to
/// its party list, and has its conflicts, review flag and confidence reassessed.
#[must_use]
pub fn split_record(
    record: CanonicalRecord,
    config: &ReconcileConfig,
    mandatory: &[String],
) -> Vec<CanonicalRecord> {
    let indices_of = |role: PartyRole| -> Vec<usize> {
        record
            .parties()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.role == role)
            .map(|(i, _)| i)
            .collect()
    };
    let holders = indices_of(PartyRole::Holder);
    let co_holders = indices_of(PartyRole::CoHolder);

    if holders.len() + co_holders.len() <= MAX_HOLDERS_PER_RECORD {
        return vec![record];
    }

    let shared = indices_of(PartyRole::Other);

    let groups: Vec<Vec<usize>> = if co_holders.len() <= 1 {
        holders
            .iter()
            .map(|holder| {
                let mut group = vec![*holder];
                group.extend(co_holders.iter().copied());
                group
            })
            .collect()
    } else {
        record
            .parties()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.role.is_holder_like())
            .map(|(i, _)| vec![i])
            .collect()
    };

    let suffix_field = [fields::OFFICE_NUMBER, fields::CASE_NUMBER]
        .into_iter()
        .find(|name| record.data.has(name));
    if suffix_field.is_none() {
        tracing::warn!(
            "Record {} has no office or case number to suffix; split records share identifiers",
            record.id
        );
    }

    let split: Vec<CanonicalRecord> = groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            let members: Vec<usize> = group.into_iter().chain(shared.iter().copied()).collect();
            let suffix = suffix_field
                .and_then(|name| record.get(name))
                .map(|base| format!("{base}-{:03}", i + 1));
            let mut child = child_of(&record, &members, suffix_field.zip(suffix));
            let shortfall = assess(&mut child, config, mandatory);
            tracing::debug!(
                "Split record {} takes parties {:?}: {} conflicts, {} weak mandatory fields",
                child.id,
                members,
                child.conflicts.len(),
                shortfall.len()
            );
            child
        })
        .collect();

    tracing::info!(
        "Split record {} into {} records ({} holders, {} co-holders)",
        record.id,
        split.len(),
        holders.len(),
        co_holders.len()
    );
    split
}

/// A copy of `parent` restricted to the parties at `members`, in that order.
fn child_of(
    parent: &CanonicalRecord,
    members: &[usize],
    suffixed: Option<(&str, String)>,
) -> CanonicalRecord {
    let mut child = parent.clone();
    child.id = Uuid::now_v7();
    child.split_from = Some(parent.id);
    child.data.parties = members
        .iter()
        .map(|&p| parent.parties()[p].clone())
        .collect();

    child
        .fusion_results
        .retain(|name, _| !name.starts_with("parties."));
    for (j, &p) in members.iter().enumerate() {
        for attribute in PARTY_ATTRIBUTES {
            if let Some(result) = parent.fusion_results.get(&party_field(p, attribute)) {
                let mut result = result.clone();
                result.field_name = party_field(j, attribute);
                child.fusion_results.insert(result.field_name.clone(), result);
            }
        }
    }

    if let Some((name, value)) = suffixed {
        if let Some(result) = child.fusion_results.get_mut(name) {
            result.value = Some(value.clone());
        }
        child.data.set(name, value);
    }
    child
}
