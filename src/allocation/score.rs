use std::collections::BTreeMap;

use crate::config::{AllocatorConfig, ScoringMode};
use super::compensation::compute_delta;
use super::types::{Allocation, Loss, Party, Session};

/// Loss of a finished allocation. Lower is better.
pub fn evaluate(
    mode: ScoringMode,
    sessions: &[Session],
    parties: &[Party],
    allocation: &Allocation,
    config: &AllocatorConfig,
) -> Loss {
    let by_id: BTreeMap<&str, &Party> = parties.iter().map(|p| (p.id.as_str(), p)).collect();

    let value = match mode {
        ScoringMode::TierSum => allocation
            .assignments
            .iter()
            .filter_map(|a| Some((by_id.get(a.party_id.as_str())?, a.tier?)))
            .map(|(party, tier)| party.size as i64 * tier.rank as i64)
            .sum(),
        ScoringMode::CompensationWeighted => allocation
            .assignments
            .iter()
            .filter_map(|a| Some((by_id.get(a.party_id.as_str())?, a.tier?)))
            .map(|(party, tier)| tier.rank as i64 * (party.size as i64 + party.compensation.max(0)))
            .sum(),
        ScoringMode::LedgerTotal => compute_delta(
            allocation,
            sessions,
            parties,
            config.cancelled_session_penalty,
            |p| p.compensation,
            |gm| gm.compensation,
        )
        .total(),
    };

    Loss { value, cancelled_sessions: allocation.cancelled_sessions.len() }
}
