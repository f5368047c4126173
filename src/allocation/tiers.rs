use std::collections::BTreeMap;
use serde::Serialize;

use crate::config::{AllocatorConfig, TokenScope};
use super::types::{Party, Session, SessionId, Tier};

/// Sessions sharing one tier. Indices point into the session slice the
/// list was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierGroup {
    pub tier: Tier,
    pub sessions: Vec<usize>,
}

/// A party's preferences collapsed into tiers, best first.
/// Sessions rated "no-go" appear in no group and have no tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierList {
    pub groups: Vec<TierGroup>,
    by_session: Vec<Option<Tier>>,
}

impl TierList {
    pub fn tier_at(&self, session: usize) -> Option<Tier> {
        self.by_session.get(session).copied().flatten()
    }

    /// True when the party has no valid placement target at all
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn best(&self) -> Option<Tier> {
        self.groups.first().map(|g| g.tier)
    }

    pub fn accepted_sessions(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(|g| g.sessions.iter().copied())
    }
}

/// Builds the tier list for a party
pub fn tier_party(party: &Party, sessions: &[Session], config: &AllocatorConfig) -> TierList {
    build_tier_list(&party.preferences, party.golden_die, sessions, config)
}

/// Groups sessions by raw preference (missing = neutral), sorts the groups
/// descending and numbers them densely from zero. No-go ratings are dropped.
/// Overflow sessions ignore the preference map and always form the last tier.
pub fn build_tier_list(
    preferences: &BTreeMap<SessionId, u8>,
    holds_token: bool,
    sessions: &[Session],
    config: &AllocatorConfig,
) -> TierList {
    let scale = &config.preference_scale;
    let mut by_session = vec![None; sessions.len()];

    let mut rated: Vec<(u8, usize)> = sessions
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.overflow)
        .map(|(i, s)| (preferences.get(&s.id).copied().unwrap_or(scale.neutral), i))
        .filter(|(value, _)| *value > scale.no_go)
        .collect();
    // Stable, so sessions keep input order inside a group
    rated.sort_by(|a, b| b.0.cmp(&a.0));

    let mut groups: Vec<TierGroup> = Vec::new();
    let mut last_value: Option<u8> = None;
    for (value, session) in rated {
        if last_value != Some(value) {
            let rank = groups.len() as u32;
            let golden = holds_token && (rank == 0 || config.token_scope == TokenScope::AllTiers);
            groups.push(TierGroup { tier: Tier { golden, rank }, sessions: Vec::new() });
            last_value = Some(value);
        }
        if let Some(group) = groups.last_mut() {
            group.sessions.push(session);
        }
    }

    let overflow: Vec<usize> = sessions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.overflow)
        .map(|(i, _)| i)
        .collect();
    if !overflow.is_empty() {
        let rank = groups.len() as u32;
        groups.push(TierGroup { tier: Tier::plain(rank), sessions: overflow });
    }

    for group in &groups {
        for &session in &group.sessions {
            by_session[session] = Some(group.tier);
        }
    }

    TierList { groups, by_session }
}
