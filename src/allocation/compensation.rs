use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{Allocation, Gamemaster, GamemasterId, Party, PartyId, Session};

/// Rank charged to a party that ended up without a seat
pub const UNASSIGNED_RANK: u32 = 5;

/// Flat charge to a GM whose session did not run
pub const CANCELLED_SESSION_PENALTY: i64 = 10;

/// Compensation balances carried between time slots.
///
/// Positive values are debt owed to the player or GM. An id missing from the
/// ledger falls back to the balance on the input record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationLedger {
    #[serde(default)]
    pub players: BTreeMap<PartyId, i64>,
    #[serde(default)]
    pub gamemasters: BTreeMap<GamemasterId, i64>,
}

/// Change in balance produced by one allocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationDelta {
    pub players: BTreeMap<PartyId, i64>,
    /// Everything added to GM balances, including the virtual part
    pub gamemasters: BTreeMap<GamemasterId, i64>,
    /// Share of `gamemasters` earned for running a session off its optimum
    pub virtual_penalties: BTreeMap<GamemasterId, i64>,
}

impl CompensationDelta {
    pub fn total(&self) -> i64 {
        self.players.values().sum::<i64>() + self.gamemasters.values().sum::<i64>()
    }

    /// Total without the virtual GM penalties
    pub fn real_total(&self) -> i64 {
        self.total() - self.virtual_penalties.values().sum::<i64>()
    }
}

/// Compute the balance changes an allocation produces.
///
/// Players seated in their top tier have their balance reset. Everyone else
/// accrues `size * rank`, with unseated players charged at `UNASSIGNED_RANK`.
/// A GM whose session ended at exactly optimal occupancy is reset, even when
/// that optimum is zero. One whose session did not run gets `penalty`,
/// doubled if already in debt. Any other occupancy accrues the distance from
/// optimal as a virtual penalty.
pub fn compute_delta<P, G>(
    allocation: &Allocation,
    sessions: &[Session],
    parties: &[Party],
    penalty: i64,
    party_balance: P,
    gamemaster_balance: G,
) -> CompensationDelta
where
    P: Fn(&Party) -> i64,
    G: Fn(&Gamemaster) -> i64,
{
    let mut delta = CompensationDelta::default();
    let by_id: BTreeMap<&str, &Party> = parties.iter().map(|p| (p.id.as_str(), p)).collect();

    for assignment in &allocation.assignments {
        let Some(party) = by_id.get(assignment.party_id.as_str()) else { continue };
        let change = match assignment.tier {
            Some(tier) if tier.rank == 0 => -party_balance(*party),
            Some(tier) => party.size as i64 * tier.rank as i64,
            None => party.size as i64 * UNASSIGNED_RANK as i64,
        };
        delta.players.insert(party.id.clone(), change);
    }

    let counts = allocation.player_counts(sessions, parties);
    for session in sessions {
        let Some(gm) = &session.gamemaster else { continue };
        let players = counts.get(&session.id).copied().unwrap_or(0);
        let balance = gamemaster_balance(gm);
        let cancelled = allocation.cancelled_sessions.contains(&session.id);

        let change = if players == session.opt_players && !cancelled {
            -balance
        } else if players == 0 || cancelled {
            if balance > 0 { penalty * 2 } else { penalty }
        } else {
            let distance = (players as i64 - session.opt_players as i64).abs();
            delta.virtual_penalties.insert(gm.id.clone(), distance);
            distance
        };
        delta.gamemasters.insert(gm.id.clone(), change);
    }

    delta
}

impl CompensationLedger {
    pub fn party_balance(&self, party: &Party) -> i64 {
        self.players.get(&party.id).copied().unwrap_or(party.compensation)
    }

    pub fn gamemaster_balance(&self, gm: &Gamemaster) -> i64 {
        self.gamemasters.get(&gm.id).copied().unwrap_or(gm.compensation)
    }

    /// Record an allocation's outcome, using the default cancellation penalty
    pub fn update(&mut self, allocation: &Allocation, sessions: &[Session], parties: &[Party]) -> CompensationDelta {
        self.update_with_penalty(allocation, sessions, parties, CANCELLED_SESSION_PENALTY)
    }

    pub fn update_with_penalty(
        &mut self,
        allocation: &Allocation,
        sessions: &[Session],
        parties: &[Party],
        penalty: i64,
    ) -> CompensationDelta {
        let delta = compute_delta(
            allocation,
            sessions,
            parties,
            penalty,
            |p| self.party_balance(p),
            |gm| self.gamemaster_balance(gm),
        );

        for party in parties {
            if let Some(change) = delta.players.get(&party.id) {
                let balance = self.party_balance(party) + change;
                self.players.insert(party.id.clone(), balance);
            }
        }
        for gm in sessions.iter().filter_map(|s| s.gamemaster.as_ref()) {
            if let Some(change) = delta.gamemasters.get(&gm.id) {
                let balance = self.gamemaster_balance(gm) + change;
                self.gamemasters.insert(gm.id.clone(), balance);
            }
        }

        delta
    }

    /// Copy ledger balances onto the next slot's input records
    pub fn apply_to(&self, sessions: &mut [Session], parties: &mut [Party]) {
        for party in parties.iter_mut() {
            party.compensation = self.party_balance(party);
        }
        for gm in sessions.iter_mut().filter_map(|s| s.gamemaster.as_mut()) {
            gm.compensation = self.gamemaster_balance(gm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::types::{Assignment, Loss, Tier};

    fn allocation(rows: Vec<(&str, Option<(&str, Tier)>)>, cancelled: Vec<&str>) -> Allocation {
        Allocation {
            trial: 0,
            seed: 0,
            loss: Loss::default(),
            assignments: rows
                .into_iter()
                .map(|(p, seat)| Assignment {
                    party_id: p.to_string(),
                    session_id: seat.map(|(s, _)| s.to_string()),
                    tier: seat.map(|(_, t)| t),
                })
                .collect(),
            gamemasters: vec![],
            cancelled_sessions: cancelled.into_iter().map(String::from).collect(),
            displacements: vec![],
            tokens_spent: vec![],
        }
    }

    #[test]
    fn debt_accrues_then_resets_at_top_tier() {
        let sessions = vec![Session::new("a", 1, 3, 6)];
        let mut parties = vec![Party::new("p1", 3)];
        let mut ledger = CompensationLedger::default();

        let first = allocation(vec![("p1", Some(("a", Tier::plain(2))))], vec![]);
        let delta = ledger.update(&first, &sessions, &parties);
        assert_eq!(delta.players["p1"], 6);
        assert_eq!(ledger.players["p1"], 6);

        let mut sessions = sessions;
        ledger.apply_to(&mut sessions, &mut parties);
        assert_eq!(parties[0].compensation, 6);

        let second = allocation(vec![("p1", Some(("a", Tier::plain(0))))], vec![]);
        let delta = ledger.update(&second, &sessions, &parties);
        assert_eq!(delta.players["p1"], -6);
        assert_eq!(ledger.players["p1"], 0);
    }

    #[test]
    fn unassigned_party_is_charged_the_worst_rank() {
        let sessions = vec![Session::new("a", 1, 3, 6)];
        let parties = vec![Party::new("p1", 2)];
        let result = allocation(vec![("p1", None)], vec![]);
        let delta = compute_delta(&result, &sessions, &parties, 10, |p| p.compensation, |g| g.compensation);

        assert_eq!(delta.players["p1"], 10);
    }

    #[test]
    fn gamemaster_penalties() {
        let sessions = vec![
            Session::new("ran_optimal", 1, 2, 4).with_gamemaster("gm1", 4),
            Session::new("cancelled", 3, 4, 6).with_gamemaster("gm2", 1),
            Session::new("empty", 3, 4, 6).with_gamemaster("gm3", 0),
            Session::new("off_optimal", 1, 4, 6).with_gamemaster("gm4", 0),
        ];
        let parties = vec![Party::new("p1", 2), Party::new("p2", 1)];
        let result = allocation(
            vec![
                ("p1", Some(("ran_optimal", Tier::plain(0)))),
                ("p2", Some(("off_optimal", Tier::plain(0)))),
            ],
            vec!["cancelled"],
        );
        let delta = compute_delta(&result, &sessions, &parties, 10, |p| p.compensation, |g| g.compensation);

        assert_eq!(delta.gamemasters["gm1"], -4);
        assert_eq!(delta.gamemasters["gm2"], 20);
        assert_eq!(delta.gamemasters["gm3"], 10);
        assert_eq!(delta.gamemasters["gm4"], 3);
        assert_eq!(delta.virtual_penalties["gm4"], 3);
        assert_eq!(delta.total(), -4 + 20 + 10 + 3);
        assert_eq!(delta.real_total(), -4 + 20 + 10);
    }

    #[test]
    fn empty_session_with_zero_optimum_resets_its_gamemaster() {
        let sessions = vec![
            Session::new("standby", 0, 0, 4).with_gamemaster("gm1", 5),
            Session::new("idle", 0, 2, 4).with_gamemaster("gm2", 5),
        ];
        let result = allocation(vec![], vec![]);
        let delta = compute_delta(&result, &sessions, &[], 10, |p| p.compensation, |g| g.compensation);

        assert_eq!(delta.gamemasters["gm1"], -5);
        assert_eq!(delta.gamemasters["gm2"], 20);
        assert!(delta.virtual_penalties.is_empty());
    }
}
