use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::config::AllocatorConfig;
use crate::error::{AllocationError, TrialFailure};
use super::engine::{AllocationInput, TrialState};
use super::types::{Allocation, Party, PartyId, Session, SessionId};

/// Reject malformed input before any trial runs
pub fn validate_input(
    sessions: &[Session],
    parties: &[Party],
    config: &AllocatorConfig,
) -> Result<(), AllocationError> {
    let mut session_ids = BTreeSet::new();
    for session in sessions {
        if !session_ids.insert(session.id.as_str()) {
            return Err(AllocationError::DuplicateId { kind: "session", id: session.id.clone() });
        }
        let invalid = |reason: &str| AllocationError::InvalidCapacity {
            session: session.id.clone(),
            reason: reason.to_string(),
        };
        if session.max_players == 0 {
            return Err(invalid("max_players must be positive"));
        }
        if session.min_players > session.opt_players {
            return Err(invalid("min_players exceeds opt_players"));
        }
        if session.opt_players > session.max_players {
            return Err(invalid("opt_players exceeds max_players"));
        }
    }

    let mut gamemaster_ids = BTreeSet::new();
    for gm in sessions.iter().filter_map(|s| s.gamemaster.as_ref()) {
        if !gamemaster_ids.insert(gm.id.as_str()) {
            return Err(AllocationError::DuplicateId { kind: "gamemaster", id: gm.id.clone() });
        }
        for (session_id, &value) in &gm.preferences {
            if !session_ids.contains(session_id.as_str()) {
                return Err(AllocationError::UnknownSession { party: gm.id.clone(), session: session_id.clone() });
            }
            if value > config.preference_scale.max {
                return Err(AllocationError::PreferenceOutOfRange {
                    party: gm.id.clone(),
                    session: session_id.clone(),
                    value,
                    max: config.preference_scale.max,
                });
            }
        }
    }

    let largest = sessions.iter().map(|s| s.max_players).max().unwrap_or(0);
    let mut party_ids = BTreeSet::new();
    for party in parties {
        if !party_ids.insert(party.id.as_str()) {
            return Err(AllocationError::DuplicateId { kind: "party", id: party.id.clone() });
        }
        if party.size == 0 {
            return Err(AllocationError::InvalidParty {
                party: party.id.clone(),
                reason: "size must be at least 1".to_string(),
            });
        }
        for (session_id, &value) in &party.preferences {
            if !session_ids.contains(session_id.as_str()) {
                return Err(AllocationError::UnknownSession {
                    party: party.id.clone(),
                    session: session_id.clone(),
                });
            }
            if value > config.preference_scale.max {
                return Err(AllocationError::PreferenceOutOfRange {
                    party: party.id.clone(),
                    session: session_id.clone(),
                    value,
                    max: config.preference_scale.max,
                });
            }
        }
        if party.size > largest {
            return Err(AllocationError::PartyTooLarge { party: party.id.clone(), size: party.size, largest });
        }
    }

    Ok(())
}

/// Final capacity check of a finished trial
pub(crate) fn check_tables(state: &TrialState, input: &AllocationInput) -> Result<(), TrialFailure> {
    for (table, session) in state.tables.iter().zip(input.sessions) {
        if table.players > session.max_players {
            return Err(TrialFailure::OverfilledSession {
                session: session.id.clone(),
                players: table.players,
                max: session.max_players,
            });
        }
        if table.players > 0 && table.players < session.effective_min() {
            return Err(TrialFailure::UnderfilledSession {
                session: session.id.clone(),
                players: table.players,
                min: session.effective_min(),
            });
        }
    }
    Ok(())
}

/// A broken invariant found in an allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Violation {
    MissingParty(PartyId),
    DuplicateParty(PartyId),
    UnknownParty(PartyId),
    UnknownSession(SessionId),
    /// Party seated at a session it rated no-go
    NoGoSession { party: PartyId, session: SessionId },
    Underfilled { session: SessionId, players: u32, min: u32 },
    Overfilled { session: SessionId, players: u32, max: u32 },
    /// Cancelled session that still has someone seated
    CancelledInUse(SessionId),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingParty(p) => write!(f, "party {p} has no assignment row"),
            Violation::DuplicateParty(p) => write!(f, "party {p} appears more than once"),
            Violation::UnknownParty(p) => write!(f, "assignment for unknown party {p}"),
            Violation::UnknownSession(s) => write!(f, "assignment to unknown session {s}"),
            Violation::NoGoSession { party, session } => {
                write!(f, "party {party} seated at no-go session {session}")
            }
            Violation::Underfilled { session, players, min } => {
                write!(f, "session {session} has {players} players, minimum is {min}")
            }
            Violation::Overfilled { session, players, max } => {
                write!(f, "session {session} has {players} players, maximum is {max}")
            }
            Violation::CancelledInUse(s) => write!(f, "cancelled session {s} still has players"),
        }
    }
}

/// Audit an allocation against the sessions and parties it was built from.
/// An empty result means the allocation is valid.
pub fn check_allocation(
    allocation: &Allocation,
    sessions: &[Session],
    parties: &[Party],
    config: &AllocatorConfig,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let by_id: BTreeMap<&str, &Party> = parties.iter().map(|p| (p.id.as_str(), p)).collect();
    let session_ids: BTreeSet<&str> = sessions.iter().map(|s| s.id.as_str()).collect();

    let mut seen = BTreeSet::new();
    for assignment in &allocation.assignments {
        if !seen.insert(assignment.party_id.as_str()) {
            violations.push(Violation::DuplicateParty(assignment.party_id.clone()));
        }
        let Some(party) = by_id.get(assignment.party_id.as_str()) else {
            violations.push(Violation::UnknownParty(assignment.party_id.clone()));
            continue;
        };
        let Some(session_id) = &assignment.session_id else { continue };
        if !session_ids.contains(session_id.as_str()) {
            violations.push(Violation::UnknownSession(session_id.clone()));
            continue;
        }
        let overflow = sessions.iter().any(|s| &s.id == session_id && s.overflow);
        let rating = party.preferences.get(session_id).copied();
        if !overflow && rating == Some(config.preference_scale.no_go) {
            violations.push(Violation::NoGoSession {
                party: party.id.clone(),
                session: session_id.clone(),
            });
        }
    }
    for party in parties {
        if !seen.contains(party.id.as_str()) {
            violations.push(Violation::MissingParty(party.id.clone()));
        }
    }

    let counts = allocation.player_counts(sessions, parties);
    for session in sessions {
        let players = counts.get(&session.id).copied().unwrap_or(0);
        if players > session.max_players {
            violations.push(Violation::Overfilled { session: session.id.clone(), players, max: session.max_players });
        }
        if players > 0 && players < session.effective_min() {
            violations.push(Violation::Underfilled {
                session: session.id.clone(),
                players,
                min: session.effective_min(),
            });
        }
        if players > 0 && allocation.cancelled_sessions.contains(&session.id) {
            violations.push(Violation::CancelledInUse(session.id.clone()));
        }
    }

    violations
}
