use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::allocation::types::{PartyId, SessionId};

/// Parties and sessions that could not be reconciled across the whole
/// trial budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Oversubscription {
    /// Parties that failed placement, most frequent first
    pub parties: Vec<PartyId>,
    /// Every session those parties would accept
    pub sessions: Vec<SessionId>,
    /// Players who can only sit in `sessions`
    pub demand: u32,
    /// Total maximum occupancy of `sessions`
    pub capacity: u32,
    /// Sessions that could never reach their minimum
    pub underfilled_sessions: Vec<SessionId>,
    /// Sessions a trial left above their maximum
    pub overfilled_sessions: Vec<SessionId>,
}

impl fmt::Display for Oversubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.parties.is_empty() {
            if self.sessions.is_empty() {
                parts.push(format!("parties [{}] have zero alternative sessions", self.parties.join(", ")));
            } else {
                let mut shortfall = format!(
                    "{} players compete for {} seats in sessions [{}] (unplaced parties: [{}])",
                    self.demand,
                    self.capacity,
                    self.sessions.join(", "),
                    self.parties.join(", ")
                );
                if self.sessions.len() == 1 {
                    shortfall.push_str(" with zero alternative sessions");
                }
                parts.push(shortfall);
            }
        }
        if !self.underfilled_sessions.is_empty() {
            parts.push(format!("sessions [{}] stayed under minimum", self.underfilled_sessions.join(", ")));
        }
        if !self.overfilled_sessions.is_empty() {
            parts.push(format!("sessions [{}] went over maximum", self.overfilled_sessions.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Session {session} has invalid capacity: {reason}")]
    InvalidCapacity { session: SessionId, reason: String },

    #[error("Party {party} is invalid: {reason}")]
    InvalidParty { party: PartyId, reason: String },

    #[error("Party {party} of size {size} does not fit any session (largest max is {largest})")]
    PartyTooLarge { party: PartyId, size: u32, largest: u32 },

    #[error("Party {party} has a preference for unknown session {session}")]
    UnknownSession { party: PartyId, session: SessionId },

    #[error("Duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Party {party} rates session {session} at {value}, outside the scale 0..={max}")]
    PreferenceOutOfRange { party: PartyId, session: SessionId, value: u8, max: u8 },

    #[error("Party {party} has no session it is willing to join")]
    NoValidSession { party: PartyId },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("All {trials} trials failed: {oversubscription}")]
    AllTrialsFailed { trials: usize, oversubscription: Oversubscription },

    #[error("Allocation cancelled after {completed} trials without a valid result")]
    Cancelled { completed: usize },
}

/// Why a single trial was discarded. Recovered by the optimizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrialFailure {
    #[error("Party {party} could not be placed")]
    UnplaceableParty { party: PartyId },

    #[error("Session {session} runs with {players} players, below its minimum of {min}")]
    UnderfilledSession { session: SessionId, players: u32, min: u32 },

    #[error("Session {session} holds {players} players, above its maximum of {max}")]
    OverfilledSession { session: SessionId, players: u32, max: u32 },
}
