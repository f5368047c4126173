use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

pub type PartyId = String;
pub type SessionId = String;
pub type GamemasterId = String;

/// The host of a session. Not counted against the session's own capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gamemaster {
    pub id: GamemasterId,
    #[serde(default)]
    pub compensation: i64,
    /// Used only if the GM's own session is cancelled and they join another table
    #[serde(default)]
    pub preferences: BTreeMap<SessionId, u8>,
}

/// A single game run at a single table during one time slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub min_players: u32,
    pub opt_players: u32,
    pub max_players: u32,
    #[serde(default)]
    pub gamemaster: Option<Gamemaster>,
    /// Catch-all table every party implicitly accepts as a last resort
    #[serde(default)]
    pub overflow: bool,
}

impl Session {
    pub fn new(id: &str, min_players: u32, opt_players: u32, max_players: u32) -> Self {
        Session {
            id: id.to_string(),
            min_players,
            opt_players,
            max_players,
            gamemaster: None,
            overflow: false,
        }
    }

    pub fn with_gamemaster(mut self, id: &str, compensation: i64) -> Self {
        self.gamemaster = Some(Gamemaster {
            id: id.to_string(),
            compensation,
            preferences: BTreeMap::new(),
        });
        self
    }

    pub fn as_overflow(mut self) -> Self {
        self.overflow = true;
        self
    }

    /// Minimum occupancy that must be reached before the session may run
    pub fn effective_min(&self) -> u32 {
        if self.overflow { 0 } else { self.min_players }
    }
}

/// A group of attendees who must be seated together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub size: u32,
    /// Raw preference per session; missing entries take the neutral value
    #[serde(default)]
    pub preferences: BTreeMap<SessionId, u8>,
    /// Holds the scarce bonus token (golden die)
    #[serde(default)]
    pub golden_die: bool,
    /// Debt carried from earlier time slots
    #[serde(default)]
    pub compensation: i64,
}

impl Party {
    pub fn new(id: &str, size: u32) -> Self {
        Party {
            id: id.to_string(),
            size,
            preferences: BTreeMap::new(),
            golden_die: false,
            compensation: 0,
        }
    }

    pub fn prefer(mut self, session_id: &str, value: u8) -> Self {
        self.preferences.insert(session_id.to_string(), value);
        self
    }

    pub fn with_golden_die(mut self) -> Self {
        self.golden_die = true;
        self
    }

    pub fn with_compensation(mut self, compensation: i64) -> Self {
        self.compensation = compensation;
        self
    }
}

/// A party's discrete preference rank for a session.
///
/// Ordering is "best first": a token-elevated tier sorts before every
/// plain tier, then lower rank sorts first. `a < b` means `a` beats `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tier {
    pub golden: bool,
    pub rank: u32,
}

impl Tier {
    pub fn plain(rank: u32) -> Self {
        Tier { golden: false, rank }
    }

    pub fn golden(rank: u32) -> Self {
        Tier { golden: true, rank }
    }

    pub fn beats(&self, other: &Tier) -> bool {
        self < other
    }

    pub fn no_worse_than(&self, other: &Tier) -> bool {
        self <= other
    }
}

impl Ord for Tier {
    fn cmp(&self, other: &Self) -> Ordering {
        other.golden
            .cmp(&self.golden)
            .then(self.rank.cmp(&other.rank))
    }
}

impl PartialOrd for Tier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.golden {
            write!(f, "G{}", self.rank)
        } else {
            write!(f, "T{}", self.rank)
        }
    }
}

/// Where one input party ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub party_id: PartyId,
    pub session_id: Option<SessionId>,
    pub tier: Option<Tier>,
}

/// GM of a cancelled session, seated as a player elsewhere (or nowhere)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamemasterSeat {
    pub gamemaster_id: GamemasterId,
    pub cancelled_session: SessionId,
    pub session_id: Option<SessionId>,
}

/// A bump performed during placement.
///
/// `to_session` and `tier_after` describe the party's final seat, which may
/// differ from where the bump first sent it if repair or cancellation moved
/// it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Displacement {
    pub party_id: PartyId,
    pub displaced_by: PartyId,
    pub from_session: SessionId,
    pub to_session: SessionId,
    pub tier_before: Tier,
    pub tier_after: Tier,
}

/// Trial loss, lower is better. Ties go to fewer cancelled sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Loss {
    pub value: i64,
    pub cancelled_sessions: usize,
}

/// Result of one successful trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub trial: usize,
    pub seed: u64,
    pub loss: Loss,
    /// One row per input party, in input order
    pub assignments: Vec<Assignment>,
    pub gamemasters: Vec<GamemasterSeat>,
    pub cancelled_sessions: Vec<SessionId>,
    pub displacements: Vec<Displacement>,
    /// Token holders seated in a token-elevated tier
    pub tokens_spent: Vec<PartyId>,
}

impl Allocation {
    pub fn session_of(&self, party_id: &str) -> Option<&SessionId> {
        self.assignments
            .iter()
            .find(|a| a.party_id == party_id)
            .and_then(|a| a.session_id.as_ref())
    }

    /// Inverse view: parties seated at a session
    pub fn occupants(&self, session_id: &str) -> Vec<&PartyId> {
        self.assignments
            .iter()
            .filter(|a| a.session_id.as_deref() == Some(session_id))
            .map(|a| &a.party_id)
            .collect()
    }

    pub fn unassigned(&self) -> Vec<&PartyId> {
        self.assignments
            .iter()
            .filter(|a| a.session_id.is_none())
            .map(|a| &a.party_id)
            .collect()
    }

    /// Player count per session, including relocated GMs
    pub fn player_counts(&self, sessions: &[Session], parties: &[Party]) -> BTreeMap<SessionId, u32> {
        let mut counts: BTreeMap<SessionId, u32> = sessions
            .iter()
            .map(|s| (s.id.clone(), 0))
            .collect();
        let sizes: BTreeMap<&str, u32> = parties
            .iter()
            .map(|p| (p.id.as_str(), p.size))
            .collect();

        for assignment in &self.assignments {
            if let Some(session_id) = &assignment.session_id {
                let size = sizes.get(assignment.party_id.as_str()).copied().unwrap_or(0);
                *counts.entry(session_id.clone()).or_insert(0) += size;
            }
        }
        for seat in &self.gamemasters {
            if let Some(session_id) = &seat.session_id {
                *counts.entry(session_id.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}
