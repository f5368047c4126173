use std::cmp::Reverse;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::{AllocatorConfig, SessionOrder, UnplaceablePolicy};
use crate::error::{AllocationError, TrialFailure};
use super::displacement::try_bump;
use super::repair::{cancel_underfilled, repair_underfilled};
use super::score::evaluate;
use super::table_utils::{calculate_session_popularity, order_sessions};
use super::tiers::{build_tier_list, tier_party, TierList};
use super::types::{
    Allocation, Assignment, Displacement, GamemasterSeat, Loss, Party, Session, Tier,
};
use super::validate::{check_tables, validate_input};

/// Read-only snapshot shared by every trial
#[derive(Debug)]
pub struct AllocationInput<'a> {
    pub sessions: &'a [Session],
    pub parties: &'a [Party],
    pub config: &'a AllocatorConfig,
    pub party_tiers: Vec<TierList>,
    /// Tiers of each session's GM, used only if the session is cancelled
    pub gamemaster_tiers: Vec<Option<TierList>>,
    /// Number of parties ranking each session at tier 0
    pub popularity: Vec<u32>,
    token_parties: Vec<usize>,
    regular_parties: Vec<usize>,
}

impl<'a> AllocationInput<'a> {
    /// Validates the snapshot and derives every party's tiers
    pub fn new(
        sessions: &'a [Session],
        parties: &'a [Party],
        config: &'a AllocatorConfig,
    ) -> Result<Self, AllocationError> {
        config.validate()?;
        validate_input(sessions, parties, config)?;

        let party_tiers: Vec<TierList> = parties
            .iter()
            .map(|party| tier_party(party, sessions, config))
            .collect();

        let mut token_parties = Vec::new();
        let mut regular_parties = Vec::new();
        for (index, party) in parties.iter().enumerate() {
            if party_tiers[index].is_empty() {
                match config.unplaceable_policy {
                    UnplaceablePolicy::Fail => {
                        return Err(AllocationError::NoValidSession { party: party.id.clone() });
                    }
                    UnplaceablePolicy::Unassign => continue,
                }
            }
            if party.golden_die {
                token_parties.push(index);
            } else {
                regular_parties.push(index);
            }
        }

        let gamemaster_tiers = sessions
            .iter()
            .map(|session| {
                session
                    .gamemaster
                    .as_ref()
                    .map(|gm| build_tier_list(&gm.preferences, false, sessions, config))
            })
            .collect();

        let popularity = calculate_session_popularity(&party_tiers, sessions.len());

        Ok(AllocationInput {
            sessions,
            parties,
            config,
            party_tiers,
            gamemaster_tiers,
            popularity,
            token_parties,
            regular_parties,
        })
    }

    pub(crate) fn tiers_of(&self, seat: Seat) -> Option<&TierList> {
        match seat {
            Seat::Party(party) => self.party_tiers.get(party),
            Seat::Gamemaster(session) => self.gamemaster_tiers.get(session).and_then(|t| t.as_ref()),
        }
    }

    pub(crate) fn size_of(&self, seat: Seat) -> u32 {
        match seat {
            Seat::Party(party) => self.parties[party].size,
            Seat::Gamemaster(_) => 1,
        }
    }
}

/// Someone occupying seats at a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seat {
    Party(usize),
    /// GM of the session with this index, playing elsewhere
    Gamemaster(usize),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub seats: Vec<Seat>,
    pub players: u32,
}

/// A bump, by index, recorded while the trial runs. Where the party ends
/// up is read from the final state, since repair and cancellation may move
/// it again.
#[derive(Debug, Clone)]
pub(crate) struct BumpRecord {
    pub party: usize,
    pub displaced_by: usize,
    pub from: usize,
    pub tier_before: Tier,
}

/// Mutable working state of one trial. Built fresh from the snapshot.
pub(crate) struct TrialState {
    pub tables: Vec<Table>,
    pub party_location: Vec<Option<usize>>,
    pub gamemaster_location: Vec<Option<usize>>,
    pub cancelled: Vec<bool>,
    pub bumps: Vec<BumpRecord>,
    /// Worst tier a bumped party may still be moved to
    pub bump_floor: Vec<Option<Tier>>,
    pub rng: ChaCha8Rng,
}

impl TrialState {
    pub fn new(input: &AllocationInput, seed: u64) -> Self {
        TrialState {
            tables: vec![Table::default(); input.sessions.len()],
            party_location: vec![None; input.parties.len()],
            gamemaster_location: vec![None; input.sessions.len()],
            cancelled: vec![false; input.sessions.len()],
            bumps: Vec::new(),
            bump_floor: vec![None; input.parties.len()],
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seat(&mut self, seat: Seat, session: usize, size: u32) {
        let table = &mut self.tables[session];
        table.seats.push(seat);
        table.players += size;
        *self.location_mut(seat) = Some(session);
    }

    /// Removes `seat` from `session`. The recorded location is only cleared
    /// if it still points at `session`.
    pub fn unseat(&mut self, seat: Seat, session: usize, size: u32) {
        let table = &mut self.tables[session];
        if let Some(position) = table.seats.iter().position(|s| *s == seat) {
            table.seats.remove(position);
            table.players -= size;
        }
        let location = self.location_mut(seat);
        if *location == Some(session) {
            *location = None;
        }
    }

    pub fn clear_location(&mut self, seat: Seat) {
        *self.location_mut(seat) = None;
    }

    fn location_mut(&mut self, seat: Seat) -> &mut Option<usize> {
        match seat {
            Seat::Party(party) => &mut self.party_location[party],
            Seat::Gamemaster(session) => &mut self.gamemaster_location[session],
        }
    }
}

/// How a placement attempt may use the tables
#[derive(Debug, Clone, Copy)]
pub(crate) enum Placement {
    /// Top-level call: free space first, then bumping
    Primary,
    /// A bumped occupant looking for a new seat. Never bumps anyone, never
    /// goes below `floor`, never returns to `blocked`, never opens a session
    /// below its minimum.
    Relocation { floor: Tier, blocked: usize },
    /// Leaving a cancelled session. Never bumps, never enters a cancelled
    /// session, never opens a session below its minimum. A party that was
    /// bumped earlier keeps its floor.
    Resettle { floor: Option<Tier> },
}

impl Placement {
    fn floor(&self) -> Option<Tier> {
        match *self {
            Placement::Primary => None,
            Placement::Relocation { floor, .. } => Some(floor),
            Placement::Resettle { floor } => floor,
        }
    }
}

/// Places `seat` in the best tier that has room. Returns the session index.
pub(crate) fn place(
    state: &mut TrialState,
    input: &AllocationInput,
    seat: Seat,
    mode: Placement,
) -> Option<usize> {
    let tiers = input.tiers_of(seat)?;
    let size = input.size_of(seat);
    let order = match mode {
        Placement::Resettle { .. } => SessionOrder::ClosestToOptimal,
        _ => input.config.session_order,
    };
    let floor = mode.floor();

    for group in &tiers.groups {
        if matches!(floor, Some(floor) if floor.beats(&group.tier)) {
            continue;
        }

        // Free-space pass
        let candidates = order_sessions(&group.sessions, order, &state.tables, input, &mut state.rng);
        for &session in &candidates {
            if can_enter(state, input, mode, session, size) {
                state.seat(seat, session, size);
                return Some(session);
            }
        }

        // Displacement pass, top-level calls only
        let Seat::Party(party) = seat else { continue };
        if !matches!(mode, Placement::Primary) || !input.config.allow_displacement {
            continue;
        }
        let candidates = order_sessions(&group.sessions, order, &state.tables, input, &mut state.rng);
        for &session in &candidates {
            if try_bump(state, input, party, group.tier, session) {
                return Some(session);
            }
        }
    }

    None
}

fn can_enter(state: &TrialState, input: &AllocationInput, mode: Placement, session: usize, size: u32) -> bool {
    let table = &state.tables[session];
    let limits = &input.sessions[session];
    if table.players + size > limits.max_players {
        return false;
    }
    let opens_below_min = table.players == 0 && size < limits.effective_min();
    match mode {
        Placement::Primary => true,
        Placement::Relocation { blocked, .. } => session != blocked && !opens_below_min,
        Placement::Resettle { .. } => !state.cancelled[session] && !opens_below_min,
    }
}

/// Visiting order of one placement phase
fn processing_order(phase: &[usize], input: &AllocationInput, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut order = phase.to_vec();
    order.shuffle(rng);
    if input.config.prioritize_debt {
        // Stable: equal debt keeps the shuffled order
        order.sort_by_key(|&party| Reverse(input.parties[party].compensation));
    }
    order
}

/// Runs one complete trial with its own random source
pub fn run_trial(input: &AllocationInput, trial: usize, seed: u64) -> Result<Allocation, TrialFailure> {
    let mut state = TrialState::new(input, seed);

    // Token holders first, then everyone else
    for phase in [&input.token_parties, &input.regular_parties] {
        for party in processing_order(phase, input, &mut state.rng) {
            if place(&mut state, input, Seat::Party(party), Placement::Primary).is_none() {
                debug!(trial, seed, party = %input.parties[party].id, "Party could not be placed");
                return Err(TrialFailure::UnplaceableParty {
                    party: input.parties[party].id.clone(),
                });
            }
        }
    }

    if input.config.repair_underfilled {
        repair_underfilled(&mut state, input);
    }
    cancel_underfilled(&mut state, input)?;
    check_tables(&state, input)?;

    let mut allocation = build_allocation(&state, input, trial, seed);
    allocation.loss = evaluate(input.config.scoring_mode, input.sessions, input.parties, &allocation, input.config);
    Ok(allocation)
}

fn build_allocation(state: &TrialState, input: &AllocationInput, trial: usize, seed: u64) -> Allocation {
    let session_id = |index: usize| input.sessions[index].id.clone();

    let assignments: Vec<Assignment> = input
        .parties
        .iter()
        .enumerate()
        .map(|(index, party)| {
            let location = state.party_location[index];
            Assignment {
                party_id: party.id.clone(),
                session_id: location.map(session_id),
                tier: location.and_then(|s| input.party_tiers[index].tier_at(s)),
            }
        })
        .collect();

    let cancelled: Vec<usize> = (0..input.sessions.len()).filter(|&s| state.cancelled[s]).collect();

    let gamemasters = cancelled
        .iter()
        .filter_map(|&s| {
            input.sessions[s].gamemaster.as_ref().map(|gm| GamemasterSeat {
                gamemaster_id: gm.id.clone(),
                cancelled_session: session_id(s),
                session_id: state.gamemaster_location[s].map(session_id),
            })
        })
        .collect();

    // A bump that repair later reversed is not reported
    let displacements = state
        .bumps
        .iter()
        .filter_map(|bump| {
            let seat = state.party_location[bump.party].filter(|&s| s != bump.from)?;
            Some(Displacement {
                party_id: input.parties[bump.party].id.clone(),
                displaced_by: input.parties[bump.displaced_by].id.clone(),
                from_session: session_id(bump.from),
                to_session: session_id(seat),
                tier_before: bump.tier_before,
                tier_after: input.party_tiers[bump.party].tier_at(seat)?,
            })
        })
        .collect();

    let tokens_spent = assignments
        .iter()
        .zip(input.parties)
        .filter(|(a, p)| p.golden_die && a.tier.map(|t| t.golden).unwrap_or(false))
        .map(|(a, _)| a.party_id.clone())
        .collect();

    Allocation {
        trial,
        seed,
        loss: Loss::default(),
        assignments,
        gamemasters,
        cancelled_sessions: cancelled.into_iter().map(session_id).collect(),
        displacements,
        tokens_spent,
    }
}
