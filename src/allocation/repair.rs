use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::TrialFailure;
use super::engine::{place, AllocationInput, Placement, Seat, TrialState};
use super::table_utils::is_underfilled;

/// Pull parties from sessions above optimal occupancy into sessions that
/// are occupied but below their minimum.
///
/// A move is allowed only if the source keeps its minimum, the target stays
/// within its maximum, and the party is no worse off at the target. If the
/// target still misses its minimum after all candidates, its moves are undone.
pub(crate) fn repair_underfilled(state: &mut TrialState, input: &AllocationInput) {
    let mut targets: Vec<usize> = (0..state.tables.len())
        .filter(|&s| is_underfilled(input, &state.tables, s))
        .collect();
    // Smallest shortfall first
    targets.sort_by_key(|&s| input.sessions[s].effective_min() - state.tables[s].players);

    for target in targets {
        if !is_underfilled(input, &state.tables, target) {
            continue;
        }
        let limits = &input.sessions[target];

        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for (source, table) in state.tables.iter().enumerate() {
            if source == target || table.players <= input.sessions[source].opt_players {
                continue;
            }
            for seat in &table.seats {
                let Seat::Party(party) = *seat else { continue };
                let tiers = &input.party_tiers[party];
                if let (Some(current), Some(offered)) = (tiers.tier_at(source), tiers.tier_at(target)) {
                    if offered.no_worse_than(&current) {
                        candidates.push((party, source));
                    }
                }
            }
        }
        candidates.shuffle(&mut state.rng);

        let mut moved = Vec::new();
        for (party, source) in candidates {
            if state.tables[target].players >= limits.effective_min() {
                break;
            }
            let size = input.parties[party].size;
            if state.tables[target].players + size > limits.max_players {
                continue;
            }
            if state.tables[source].players - size < input.sessions[source].effective_min() {
                continue;
            }
            state.unseat(Seat::Party(party), source, size);
            state.seat(Seat::Party(party), target, size);
            moved.push((party, source));
        }

        if state.tables[target].players >= limits.effective_min() {
            debug!(session = %limits.id, moved = moved.len(), "Repaired underfilled session");
        } else {
            for (party, source) in moved.into_iter().rev() {
                let size = input.parties[party].size;
                state.unseat(Seat::Party(party), target, size);
                state.seat(Seat::Party(party), source, size);
            }
        }
    }
}

/// Cancel every session still below its minimum and resettle its parties.
///
/// Displaced parties go to the valid session closest to optimal occupancy
/// without bumping anyone. A party bumped during placement may not land
/// below the tier it was bumped from. Displaced GMs are seated on a best-effort basis
/// once all parties have found a table.
pub(crate) fn cancel_underfilled(state: &mut TrialState, input: &AllocationInput) -> Result<(), TrialFailure> {
    let doomed: Vec<usize> = (0..state.tables.len())
        .filter(|&s| is_underfilled(input, &state.tables, s))
        .collect();
    if doomed.is_empty() {
        return Ok(());
    }

    let mut displaced = Vec::new();
    for &session in &doomed {
        state.cancelled[session] = true;
        let table = &mut state.tables[session];
        let seats = std::mem::take(&mut table.seats);
        table.players = 0;
        for seat in seats {
            state.clear_location(seat);
            displaced.push(seat);
        }
        debug!(session = %input.sessions[session].id, "Cancelled underfilled session");
    }

    displaced.shuffle(&mut state.rng);
    for seat in displaced {
        let Seat::Party(party) = seat else { continue };
        let floor = state.bump_floor[party];
        if place(state, input, seat, Placement::Resettle { floor }).is_none() {
            return Err(TrialFailure::UnplaceableParty {
                party: input.parties[party].id.clone(),
            });
        }
    }

    if input.config.relocate_gamemasters {
        for &session in &doomed {
            if input.gamemaster_tiers[session].is_none() {
                continue;
            }
            if place(state, input, Seat::Gamemaster(session), Placement::Resettle { floor: None }).is_none() {
                debug!(session = %input.sessions[session].id, "No table for the GM of a cancelled session");
            }
        }
    }

    Ok(())
}
