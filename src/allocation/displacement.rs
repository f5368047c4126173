use tracing::trace;

use super::engine::{place, AllocationInput, BumpRecord, Placement, Seat, TrialState};
use super::types::Tier;

/// Try to seat `party` at `session` by moving one occupant elsewhere.
///
/// An occupant qualifies if its own tier at `session` does not beat the
/// incoming tier, and removing it leaves enough room. The occupant must
/// find a free seat in a tier at least as good as the one it is leaving,
/// somewhere other than `session`. Relocations never bump in turn.
pub(crate) fn try_bump(
    state: &mut TrialState,
    input: &AllocationInput,
    party: usize,
    tier: Tier,
    session: usize,
) -> bool {
    let size = input.parties[party].size;
    let max = input.sessions[session].max_players;
    let occupants = state.tables[session].seats.clone();

    for occupant in occupants {
        let Seat::Party(other) = occupant else { continue };
        let Some(other_tier) = input.party_tiers[other].tier_at(session) else { continue };
        if other_tier.beats(&tier) {
            continue;
        }

        let other_size = input.parties[other].size;
        if state.tables[session].players - other_size + size > max {
            continue;
        }

        let relocation = Placement::Relocation { floor: other_tier, blocked: session };
        let Some(destination) = place(state, input, occupant, relocation) else { continue };

        state.unseat(occupant, session, other_size);
        state.seat(Seat::Party(party), session, size);

        trace!(
            party = %input.parties[other].id,
            by = %input.parties[party].id,
            from = %input.sessions[session].id,
            to = %input.sessions[destination].id,
            "Bumped party"
        );
        state.bump_floor[other] = Some(other_tier);
        state.bumps.push(BumpRecord {
            party: other,
            displaced_by: party,
            from: session,
            tier_before: other_tier,
        });
        return true;
    }

    false
}
