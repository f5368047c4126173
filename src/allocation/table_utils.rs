use std::cmp::Reverse;

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::config::SessionOrder;
use super::engine::{AllocationInput, Table};
use super::tiers::TierList;

/// Count how many parties put each session in their top tier
pub fn calculate_session_popularity(tier_lists: &[TierList], session_count: usize) -> Vec<u32> {
    let mut popularity = vec![0u32; session_count];

    for tiers in tier_lists {
        if let Some(top) = tiers.groups.first() {
            for &session in &top.sessions {
                popularity[session] += 1;
            }
        }
    }

    popularity
}

/// Order the candidate sessions of one tier for a placement attempt.
///
/// Candidates are always shuffled first so that sessions which tie under
/// the chosen order are still visited in a per-trial random order.
pub(crate) fn order_sessions(
    candidates: &[usize],
    order: SessionOrder,
    tables: &[Table],
    input: &AllocationInput,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let mut ordered = candidates.to_vec();
    ordered.shuffle(rng);

    match order {
        SessionOrder::Random => {}
        SessionOrder::MostRoom => {
            ordered.sort_by_key(|&s| Reverse(free_seats(input, tables, s)));
        }
        SessionOrder::ClosestToOptimal => {
            // Furthest below optimal first, overfull-past-optimal last
            ordered.sort_by_key(|&s| tables[s].players as i64 - input.sessions[s].opt_players as i64);
        }
        SessionOrder::LeastPopular => {
            ordered.sort_by_key(|&s| input.popularity[s]);
        }
    }

    ordered
}

pub(crate) fn free_seats(input: &AllocationInput, tables: &[Table], session: usize) -> u32 {
    input.sessions[session].max_players.saturating_sub(tables[session].players)
}

/// Occupied but below the minimum needed to run
pub(crate) fn is_underfilled(input: &AllocationInput, tables: &[Table], session: usize) -> bool {
    let players = tables[session].players;
    players > 0 && players < input.sessions[session].effective_min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use crate::allocation::engine::Seat;
    use crate::allocation::types::{Party, Session};
    use crate::config::AllocatorConfig;

    fn table(players: u32) -> Table {
        Table { seats: vec![Seat::Party(0)], players }
    }

    #[test]
    fn popularity_counts_top_tier_only() {
        let sessions = vec![Session::new("a", 1, 2, 4), Session::new("b", 1, 2, 4)];
        let parties = vec![
            Party::new("p1", 1).prefer("a", 5).prefer("b", 4),
            Party::new("p2", 1).prefer("a", 5).prefer("b", 5),
            Party::new("p3", 1).prefer("a", 2).prefer("b", 4),
        ];
        let config = AllocatorConfig::default();
        let input = AllocationInput::new(&sessions, &parties, &config).unwrap();

        assert_eq!(input.popularity, vec![2, 2]);
    }

    #[test]
    fn most_room_puts_emptiest_first() {
        let sessions = vec![
            Session::new("a", 1, 2, 4),
            Session::new("b", 1, 2, 6),
            Session::new("c", 1, 2, 4),
        ];
        let parties = vec![Party::new("p1", 1)];
        let config = AllocatorConfig::default();
        let input = AllocationInput::new(&sessions, &parties, &config).unwrap();
        let tables = vec![table(3), table(1), table(2)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let ordered = order_sessions(&[0, 1, 2], SessionOrder::MostRoom, &tables, &input, &mut rng);
        assert_eq!(ordered, vec![1, 2, 0]);
    }

    #[test]
    fn closest_to_optimal_prefers_sessions_short_of_optimal() {
        let sessions = vec![Session::new("a", 1, 4, 6), Session::new("b", 1, 2, 6)];
        let parties = vec![Party::new("p1", 1)];
        let config = AllocatorConfig::default();
        let input = AllocationInput::new(&sessions, &parties, &config).unwrap();
        let tables = vec![table(3), table(3)];
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let ordered = order_sessions(&[1, 0], SessionOrder::ClosestToOptimal, &tables, &input, &mut rng);
        assert_eq!(ordered, vec![0, 1]);
    }

    #[test]
    fn least_popular_puts_uncontested_sessions_first() {
        let sessions = vec![
            Session::new("a", 1, 2, 4),
            Session::new("b", 1, 2, 4),
            Session::new("c", 1, 2, 4),
        ];
        let parties = vec![
            Party::new("p1", 1).prefer("a", 5),
            Party::new("p2", 1).prefer("a", 5),
            Party::new("p3", 1).prefer("c", 5),
        ];
        let config = AllocatorConfig::default();
        let input = AllocationInput::new(&sessions, &parties, &config).unwrap();
        let tables = vec![Table::default(); 3];

        assert_eq!(input.popularity, vec![2, 0, 1]);
        for seed in 0..5 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let ordered = order_sessions(&[0, 1, 2], SessionOrder::LeastPopular, &tables, &input, &mut rng);
            assert_eq!(ordered, vec![1, 2, 0]);
        }
    }

    #[test]
    fn random_order_is_a_permutation() {
        let sessions: Vec<Session> = (0..6).map(|i| Session::new(&format!("s{i}"), 1, 2, 4)).collect();
        let parties = vec![Party::new("p1", 1)];
        let config = AllocatorConfig::default();
        let input = AllocationInput::new(&sessions, &parties, &config).unwrap();
        let tables = vec![Table::default(); 6];
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let mut ordered = order_sessions(&[0, 1, 2, 3, 4, 5], SessionOrder::Random, &tables, &input, &mut rng);
        ordered.sort();
        assert_eq!(ordered, vec![0, 1, 2, 3, 4, 5]);
    }
}
