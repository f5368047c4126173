use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::allocation::types::{Party, Session};

/// Every 20th session is a large multi-table game
const MULTI_TABLE_EVERY: usize = 20;

/// A generated snapshot for simulations and benchmarks
#[derive(Debug, Clone)]
pub struct MockScenario {
    pub sessions: Vec<Session>,
    pub parties: Vec<Party>,
}

impl MockScenario {
    /// Generates `session_count` sessions and `party_count` parties.
    /// The same seed always produces the same scenario.
    pub fn generate(session_count: usize, party_count: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let sessions: Vec<Session> = (0..session_count)
            .map(|i| generate_session(&mut rng, i))
            .collect();
        let parties = (0..party_count)
            .map(|i| generate_party(&mut rng, i, &sessions))
            .collect();

        MockScenario { sessions, parties }
    }
}

fn is_multi_table(number: usize) -> bool {
    number % MULTI_TABLE_EVERY == 0
}

fn generate_session(rng: &mut ChaCha8Rng, number: usize) -> Session {
    let range: Vec<u32> = if is_multi_table(number) { (12..=25).collect() } else { (3..=5).collect() };
    let mut counts: Vec<u32> = range.choose_multiple(rng, 3).copied().collect();
    counts.sort();

    let gm_compensation = weighted_bonus(rng, &[10, 20, 30]);
    Session::new(&format!("s{}", number), counts[0], counts[1], counts[2])
        .with_gamemaster(&format!("gm{}", number), gm_compensation)
}

fn generate_party(rng: &mut ChaCha8Rng, number: usize, sessions: &[Session]) -> Party {
    let size = *[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 3].choose(rng).unwrap_or(&1);
    let golden_die = rng.gen_bool(0.2);
    let compensation = (0..size).map(|_| weighted_bonus(rng, &[1, 2, 3])).sum();

    let mut party = Party::new(&format!("p{}", number), size).with_compensation(compensation);
    if golden_die {
        party = party.with_golden_die();
    }

    let mut ratings: Vec<u8> = (0..sessions.len())
        .map(|i| {
            let mut choices = vec![0u8, 0, 0, 0, 0, 1, 2, 3, 4, 5];
            // Multi-table games are popular
            if is_multi_table(i) {
                choices.extend([5, 5, 5]);
            }
            *choices.choose(rng).unwrap_or(&0)
        })
        .collect();

    // At least two sessions the party would play
    if ratings.iter().filter(|&&r| r > 0).count() < 2 {
        for i in index::sample(rng, ratings.len(), ratings.len().min(2)) {
            ratings[i] = rng.gen_range(4..=5);
        }
    }

    for (session, rating) in sessions.iter().zip(ratings) {
        party = party.prefer(&session.id, rating);
    }
    party
}

/// Mostly zero, occasionally one of `bonuses`
fn weighted_bonus(rng: &mut ChaCha8Rng, bonuses: &[i64]) -> i64 {
    if rng.gen_range(0..20 + bonuses.len()) < 20 {
        0
    } else {
        *bonuses.choose(rng).unwrap_or(&0)
    }
}
