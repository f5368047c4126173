use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::AllocatorConfig;
use crate::error::{AllocationError, Oversubscription, TrialFailure};
use super::engine::{run_trial, AllocationInput};
use super::types::{Allocation, Party, PartyId, Session, SessionId};
use super::validate::check_allocation;

/// Cooperative cancellation, checked before each trial starts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-worker summary of finished trials, merged by the reduction
#[derive(Debug, Default)]
struct TrialTally {
    best: Option<Allocation>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    unplaced: BTreeMap<PartyId, usize>,
    underfilled: BTreeMap<SessionId, usize>,
    overfilled: BTreeMap<SessionId, usize>,
}

impl TrialTally {
    fn success(allocation: Allocation) -> Self {
        TrialTally { best: Some(allocation), succeeded: 1, ..Default::default() }
    }

    fn failure(failure: TrialFailure) -> Self {
        let mut tally = TrialTally { failed: 1, ..Default::default() };
        match failure {
            TrialFailure::UnplaceableParty { party } => {
                tally.unplaced.insert(party, 1);
            }
            TrialFailure::UnderfilledSession { session, .. } => {
                tally.underfilled.insert(session, 1);
            }
            TrialFailure::OverfilledSession { session, .. } => {
                tally.overfilled.insert(session, 1);
            }
        }
        tally
    }

    fn skipped() -> Self {
        TrialTally { skipped: 1, ..Default::default() }
    }

    /// Lowest `(loss, trial)` wins, so the result does not depend on
    /// which worker finished first
    fn merge(mut self, other: TrialTally) -> TrialTally {
        self.best = match (self.best.take(), other.best) {
            (Some(a), Some(b)) => Some(if (b.loss, b.trial) < (a.loss, a.trial) { b } else { a }),
            (a, b) => a.or(b),
        };
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        for (party, count) in other.unplaced {
            *self.unplaced.entry(party).or_insert(0) += count;
        }
        for (session, count) in other.underfilled {
            *self.underfilled.entry(session).or_insert(0) += count;
        }
        for (session, count) in other.overfilled {
            *self.overfilled.entry(session).or_insert(0) += count;
        }
        self
    }
}

/// Multi-trial optimizer over the allocation engine
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, AllocationError> {
        config.validate()?;
        Ok(Allocator { config })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Run the full trial budget and return the best allocation
    pub fn allocate(&self, sessions: &[Session], parties: &[Party]) -> Result<Allocation, AllocationError> {
        self.allocate_with_cancel(sessions, parties, &CancelToken::new())
    }

    pub fn allocate_with_cancel(
        &self,
        sessions: &[Session],
        parties: &[Party],
        cancel: &CancelToken,
    ) -> Result<Allocation, AllocationError> {
        self.allocate_observed(sessions, parties, cancel, |_| {})
    }

    /// `after_trial` is called with each trial's index once it has finished
    fn allocate_observed<F>(
        &self,
        sessions: &[Session],
        parties: &[Party],
        cancel: &CancelToken,
        after_trial: F,
    ) -> Result<Allocation, AllocationError>
    where
        F: Fn(usize) + Sync,
    {
        let input = AllocationInput::new(sessions, parties, &self.config)?;
        let n_trials = self.config.n_trials;
        info!(
            sessions = sessions.len(),
            parties = parties.len(),
            trials = n_trials,
            seed_base = self.config.random_seed_base,
            "Starting allocation"
        );

        let run = |trial: usize| -> TrialTally {
            if cancel.is_cancelled() {
                return TrialTally::skipped();
            }
            let seed = self.config.trial_seed(trial);
            let tally = match run_trial(&input, trial, seed) {
                Ok(allocation) => {
                    let violations = check_allocation(&allocation, sessions, parties, &self.config);
                    if let Some(violation) = violations.first() {
                        warn!(trial, seed, %violation, "Discarding trial with an invalid allocation");
                        TrialTally { failed: 1, ..Default::default() }
                    } else {
                        debug!(trial, seed, loss = allocation.loss.value, "Trial succeeded");
                        TrialTally::success(allocation)
                    }
                }
                Err(failure) => {
                    debug!(trial, seed, %failure, "Trial failed");
                    TrialTally::failure(failure)
                }
            };
            after_trial(trial);
            tally
        };

        let tally = if self.config.parallel {
            (0..n_trials)
                .into_par_iter()
                .map(run)
                .reduce(TrialTally::default, TrialTally::merge)
        } else {
            (0..n_trials).map(run).fold(TrialTally::default(), TrialTally::merge)
        };

        if tally.failed > 0 {
            warn!(failed = tally.failed, trials = n_trials, "Some trials failed");
        }
        if tally.skipped > 0 {
            warn!(skipped = tally.skipped, "Allocation cancelled before the budget was spent");
        }

        match tally.best {
            Some(best) => {
                info!(
                    trial = best.trial,
                    seed = best.seed,
                    loss = best.loss.value,
                    cancelled_sessions = best.loss.cancelled_sessions,
                    succeeded = tally.succeeded,
                    "Best allocation found"
                );
                Ok(best)
            }
            None if tally.skipped > 0 => Err(AllocationError::Cancelled {
                completed: tally.succeeded + tally.failed,
            }),
            None => {
                let oversubscription = diagnose(&input, &tally);
                warn!(%oversubscription, "Every trial failed");
                Err(AllocationError::AllTrialsFailed { trials: n_trials, oversubscription })
            }
        }
    }
}

/// Explain an exhausted trial budget in terms of the parties that kept
/// failing and the sessions they are competing for
fn diagnose(input: &AllocationInput, tally: &TrialTally) -> Oversubscription {
    let mut ranked: Vec<(&PartyId, &usize)> = tally.unplaced.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    let index_of: BTreeMap<&str, usize> = input
        .parties
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();

    let mut contested: BTreeSet<usize> = BTreeSet::new();
    for (party, _) in &ranked {
        if let Some(&index) = index_of.get(party.as_str()) {
            contested.extend(input.party_tiers[index].accepted_sessions());
        }
    }

    // Everyone confined to the contested sessions competes for the same seats
    let demand = input
        .parties
        .iter()
        .zip(&input.party_tiers)
        .filter(|(_, tiers)| !tiers.is_empty() && tiers.accepted_sessions().all(|s| contested.contains(&s)))
        .map(|(party, _)| party.size)
        .sum();
    let capacity = contested.iter().map(|&s| input.sessions[s].max_players).sum();

    Oversubscription {
        parties: ranked.into_iter().map(|(p, _)| p.clone()).collect(),
        sessions: contested.into_iter().map(|s| input.sessions[s].id.clone()).collect(),
        demand,
        capacity,
        underfilled_sessions: tally.underfilled.keys().cloned().collect(),
        overfilled_sessions: tally.overfilled.keys().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(n_trials: usize) -> AllocatorConfig {
        AllocatorConfig { n_trials, ..Default::default() }
    }

    #[test]
    fn merge_prefers_lower_loss_then_earlier_trial() {
        let base = Allocation {
            trial: 4,
            seed: 104,
            loss: Default::default(),
            assignments: vec![],
            gamemasters: vec![],
            cancelled_sessions: vec![],
            displacements: vec![],
            tokens_spent: vec![],
        };
        let earlier = Allocation { trial: 1, seed: 101, ..base.clone() };

        let merged = TrialTally::success(base).merge(TrialTally::success(earlier));
        assert_eq!(merged.best.map(|a| a.trial), Some(1));
        assert_eq!(merged.succeeded, 2);
    }

    #[test]
    fn cancelled_before_start_reports_cancellation() {
        let sessions = vec![Session::new("a", 1, 2, 4)];
        let parties = vec![Party::new("p1", 1)];
        let allocator = Allocator::new(config(10)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let error = allocator.allocate_with_cancel(&sessions, &parties, &cancel).unwrap_err();
        assert_eq!(error, AllocationError::Cancelled { completed: 0 });
    }

    #[test]
    fn cancelled_mid_run_returns_the_best_so_far() {
        let sessions = vec![Session::new("a", 1, 2, 4), Session::new("b", 1, 2, 4)];
        let parties = vec![
            Party::new("p1", 2).prefer("a", 5).prefer("b", 3),
            Party::new("p2", 2).prefer("a", 5).prefer("b", 4),
        ];
        let allocator = Allocator::new(AllocatorConfig { parallel: false, ..config(10) }).unwrap();
        let cancel = CancelToken::new();
        let finished = AtomicUsize::new(0);

        let allocation = allocator
            .allocate_observed(&sessions, &parties, &cancel, |trial| {
                finished.fetch_add(1, Ordering::Relaxed);
                if trial == 2 {
                    cancel.cancel();
                }
            })
            .unwrap();

        assert_eq!(finished.load(Ordering::Relaxed), 3);
        assert!(allocation.trial <= 2);
    }

    #[test]
    fn overfilled_failures_are_tallied_apart_from_underfilled() {
        let tally = TrialTally::failure(TrialFailure::OverfilledSession {
            session: "a".to_string(),
            players: 5,
            max: 4,
        })
        .merge(TrialTally::failure(TrialFailure::UnderfilledSession {
            session: "b".to_string(),
            players: 1,
            min: 3,
        }));

        assert_eq!(tally.failed, 2);
        assert_eq!(tally.overfilled.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(tally.underfilled.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let sessions = vec![
            Session::new("a", 2, 3, 4),
            Session::new("b", 2, 3, 4),
            Session::new("c", 1, 2, 3),
        ];
        let parties = vec![
            Party::new("p1", 2).prefer("a", 5).prefer("b", 3),
            Party::new("p2", 1).prefer("a", 5).prefer("c", 4),
            Party::new("p3", 3).prefer("b", 5).prefer("a", 1),
            Party::new("p4", 1).prefer("c", 5).with_golden_die(),
            Party::new("p5", 2).prefer("a", 4).prefer("c", 4),
        ];

        let parallel = Allocator::new(config(40)).unwrap().allocate(&sessions, &parties).unwrap();
        let sequential = Allocator::new(AllocatorConfig { parallel: false, ..config(40) })
            .unwrap()
            .allocate(&sessions, &parties)
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn exhausted_budget_names_the_contested_session() {
        let sessions = vec![Session::new("s1", 2, 3, 4)];
        let parties: Vec<Party> = (1..=5).map(|i| Party::new(&format!("p{i}"), 1).prefer("s1", 5)).collect();
        let error = Allocator::new(config(20)).unwrap().allocate(&sessions, &parties).unwrap_err();

        match error {
            AllocationError::AllTrialsFailed { trials, oversubscription } => {
                assert_eq!(trials, 20);
                assert_eq!(oversubscription.sessions, vec!["s1".to_string()]);
                assert_eq!(oversubscription.demand, 5);
                assert_eq!(oversubscription.capacity, 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
