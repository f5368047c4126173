use table_allocator::allocation::engine::{run_trial, AllocationInput};
use table_allocator::allocation::types::Tier;
use table_allocator::config::{AllocatorConfig, UnplaceablePolicy};
use table_allocator::{AllocationError, Allocator, CompensationLedger, Party, Session};

fn config(n_trials: usize) -> AllocatorConfig {
    AllocatorConfig { n_trials, ..Default::default() }
}

fn five_solo_parties() -> Vec<Party> {
    (1..=5).map(|i| Party::new(&format!("p{i}"), 1).prefer("s1", 5)).collect()
}

#[test]
fn single_session_oversubscribed_fails_every_trial() {
    let sessions = vec![Session::new("s1", 2, 3, 4)];
    let error = Allocator::new(config(50))
        .unwrap()
        .allocate(&sessions, &five_solo_parties())
        .unwrap_err();

    let AllocationError::AllTrialsFailed { trials, oversubscription } = &error else {
        panic!("expected AllTrialsFailed, got {error:?}");
    };
    assert_eq!(*trials, 50);
    assert_eq!(oversubscription.demand, 5);
    assert_eq!(oversubscription.capacity, 4);
    assert!(error.to_string().contains("zero alternative sessions"));
}

#[test]
fn single_session_with_overflow_seats_the_surplus() {
    let sessions = vec![
        Session::new("s1", 2, 3, 4),
        Session::new("overflow", 0, 5, 10).as_overflow(),
    ];
    let allocation = Allocator::new(config(50))
        .unwrap()
        .allocate(&sessions, &five_solo_parties())
        .unwrap();

    assert_eq!(allocation.occupants("s1").len(), 4);
    assert_eq!(allocation.occupants("overflow").len(), 1);
    assert!(allocation.unassigned().is_empty());
}

#[test]
fn no_go_party_is_reported_unassigned_when_permitted() {
    let sessions = vec![Session::new("s1", 2, 3, 4)];
    let mut parties: Vec<Party> = five_solo_parties().into_iter().take(4).collect();
    parties.push(Party::new("p5", 1).prefer("s1", 0));
    let config = AllocatorConfig { unplaceable_policy: UnplaceablePolicy::Unassign, ..config(20) };
    let allocation = Allocator::new(config).unwrap().allocate(&sessions, &parties).unwrap();

    assert_eq!(allocation.assignments.len(), 5);
    assert_eq!(allocation.unassigned(), vec![&"p5".to_string()]);
    assert_eq!(allocation.occupants("s1").len(), 4);
}

#[test]
fn token_holder_is_never_bumped_by_a_plain_party() {
    let sessions = vec![Session::new("s1", 1, 2, 2), Session::new("s2", 1, 2, 2)];
    let parties = vec![
        Party::new("x", 2).prefer("s1", 5).prefer("s2", 0).with_golden_die(),
        Party::new("y", 2).prefer("s1", 5).prefer("s2", 4),
    ];
    let input_config = config(1);
    let input = AllocationInput::new(&sessions, &parties, &input_config).unwrap();

    for seed in 0..50 {
        let allocation = run_trial(&input, 0, seed).unwrap();
        assert_eq!(allocation.session_of("x"), Some(&"s1".to_string()));
        assert_eq!(allocation.session_of("y"), Some(&"s2".to_string()));
        assert_eq!(allocation.assignments[1].tier, Some(Tier::plain(1)));
        assert!(allocation.displacements.is_empty());
    }
}

#[test]
fn token_holder_wins_a_contested_top_choice() {
    let sessions = vec![Session::new("s1", 1, 1, 1), Session::new("s2", 1, 1, 1)];
    let parties = vec![
        Party::new("plain", 1).prefer("s1", 5).prefer("s2", 3),
        Party::new("token", 1).prefer("s1", 5).prefer("s2", 3).with_golden_die(),
    ];
    let input_config = config(1);
    let input = AllocationInput::new(&sessions, &parties, &input_config).unwrap();

    for seed in 0..50 {
        let allocation = run_trial(&input, 0, seed).unwrap();
        assert_eq!(allocation.session_of("token"), Some(&"s1".to_string()));
        assert_eq!(allocation.tokens_spent, vec!["token".to_string()]);
    }
}

#[test]
fn debt_from_a_poor_placement_is_cleared_by_a_good_one() {
    let sessions = vec![
        Session::new("a", 1, 3, 3),
        Session::new("b", 1, 3, 3),
        Session::new("c", 1, 3, 3),
    ];
    let party = Party::new("p", 3).prefer("a", 5).prefer("b", 4).prefer("c", 3);
    let mut ledger = CompensationLedger::default();

    let first = Allocator::new(config(5)).unwrap().allocate(&sessions, &[party.clone()]).unwrap();
    assert_eq!(first.assignments[0].tier, Some(Tier::plain(0)));

    // Force a tier 2 placement by filling a and b
    let blockers = vec![
        Party::new("q", 3).prefer("a", 5).prefer("b", 0).prefer("c", 0).with_golden_die(),
        Party::new("r", 3).prefer("a", 0).prefer("b", 5).prefer("c", 0).with_golden_die(),
    ];
    let mut parties = vec![party.clone()];
    parties.extend(blockers);
    let crowded = Allocator::new(config(5)).unwrap().allocate(&sessions, &parties).unwrap();
    assert_eq!(crowded.session_of("p"), Some(&"c".to_string()));

    let delta = ledger.update(&crowded, &sessions, &parties);
    assert_eq!(delta.players["p"], 6);
    assert_eq!(ledger.players["p"], 6);

    let delta = ledger.update(&first, &sessions, &[party]);
    assert_eq!(delta.players["p"], -6);
    assert_eq!(ledger.players["p"], 0);
}

#[test]
fn same_seed_base_gives_identical_results() {
    let scenario = table_allocator::mock::MockScenario::generate(12, 40, 9);
    let config = AllocatorConfig {
        n_trials: 30,
        unplaceable_policy: UnplaceablePolicy::Unassign,
        ..Default::default()
    };
    let a = Allocator::new(config.clone()).unwrap().allocate(&scenario.sessions, &scenario.parties);
    let b = Allocator::new(config).unwrap().allocate(&scenario.sessions, &scenario.parties);

    assert_eq!(a, b);
}
