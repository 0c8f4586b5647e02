//! Several services on one database file, racing from separate threads.

use std::path::Path;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::Duration;
use stakevote_engine::{
    CollaboratorError, Collaborators, ErrorKind, GovernanceConfig, GovernanceError,
    GovernanceService, ProposalId, ProposalStatus, Role, RoleDirectory, UserId, VoteChoice, Weight,
};
use stakevote_store::{GovernanceStore, StoreOptions};

use crate::common::{Harness, draft, user};

const RACERS: usize = 8;

/// Run `op` once on each service, all released at the same instant.
fn race<T, F>(services: Vec<GovernanceService>, op: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &mut GovernanceService) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(services.len()));
    let op = Arc::new(op);
    let handles: Vec<_> = services
        .into_iter()
        .enumerate()
        .map(|(index, mut service)| {
            let barrier = Arc::clone(&barrier);
            let op = Arc::clone(&op);
            thread::spawn(move || {
                barrier.wait();
                op(index, &mut service)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

fn services(harness: &Harness, path: &Path, count: usize) -> Vec<GovernanceService> {
    (0..count).map(|_| harness.service_at(path)).collect()
}

fn setup() -> (tempfile::TempDir, Harness, ProposalId) {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let id = harness
        .service_at(&dir.path().join("governance.db"))
        .create_proposal(draft("A", 3_600))
        .unwrap()
        .id;
    (dir, harness, id)
}

#[test]
fn same_voter_racing_records_exactly_one_vote() {
    let (dir, harness, id) = setup();
    let path = dir.path().join("governance.db");

    let results = race(services(&harness, &path, RACERS), move |_, svc| {
        svc.cast_vote(id, &user("A"), VoteChoice::For)
    });

    let recorded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(recorded, 1);
    for result in &results {
        if let Err(err) = result {
            assert_eq!(err.kind(), ErrorKind::AlreadyVoted, "unexpected error: {err}");
        }
    }

    let mut svc = harness.service_at(&path);
    let proposal = svc.proposal(id).unwrap();
    assert_eq!(proposal.for_weight, Weight::new(60));
    assert_eq!(svc.votes(id).unwrap().len(), 1);
    assert!(svc.verify_tally(id).unwrap().is_consistent());
}

#[test]
fn distinct_voters_racing_all_count() {
    let (dir, harness, id) = setup();
    let path = dir.path().join("governance.db");
    let voters: Vec<String> = (0..RACERS).map(|i| format!("holder-{i}")).collect();
    for (weight, voter) in (10_u64..).zip(&voters) {
        harness.holdings.set(voter, weight);
    }

    let voters = Arc::new(voters);
    let shared = Arc::clone(&voters);
    let results = race(services(&harness, &path, RACERS), move |index, svc| {
        let choice = if index % 2 == 0 {
            VoteChoice::For
        } else {
            VoteChoice::Against
        };
        svc.cast_vote(id, &user(&shared[index]), choice)
    });
    assert!(results.iter().all(Result::is_ok));

    let svc = harness.service_at(&path);
    let report = svc.verify_tally(id).unwrap();
    assert!(report.is_consistent());
    // 10 + 12 + 14 + 16 for, 11 + 13 + 15 + 17 against
    assert_eq!(report.cached.for_weight, Weight::new(52));
    assert_eq!(report.cached.against_weight, Weight::new(56));
    assert_eq!(svc.votes(id).unwrap().len(), voters.len());
}

#[test]
fn concurrent_executions_succeed_exactly_once() {
    let (dir, harness, id) = setup();
    let path = dir.path().join("governance.db");
    {
        let mut svc = harness.service_at(&path);
        svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
        svc.cast_vote(id, &user("C"), VoteChoice::For).unwrap();
        harness.clock.advance(Duration::seconds(3_600));
        assert_eq!(svc.finalize(id).unwrap().proposal.status, ProposalStatus::Passed);
    }

    let results = race(services(&harness, &path, RACERS), move |_, svc| {
        svc.execute_proposal(id, &user("admin"))
    });

    let executed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(executed, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    GovernanceError::InvalidTransition {
                        from: ProposalStatus::Executed,
                        ..
                    }
                ),
                "unexpected error: {err}"
            );
        }
    }
    assert_eq!(harness.notifier.count("proposal_executed"), 1);
}

#[test]
fn concurrent_readers_resolve_and_announce_once() {
    let (dir, harness, id) = setup();
    let path = dir.path().join("governance.db");
    {
        let mut svc = harness.service_at(&path);
        svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
        svc.cast_vote(id, &user("B"), VoteChoice::Against).unwrap();
        svc.cast_vote(id, &user("C"), VoteChoice::Against).unwrap();
    }
    harness.clock.advance(Duration::seconds(3_600));

    let statuses = race(services(&harness, &path, RACERS), move |_, svc| {
        svc.proposal(id).unwrap().status
    });

    assert!(statuses.iter().all(|s| *s == ProposalStatus::Failed));
    assert_eq!(harness.notifier.count("proposal_resolved"), 1);
}

#[test]
fn cancel_racing_votes_keeps_ledger_and_cache_in_step() {
    let (dir, harness, id) = setup();
    let path = dir.path().join("governance.db");

    let results = race(services(&harness, &path, 4), move |index, svc| match index {
        0 => svc.cancel_proposal(id, &user("admin")).map(|_| ()),
        1 => svc.cast_vote(id, &user("A"), VoteChoice::For).map(|_| ()),
        2 => svc.cast_vote(id, &user("B"), VoteChoice::Against).map(|_| ()),
        _ => svc.cast_vote(id, &user("C"), VoteChoice::For).map(|_| ()),
    });

    assert!(results[0].is_ok(), "cancel failed: {:?}", results[0]);
    for result in &results[1..] {
        if let Err(err) = result {
            assert!(
                matches!(
                    err.kind(),
                    ErrorKind::VotingClosed | ErrorKind::ConcurrentModification
                ),
                "unexpected error: {err}"
            );
        }
    }

    let mut svc = harness.service_at(&path);
    assert_eq!(svc.proposal(id).unwrap().status, ProposalStatus::Cancelled);
    let report = svc.verify_tally(id).unwrap();
    assert!(report.is_consistent());
    let recorded = results[1..].iter().filter(|r| r.is_ok()).count();
    assert_eq!(svc.votes(id).unwrap().len(), recorded);
}

/// Casts the vote that completes turnout from another connection while the
/// canceller's role is being looked up.
struct CompletesTurnout {
    other: Mutex<GovernanceService>,
    proposal_id: ProposalId,
}

impl RoleDirectory for CompletesTurnout {
    fn role_of(&self, _user_id: &UserId) -> Result<Role, CollaboratorError> {
        let mut other = self.other.lock().unwrap();
        other
            .cast_vote(self.proposal_id, &user("E"), VoteChoice::For)
            .unwrap();
        Ok(Role::Administrator)
    }
}

#[test]
fn cancel_loses_to_a_vote_that_completes_turnout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("governance.db");
    let harness = Harness::new();
    harness.holdings.set("E", 70);

    // Records votes only; early resolution is off on this connection.
    let mut other = harness.service_at(&path);
    let id = other.create_proposal(draft("A", 3_600)).unwrap().id;
    other.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    other.cast_vote(id, &user("B"), VoteChoice::Against).unwrap();
    other.cast_vote(id, &user("C"), VoteChoice::For).unwrap();

    let mut config = GovernanceConfig::default();
    config.voting.early_resolution = true;
    let collaborators = Collaborators {
        roles: Arc::new(CompletesTurnout {
            other: Mutex::new(other),
            proposal_id: id,
        }),
        ..harness.collaborators()
    };
    let mut canceller = GovernanceService::new(
        GovernanceStore::open(&path, &StoreOptions::default()).unwrap(),
        collaborators,
        config,
    );

    let err = canceller.cancel_proposal(id, &user("admin")).unwrap_err();
    assert!(
        matches!(
            err,
            GovernanceError::InvalidTransition {
                from: ProposalStatus::Passed,
                to: ProposalStatus::Cancelled,
                ..
            }
        ),
        "unexpected error: {err}"
    );

    let proposal = canceller.proposal(id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Passed);
    assert_eq!(proposal.for_weight, Weight::new(170));
    assert!(proposal.cancelled_at.is_none());
    assert_eq!(harness.notifier.count("proposal_cancelled"), 0);
    assert_eq!(harness.notifier.count("proposal_resolved"), 1);
}
