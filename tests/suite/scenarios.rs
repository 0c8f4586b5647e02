//! End-to-end governance scenarios on a 200-weight property with quorum 100.

use chrono::Duration;
use stakevote_engine::{
    Decision, ErrorKind, GovernanceError, ProposalStatus, VoteChoice, Weight,
};

use crate::common::{Harness, at, draft, user};

#[test]
fn minority_turnout_fails_when_window_closes() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;
    assert_eq!(svc.proposal(id).unwrap().quorum_weight, Weight::new(100));

    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    svc.cast_vote(id, &user("B"), VoteChoice::Against).unwrap();

    harness.clock.advance(Duration::seconds(3_600));
    let proposal = svc.proposal(id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Failed);
    assert_eq!(proposal.for_weight, Weight::new(60));
    assert_eq!(proposal.against_weight, Weight::new(30));

    let err = svc.finalize(id).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::QuorumNotMet { required, achieved, .. }
            if required == Weight::new(100) && achieved == Weight::new(90)
    ));
}

#[test]
fn quorum_and_majority_pass_then_execute_exactly_once() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    svc.cast_vote(id, &user("B"), VoteChoice::Against).unwrap();
    svc.cast_vote(id, &user("C"), VoteChoice::For).unwrap();

    harness.clock.advance(Duration::seconds(3_600));
    let resolution = svc.finalize(id).unwrap();
    assert_eq!(resolution.decision, Decision::Passed);
    assert_eq!(resolution.proposal.for_weight, Weight::new(100));
    assert_eq!(resolution.proposal.against_weight, Weight::new(30));

    let executed = svc.execute_proposal(id, &user("admin")).unwrap();
    assert_eq!(executed.status, ProposalStatus::Executed);
    assert_eq!(executed.executed_by, Some(user("admin")));

    let second = svc.execute_proposal(id, &user("admin")).unwrap_err();
    assert_eq!(second.kind(), ErrorKind::InvalidTransition);
    assert_eq!(harness.notifier.count("proposal_executed"), 1);
}

#[test]
fn second_vote_by_same_voter_is_rejected() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    let err = svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyVoted);

    assert_eq!(svc.proposal(id).unwrap().for_weight, Weight::new(60));
    assert_eq!(svc.votes(id).unwrap().len(), 1);
}

#[test]
fn elapsed_window_is_resolved_lazily_on_read() {
    let harness = Harness::new();
    let mut svc = harness.service();

    let zero = svc.create_proposal(draft("A", 0)).unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::InvalidInput);

    let id = svc.create_proposal(draft("A", 60)).unwrap().id;
    harness.clock.advance(Duration::seconds(61));

    let view = svc.get_proposal(id, &user("B")).unwrap();
    assert_eq!(view.proposal.status, ProposalStatus::Failed);
    assert_eq!(view.proposal.resolved_at, Some(at(61)));
    assert!(!view.has_voted);
    assert_eq!(harness.notifier.count("proposal_resolved"), 1);
}

#[test]
fn weightless_voter_is_unauthorized_and_leaves_no_vote() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    let err = svc.cast_vote(id, &user("D"), VoteChoice::For).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(svc.vote_of(id, &user("D")).unwrap().is_none());
    assert!(svc.votes(id).unwrap().is_empty());
    assert_eq!(harness.notifier.count("vote_cast"), 0);
}
