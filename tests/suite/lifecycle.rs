//! Proposal lifecycle rules across the service API.

use std::sync::Arc;

use chrono::Duration;
use stakevote_engine::{
    BasisPoints, Collaborators, ErrorKind, GovernanceConfig, GovernanceError, GovernanceEvent,
    GovernanceService, PropertyId, ProposalFilter, ProposalStatus, TallyTotals, VoteChoice,
    Weight,
};
use stakevote_store::GovernanceStore;

use crate::common::{FailingNotifier, Harness, Holdings, PROPERTY, at, draft, user};

#[test]
fn vote_weight_is_not_recomputed_after_holdings_change() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    harness.holdings.set("A", 5);
    harness.holdings.set("B", 45);
    svc.cast_vote(id, &user("B"), VoteChoice::Against).unwrap();

    let votes = svc.votes(id).unwrap();
    assert_eq!(votes[0].weight, Weight::new(60));
    assert_eq!(votes[1].weight, Weight::new(45));
    assert_eq!(
        svc.recompute_from_ledger(id).unwrap(),
        TallyTotals::new(Weight::new(60), Weight::new(45))
    );
}

#[test]
fn vote_at_the_deadline_is_closed() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 60)).unwrap().id;

    harness.clock.set(at(59));
    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();

    harness.clock.set(at(60));
    let err = svc.cast_vote(id, &user("C"), VoteChoice::For).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::VotingClosed {
            status: ProposalStatus::Failed,
            ..
        }
    ));
}

#[test]
fn terminal_proposals_refuse_every_change() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 60)).unwrap().id;
    svc.cast_vote(id, &user("B"), VoteChoice::For).unwrap();

    harness.clock.advance(Duration::seconds(60));
    let failed = svc.proposal(id).unwrap();
    assert_eq!(failed.status, ProposalStatus::Failed);

    for err in [
        svc.execute_proposal(id, &user("admin")).unwrap_err(),
        svc.cancel_proposal(id, &user("admin")).unwrap_err(),
        svc.repair_tally(id).unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }
    assert_eq!(
        svc.cast_vote(id, &user("C"), VoteChoice::For)
            .unwrap_err()
            .kind(),
        ErrorKind::VotingClosed
    );

    harness.clock.advance(Duration::seconds(600));
    assert_eq!(svc.proposal(id).unwrap(), failed);
    assert_eq!(harness.notifier.count("proposal_resolved"), 1);
}

#[test]
fn cancellation_by_proposer_or_administrators_only() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let by_proposer = svc.create_proposal(draft("A", 3_600)).unwrap().id;
    let by_ops = svc.create_proposal(draft("A", 3_600)).unwrap().id;
    let refused = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    svc.cancel_proposal(by_proposer, &user("A")).unwrap();
    let cancelled = svc.cancel_proposal(by_ops, &user("ops")).unwrap();
    assert_eq!(cancelled.cancelled_by, Some(user("ops")));
    assert_eq!(cancelled.cancelled_at, Some(at(0)));

    let err = svc.cancel_proposal(refused, &user("B")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let cancelled = svc
        .list_proposals(&ProposalFilter::default().with_status(ProposalStatus::Cancelled))
        .unwrap();
    assert_eq!(cancelled.len(), 2);
    assert_eq!(harness.notifier.count("proposal_cancelled"), 2);
}

#[test]
fn property_quorum_override_is_frozen_at_creation() {
    let mut config = GovernanceConfig::default();
    config
        .quorum
        .properties
        .insert(PROPERTY.to_string(), BasisPoints::new(6_667).unwrap());
    let harness = Harness::with_config(config);
    let mut svc = harness.service();

    let proposal = svc.create_proposal(draft("A", 3_600)).unwrap();
    // ceil(200 * 0.6667) = 134
    assert_eq!(proposal.quorum_weight, Weight::new(134));

    svc.cast_vote(proposal.id, &user("A"), VoteChoice::For).unwrap();
    svc.cast_vote(proposal.id, &user("C"), VoteChoice::For).unwrap();
    harness.clock.advance(Duration::seconds(3_600));

    let err = svc.finalize(proposal.id).unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::QuorumNotMet { required, .. } if required == Weight::new(134)
    ));
}

#[test]
fn window_bounds_come_from_config() {
    let mut config = GovernanceConfig::default();
    config.voting.min_window_secs = 3_600;
    config.voting.max_window_secs = 7_200;
    let harness = Harness::with_config(config);
    let mut svc = harness.service();

    for window in [60, 7_201] {
        assert_eq!(
            svc.create_proposal(draft("A", window)).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
    svc.create_proposal(draft("A", 3_600)).unwrap();
    svc.create_proposal(draft("A", 7_200)).unwrap();
}

#[test]
fn list_filters_by_property() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let here = svc.create_proposal(draft("A", 3_600)).unwrap().id;
    let mut elsewhere = draft("A", 3_600);
    elsewhere.property_id = PropertyId::new("prop-2");
    svc.create_proposal(elsewhere).unwrap();

    let listed = svc
        .list_proposals(&ProposalFilter::property(PropertyId::new(PROPERTY)))
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, here);
}

#[test]
fn failed_notifications_do_not_undo_transitions() {
    let harness = Harness::new();
    let collaborators = Collaborators {
        notifier: Arc::new(FailingNotifier),
        ..harness.collaborators()
    };
    let mut svc = GovernanceService::new(
        GovernanceStore::open_in_memory().unwrap(),
        collaborators,
        GovernanceConfig::default(),
    );

    let id = svc.create_proposal(draft("A", 60)).unwrap().id;
    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    svc.cast_vote(id, &user("C"), VoteChoice::For).unwrap();
    harness.clock.advance(Duration::seconds(60));

    assert_eq!(svc.sweep().unwrap(), vec![(id, ProposalStatus::Passed)]);
    let executed = svc.execute_proposal(id, &user("A")).unwrap();
    assert_eq!(executed.status, ProposalStatus::Executed);
}

#[test]
fn events_follow_the_lifecycle_in_order() {
    let harness = Harness::new();
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 60)).unwrap().id;
    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    svc.cast_vote(id, &user("C"), VoteChoice::For).unwrap();
    harness.clock.advance(Duration::seconds(60));
    svc.execute_proposal(id, &user("admin")).unwrap();

    let names: Vec<_> = harness
        .notifier
        .events()
        .iter()
        .map(GovernanceEvent::name)
        .collect();
    assert_eq!(
        names,
        vec![
            "proposal_created",
            "vote_cast",
            "vote_cast",
            "proposal_resolved",
            "proposal_executed",
        ]
    );
    assert!(
        harness
            .notifier
            .events()
            .iter()
            .all(|event| event.proposal_id() == id)
    );
}

#[test]
fn state_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("governance.db");
    let harness = Harness::new();

    let id = {
        let mut svc = harness.service_at(&path);
        let id = svc.create_proposal(draft("A", 60)).unwrap().id;
        svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
        id
    };

    let mut reopened = harness.service_at(&path);
    assert_eq!(
        reopened.vote_of(id, &user("A")).unwrap().map(|v| v.weight),
        Some(Weight::new(60))
    );
    let err = reopened
        .cast_vote(id, &user("A"), VoteChoice::Against)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyVoted);
    assert!(reopened.verify_tally(id).unwrap().is_consistent());
}

#[test]
fn tally_stays_readable_at_the_storage_limit() {
    let max = Weight::MAX_STORABLE.units();
    let harness = Harness {
        holdings: Arc::new(Holdings::new(max, &[("A", max), ("B", 1), ("C", 1)])),
        ..Harness::new()
    };
    let mut svc = harness.service();
    let id = svc.create_proposal(draft("A", 3_600)).unwrap().id;

    svc.cast_vote(id, &user("A"), VoteChoice::For).unwrap();
    let err = svc.cast_vote(id, &user("B"), VoteChoice::For).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(svc.vote_of(id, &user("B")).unwrap().is_none());
    svc.cast_vote(id, &user("C"), VoteChoice::Against).unwrap();

    let proposal = svc.proposal(id).unwrap();
    assert_eq!(proposal.status, ProposalStatus::Active);
    assert_eq!(proposal.for_weight, Weight::MAX_STORABLE);
    assert_eq!(proposal.against_weight, Weight::new(1));
    assert!(svc.verify_tally(id).unwrap().is_consistent());
    assert_eq!(harness.notifier.count("vote_cast"), 2);
}
