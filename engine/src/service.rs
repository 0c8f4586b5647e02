//! The exposed governance API.
//!
//! A [`GovernanceService`] owns one store connection. Several services may
//! share a database file; they coordinate only through the store's
//! conditional writes. Collaborators are consulted before a write
//! transaction opens and notified after it commits.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stakevote_store::{
    CastOutcome, GovernanceStore, NewProposal, NewVote, RepairOutcome, TallyReport,
};
use stakevote_types::{
    NonEmptyString, PropertyId, Proposal, ProposalFilter, ProposalId, ProposalStatus, TallyTotals,
    UserId, Vote, VoteChoice, Weight,
};

use crate::clock::Clock;
use crate::collaborators::{
    CollaboratorError, NotificationSink, RoleDirectory, WeightProvider, storable,
};
use crate::config::GovernanceConfig;
use crate::error::GovernanceError;
use crate::events::GovernanceEvent;
use crate::resolution::is_closed;

/// External services a [`GovernanceService`] depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub weights: Arc<dyn WeightProvider>,
    pub roles: Arc<dyn RoleDirectory>,
    pub notifier: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

/// Caller input for [`GovernanceService::create_proposal`].
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub property_id: PropertyId,
    pub proposer_id: UserId,
    pub title: String,
    pub description: String,
    pub voting_window: Duration,
}

/// A proposal as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalView {
    pub proposal: Proposal,
    pub has_voted: bool,
    /// Weight recorded with the viewer's vote, if any.
    pub user_vote_weight: Option<Weight>,
}

pub struct GovernanceService {
    pub(crate) store: GovernanceStore,
    pub(crate) weights: Arc<dyn WeightProvider>,
    pub(crate) roles: Arc<dyn RoleDirectory>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    pub(crate) config: GovernanceConfig,
}

impl GovernanceService {
    pub fn new(
        store: GovernanceStore,
        collaborators: Collaborators,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            store,
            weights: collaborators.weights,
            roles: collaborators.roles,
            notifier: collaborators.notifier,
            clock: collaborators.clock,
            config,
        }
    }

    /// Open the database at `path` with the config's storage settings.
    pub fn open(
        path: &Path,
        collaborators: Collaborators,
        config: GovernanceConfig,
    ) -> Result<Self, GovernanceError> {
        let store = GovernanceStore::open(path, &config.store_options())?;
        Ok(Self::new(store, collaborators, config))
    }

    #[must_use]
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Deliver a committed event; failures are logged, never propagated.
    pub(crate) fn notify(&self, event: GovernanceEvent) {
        if let Err(err) = self.notifier.dispatch(&event) {
            tracing::warn!(
                event = event.name(),
                proposal_id = %event.proposal_id(),
                error = %err,
                "Notification dispatch failed"
            );
        }
    }

    pub fn create_proposal(&mut self, draft: ProposalDraft) -> Result<Proposal, GovernanceError> {
        let title = NonEmptyString::new(draft.title)
            .map_err(|_| GovernanceError::InvalidInput("title must not be blank".to_string()))?;
        self.check_window(draft.voting_window)?;

        let now = self.now();
        let window = chrono::Duration::from_std(draft.voting_window)
            .map_err(|_| GovernanceError::InvalidInput("voting window is too long".to_string()))?;
        let voting_ends_at = now.checked_add_signed(window).ok_or_else(|| {
            GovernanceError::InvalidInput("voting window ends out of range".to_string())
        })?;

        let proposer_weight =
            storable(self.weights.weight_of(&draft.property_id, &draft.proposer_id, now)?)?;
        if proposer_weight.is_zero() {
            tracing::debug!(
                property_id = %draft.property_id,
                proposer_id = %draft.proposer_id,
                "Proposer holds no weight"
            );
            return Err(GovernanceError::Unauthorized {
                user_id: draft.proposer_id,
                action: "create a proposal",
            });
        }
        let total = storable(self.weights.total_eligible_weight(&draft.property_id, now)?)?;
        if total < proposer_weight {
            return Err(CollaboratorError::invalid(
                "weight provider",
                format!(
                    "total eligible weight {total} is below the proposer's weight {proposer_weight}"
                ),
            )
            .into());
        }

        let bps = self.config.quorum_bps_for(&draft.property_id);
        let proposal = self.store.insert_proposal(&NewProposal {
            property_id: draft.property_id,
            proposer_id: draft.proposer_id,
            title,
            description: draft.description,
            created_at: now,
            voting_ends_at,
            total_eligible_weight: total,
            quorum_weight: total.fraction_ceil(bps),
        })?;

        self.notify(GovernanceEvent::ProposalCreated {
            proposal_id: proposal.id,
            property_id: proposal.property_id.clone(),
            proposer_id: proposal.proposer_id.clone(),
            voting_ends_at: proposal.voting_ends_at,
            quorum_weight: proposal.quorum_weight,
        });
        Ok(proposal)
    }

    fn check_window(&self, window: Duration) -> Result<(), GovernanceError> {
        let voting = &self.config.voting;
        if window.is_zero() {
            return Err(GovernanceError::InvalidInput(
                "voting window must be greater than zero".to_string(),
            ));
        }
        if window < voting.min_window() || window > voting.max_window() {
            return Err(GovernanceError::InvalidInput(format!(
                "voting window of {}s is outside {}s..={}s",
                window.as_secs(),
                voting.min_window_secs,
                voting.max_window_secs
            )));
        }
        Ok(())
    }

    pub fn cast_vote(
        &mut self,
        proposal_id: ProposalId,
        voter_id: &UserId,
        choice: VoteChoice,
    ) -> Result<Vote, GovernanceError> {
        let now = self.now();
        let proposal = self.evaluate(proposal_id, now)?;
        if proposal.status != ProposalStatus::Active || proposal.window_elapsed(now) {
            return Err(GovernanceError::VotingClosed {
                proposal_id,
                status: proposal.status,
            });
        }

        let weight = storable(self.weights.weight_of(&proposal.property_id, voter_id, now)?)?;
        if weight.is_zero() {
            return Err(GovernanceError::Unauthorized {
                user_id: voter_id.clone(),
                action: "vote on this proposal",
            });
        }

        let outcome = self.store.record_vote(&NewVote {
            proposal_id,
            voter_id: voter_id.clone(),
            choice,
            weight,
            cast_at: now,
        })?;
        let vote = match outcome {
            CastOutcome::Recorded(vote) => vote,
            CastOutcome::Duplicate => {
                return Err(GovernanceError::AlreadyVoted {
                    proposal_id,
                    voter_id: voter_id.clone(),
                });
            }
            CastOutcome::Missing => return Err(GovernanceError::NotFound(proposal_id)),
            CastOutcome::Closed {
                status: ProposalStatus::Active,
                ..
            } => {
                return Err(GovernanceError::VotingClosed {
                    proposal_id,
                    status: ProposalStatus::Active,
                });
            }
            // Left Active between the read above and the write.
            CastOutcome::Closed { .. } => {
                return Err(GovernanceError::ConcurrentModification(proposal_id));
            }
        };

        self.notify(GovernanceEvent::VoteCast {
            proposal_id,
            voter_id: vote.voter_id.clone(),
            choice: vote.choice,
            weight: vote.weight,
        });

        // The vote is durable; a failed early-resolution attempt is retried by
        // the next read.
        if let Err(err) = self.evaluate(proposal_id, now) {
            tracing::warn!(%proposal_id, error = %err, "Resolution after vote failed");
        }
        Ok(vote)
    }

    /// Lazily resolved proposal.
    pub fn proposal(&mut self, proposal_id: ProposalId) -> Result<Proposal, GovernanceError> {
        let now = self.now();
        self.evaluate(proposal_id, now)
    }

    pub fn get_proposal(
        &mut self,
        proposal_id: ProposalId,
        viewer_id: &UserId,
    ) -> Result<ProposalView, GovernanceError> {
        let proposal = self.proposal(proposal_id)?;
        let vote = self.store.vote_of(proposal_id, viewer_id)?;
        Ok(ProposalView {
            proposal,
            has_voted: vote.is_some(),
            user_vote_weight: vote.map(|v| v.weight),
        })
    }

    /// Proposals matching `filter` by their status after lazy resolution.
    pub fn list_proposals(
        &mut self,
        filter: &ProposalFilter,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        let now = self.now();
        let early = self.config.voting.early_resolution;
        let candidates = self.store.list_proposals(&ProposalFilter {
            property_id: filter.property_id.clone(),
            status: None,
        })?;

        let mut proposals = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let current = if candidate.status == ProposalStatus::Active
                && is_closed(&candidate, now, early)
            {
                self.evaluate(candidate.id, now)?
            } else {
                candidate
            };
            if filter.matches(&current) {
                proposals.push(current);
            }
        }
        Ok(proposals)
    }

    pub fn votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, GovernanceError> {
        self.require_exists(proposal_id)?;
        Ok(self.store.votes(proposal_id)?)
    }

    pub fn vote_of(
        &self,
        proposal_id: ProposalId,
        voter_id: &UserId,
    ) -> Result<Option<Vote>, GovernanceError> {
        self.require_exists(proposal_id)?;
        Ok(self.store.vote_of(proposal_id, voter_id)?)
    }

    pub fn recompute_from_ledger(
        &self,
        proposal_id: ProposalId,
    ) -> Result<TallyTotals, GovernanceError> {
        self.store
            .recompute_from_ledger(proposal_id)?
            .ok_or(GovernanceError::NotFound(proposal_id))
    }

    pub fn verify_tally(&self, proposal_id: ProposalId) -> Result<TallyReport, GovernanceError> {
        self.store
            .verify_tally(proposal_id)?
            .ok_or(GovernanceError::NotFound(proposal_id))
    }

    /// Rebuild the cached totals from the ledger; only while Active.
    pub fn repair_tally(&mut self, proposal_id: ProposalId) -> Result<TallyReport, GovernanceError> {
        match self.store.repair_tally(proposal_id)? {
            RepairOutcome::Repaired(report) => Ok(report),
            RepairOutcome::Missing => Err(GovernanceError::NotFound(proposal_id)),
            RepairOutcome::Frozen(status) => Err(GovernanceError::InvalidTransition {
                proposal_id,
                from: status,
                to: ProposalStatus::Active,
            }),
        }
    }

    fn require_exists(&self, proposal_id: ProposalId) -> Result<(), GovernanceError> {
        match self.store.proposal(proposal_id)? {
            Some(_) => Ok(()),
            None => Err(GovernanceError::NotFound(proposal_id)),
        }
    }
}
