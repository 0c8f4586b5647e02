//! Resolution Evaluator.
//!
//! The outcome is a pure function of the cached tally and the quorum fixed at
//! creation, so it can be re-derived at any time. Only the caller that wins the
//! `status = 'active'` conditional write persists it and announces it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stakevote_store::ResolveOutcome;
use stakevote_types::{Proposal, ProposalId, ProposalStatus, TallyTotals, Weight};

use crate::error::GovernanceError;
use crate::events::GovernanceEvent;
use crate::service::GovernanceService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Passed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    QuorumNotMet { required: Weight, achieved: Weight },
    /// Quorum was met but `for` did not strictly exceed `against`.
    NoMajority {
        for_weight: Weight,
        against_weight: Weight,
    },
}

impl Decision {
    #[must_use]
    pub const fn status(self) -> ProposalStatus {
        match self {
            Self::Passed => ProposalStatus::Passed,
            Self::Failed(_) => ProposalStatus::Failed,
        }
    }
}

/// Outcome of an explicit [`GovernanceService::finalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub proposal: Proposal,
    pub decision: Decision,
}

/// Quorum first, then a strict majority; a tie fails.
#[must_use]
pub fn decide(tally: TallyTotals, quorum_weight: Weight) -> Decision {
    let cast = tally.cast();
    if cast < quorum_weight {
        return Decision::Failed(FailureReason::QuorumNotMet {
            required: quorum_weight,
            achieved: cast,
        });
    }
    if tally.for_weight > tally.against_weight {
        Decision::Passed
    } else {
        Decision::Failed(FailureReason::NoMajority {
            for_weight: tally.for_weight,
            against_weight: tally.against_weight,
        })
    }
}

/// Voting has closed at `now`: the window elapsed, or (with early resolution)
/// every eligible unit has been cast.
#[must_use]
pub fn is_closed(proposal: &Proposal, now: DateTime<Utc>, early_resolution: bool) -> bool {
    proposal.window_elapsed(now) || (early_resolution && proposal.fully_voted())
}

impl GovernanceService {
    /// Load a proposal, resolving it first if voting has closed.
    pub(crate) fn evaluate(
        &mut self,
        proposal_id: ProposalId,
        now: DateTime<Utc>,
    ) -> Result<Proposal, GovernanceError> {
        let proposal = self
            .store
            .proposal(proposal_id)?
            .ok_or(GovernanceError::NotFound(proposal_id))?;
        let early = self.config.voting.early_resolution;
        if proposal.status != ProposalStatus::Active || !is_closed(&proposal, now, early) {
            return Ok(proposal);
        }

        let outcome = self.store.resolve_if_active(proposal_id, now, |current| {
            is_closed(current, now, early)
                .then(|| decide(current.tally(), current.quorum_weight).status())
        })?;

        match outcome {
            ResolveOutcome::Resolved(proposal) => {
                self.notify(GovernanceEvent::ProposalResolved {
                    proposal_id: proposal.id,
                    property_id: proposal.property_id.clone(),
                    status: proposal.status,
                    for_weight: proposal.for_weight,
                    against_weight: proposal.against_weight,
                });
                Ok(proposal)
            }
            ResolveOutcome::Settled(proposal) => {
                tracing::debug!(
                    %proposal_id,
                    status = %proposal.status,
                    "Already resolved by another writer"
                );
                Ok(proposal)
            }
            ResolveOutcome::Open(proposal) => Ok(proposal),
            ResolveOutcome::Missing => Err(GovernanceError::NotFound(proposal_id)),
        }
    }

    /// Resolve a proposal whose voting has closed and report the decision.
    ///
    /// A quorum failure is persisted as Failed and then reported as
    /// [`GovernanceError::QuorumNotMet`].
    pub fn finalize(&mut self, proposal_id: ProposalId) -> Result<Resolution, GovernanceError> {
        let now = self.now();
        let proposal = self.evaluate(proposal_id, now)?;
        let decision = decide(proposal.tally(), proposal.quorum_weight);

        match proposal.status {
            ProposalStatus::Active => Err(GovernanceError::VotingOpen {
                proposal_id,
                ends_at: proposal.voting_ends_at,
            }),
            ProposalStatus::Cancelled => Err(GovernanceError::InvalidTransition {
                proposal_id,
                from: ProposalStatus::Cancelled,
                to: decision.status(),
            }),
            ProposalStatus::Passed | ProposalStatus::Failed | ProposalStatus::Executed => {
                match decision {
                    Decision::Failed(FailureReason::QuorumNotMet { required, achieved }) => {
                        Err(GovernanceError::QuorumNotMet {
                            proposal_id,
                            required,
                            achieved,
                        })
                    }
                    decision => Ok(Resolution { proposal, decision }),
                }
            }
        }
    }

    /// Resolve every Active proposal whose window has elapsed.
    pub fn sweep(&mut self) -> Result<Vec<(ProposalId, ProposalStatus)>, GovernanceError> {
        let now = self.now();
        let due = self.store.due_active(now)?;
        let mut resolved = Vec::with_capacity(due.len());
        for proposal_id in due {
            let proposal = self.evaluate(proposal_id, now)?;
            resolved.push((proposal_id, proposal.status));
        }
        if !resolved.is_empty() {
            tracing::info!(count = resolved.len(), "Sweep resolved proposals");
        }
        Ok(resolved)
    }
}
