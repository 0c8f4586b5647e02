//! Execution Gate: exactly-once execution and cancellation.

use stakevote_store::TransitionOutcome;
use stakevote_types::{Proposal, ProposalId, ProposalStatus, Role, UserId};

use crate::error::GovernanceError;
use crate::events::GovernanceEvent;
use crate::service::GovernanceService;

impl GovernanceService {
    /// Passed -> Executed. Of N concurrent callers exactly one succeeds; the
    /// rest see `InvalidTransition` from Executed.
    pub fn execute_proposal(
        &mut self,
        proposal_id: ProposalId,
        actor_id: &UserId,
    ) -> Result<Proposal, GovernanceError> {
        let now = self.now();
        let proposal = self.evaluate(proposal_id, now)?;
        if !proposal.status.can_transition_to(ProposalStatus::Executed) {
            return Err(GovernanceError::InvalidTransition {
                proposal_id,
                from: proposal.status,
                to: ProposalStatus::Executed,
            });
        }
        let role = self.authorize(&proposal, actor_id, "execute this proposal")?;

        match self.store.execute_if_passed(proposal_id, actor_id, now)? {
            TransitionOutcome::Applied(executed) => {
                tracing::info!(
                    %proposal_id,
                    actor_id = %actor_id,
                    role = role.as_str(),
                    "Proposal executed"
                );
                self.notify(GovernanceEvent::ProposalExecuted {
                    proposal_id,
                    executed_by: actor_id.clone(),
                    executed_at: now,
                });
                Ok(executed)
            }
            TransitionOutcome::Rejected(current) => Err(GovernanceError::InvalidTransition {
                proposal_id,
                from: current.status,
                to: ProposalStatus::Executed,
            }),
            TransitionOutcome::Missing => Err(GovernanceError::NotFound(proposal_id)),
        }
    }

    /// Active -> Cancelled, only while the voting window is open.
    pub fn cancel_proposal(
        &mut self,
        proposal_id: ProposalId,
        actor_id: &UserId,
    ) -> Result<Proposal, GovernanceError> {
        let now = self.now();
        // A closed window is resolved here, so it reports Passed/Failed below.
        let proposal = self.evaluate(proposal_id, now)?;
        if !proposal.status.can_transition_to(ProposalStatus::Cancelled) {
            return Err(GovernanceError::InvalidTransition {
                proposal_id,
                from: proposal.status,
                to: ProposalStatus::Cancelled,
            });
        }
        let role = self.authorize(&proposal, actor_id, "cancel this proposal")?;

        let early = self.config.voting.early_resolution;
        match self.store.cancel_if_open(proposal_id, actor_id, now, early)? {
            TransitionOutcome::Applied(cancelled) => {
                tracing::info!(
                    %proposal_id,
                    actor_id = %actor_id,
                    role = role.as_str(),
                    "Proposal cancelled"
                );
                self.notify(GovernanceEvent::ProposalCancelled {
                    proposal_id,
                    cancelled_by: actor_id.clone(),
                    cancelled_at: now,
                });
                Ok(cancelled)
            }
            TransitionOutcome::Rejected(current) => {
                // Still Active means voting closed under us; resolve it now.
                let current = if current.status == ProposalStatus::Active {
                    self.evaluate(proposal_id, now)?
                } else {
                    current
                };
                Err(GovernanceError::InvalidTransition {
                    proposal_id,
                    from: current.status,
                    to: ProposalStatus::Cancelled,
                })
            }
            TransitionOutcome::Missing => Err(GovernanceError::NotFound(proposal_id)),
        }
    }

    /// The proposer, or an administrative role from the directory.
    fn authorize(
        &self,
        proposal: &Proposal,
        actor_id: &UserId,
        action: &'static str,
    ) -> Result<Role, GovernanceError> {
        let role = if *actor_id == proposal.proposer_id {
            Role::Proposer
        } else {
            self.roles.role_of(actor_id)?
        };
        if role.may_manage() {
            return Ok(role);
        }
        tracing::debug!(
            proposal_id = %proposal.id,
            actor_id = %actor_id,
            role = role.as_str(),
            "Actor may not manage proposal"
        );
        Err(GovernanceError::Unauthorized {
            user_id: actor_id.clone(),
            action,
        })
    }
}
