use chrono::{DateTime, Utc};
use serde::Serialize;
use stakevote_types::{PropertyId, ProposalId, ProposalStatus, UserId, VoteChoice, Weight};

/// Facts published to the notification sink after they are durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    ProposalCreated {
        proposal_id: ProposalId,
        property_id: PropertyId,
        proposer_id: UserId,
        voting_ends_at: DateTime<Utc>,
        quorum_weight: Weight,
    },
    VoteCast {
        proposal_id: ProposalId,
        voter_id: UserId,
        choice: VoteChoice,
        weight: Weight,
    },
    ProposalResolved {
        proposal_id: ProposalId,
        property_id: PropertyId,
        status: ProposalStatus,
        for_weight: Weight,
        against_weight: Weight,
    },
    ProposalExecuted {
        proposal_id: ProposalId,
        executed_by: UserId,
        executed_at: DateTime<Utc>,
    },
    ProposalCancelled {
        proposal_id: ProposalId,
        cancelled_by: UserId,
        cancelled_at: DateTime<Utc>,
    },
}

impl GovernanceEvent {
    #[must_use]
    pub fn proposal_id(&self) -> ProposalId {
        match self {
            Self::ProposalCreated { proposal_id, .. }
            | Self::VoteCast { proposal_id, .. }
            | Self::ProposalResolved { proposal_id, .. }
            | Self::ProposalExecuted { proposal_id, .. }
            | Self::ProposalCancelled { proposal_id, .. } => *proposal_id,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "proposal_created",
            Self::VoteCast { .. } => "vote_cast",
            Self::ProposalResolved { .. } => "proposal_resolved",
            Self::ProposalExecuted { .. } => "proposal_executed",
            Self::ProposalCancelled { .. } => "proposal_cancelled",
        }
    }
}
