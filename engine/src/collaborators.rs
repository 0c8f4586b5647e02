//! Seams to the services the governance core consumes but does not own.

use chrono::{DateTime, Utc};
use stakevote_types::{PropertyId, Role, UserId, Weight};
use thiserror::Error;

use crate::events::GovernanceEvent;

/// Failure reported by (or about) an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    /// The collaborator answered, but the answer violates its contract.
    #[error("{service} returned an invalid answer: {message}")]
    Invalid {
        service: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn invalid(service: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            service,
            message: message.into(),
        }
    }
}

/// Authoritative ownership weights.
///
/// Answers are used once and never cached.
pub trait WeightProvider: Send + Sync {
    fn weight_of(
        &self,
        property_id: &PropertyId,
        user_id: &UserId,
        as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError>;

    fn total_eligible_weight(
        &self,
        property_id: &PropertyId,
        as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError>;
}

pub trait RoleDirectory: Send + Sync {
    fn role_of(&self, user_id: &UserId) -> Result<Role, CollaboratorError>;
}

/// Fire-and-forget delivery of committed events.
pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, event: &GovernanceEvent) -> Result<(), CollaboratorError>;
}

/// Writes every event to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn dispatch(&self, event: &GovernanceEvent) -> Result<(), CollaboratorError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| CollaboratorError::invalid("notifier", e.to_string()))?;
        tracing::info!(
            event = event.name(),
            proposal_id = %event.proposal_id(),
            payload = %payload,
            "Governance event"
        );
        Ok(())
    }
}

/// Weight answers above what the ledger can persist are collaborator faults.
pub(crate) fn storable(weight: Weight) -> Result<Weight, CollaboratorError> {
    if weight > Weight::MAX_STORABLE {
        return Err(CollaboratorError::invalid(
            "weight provider",
            format!("weight {weight} exceeds the storable range"),
        ));
    }
    Ok(weight)
}
