use serde::{Deserialize, Serialize};

/// An actor's standing with respect to one proposal.
///
/// `Proposer` is derived from the proposal record; the remaining variants are
/// platform roles reported by the identity service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Proposer,
    Administrator,
    OperationsManager,
    #[default]
    Other,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposer => "proposer",
            Self::Administrator => "administrator",
            Self::OperationsManager => "operations_manager",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub const fn is_administrative(self) -> bool {
        matches!(self, Self::Administrator | Self::OperationsManager)
    }

    /// May execute or cancel the proposal.
    #[must_use]
    pub const fn may_manage(self) -> bool {
        matches!(self, Self::Proposer) || self.is_administrative()
    }
}
