//! File-backed holdings and roles for operator use.
//!
//! ```toml
//! [properties."prop-1"]
//! total_eligible_weight = 200   # optional, defaults to the sum of holdings
//! holdings = { alice = 60, bob = 30, carol = 40 }
//!
//! [roles]
//! dana = "administrator"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use stakevote_engine::{
    CollaboratorError, PropertyId, Role, RoleDirectory, UserId, Weight, WeightProvider,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Registry {
    properties: BTreeMap<String, PropertyHoldings>,
    roles: BTreeMap<String, Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PropertyHoldings {
    total_eligible_weight: Option<u64>,
    holdings: BTreeMap<String, u64>,
}

impl PropertyHoldings {
    fn total(&self) -> Option<u64> {
        match self.total_eligible_weight {
            Some(total) => Some(total),
            None => self
                .holdings
                .values()
                .try_fold(0u64, |sum, weight| sum.checked_add(*weight)),
        }
    }
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read registry {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse registry {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn property(&self, property_id: &PropertyId) -> Result<&PropertyHoldings, CollaboratorError> {
        self.properties.get(property_id.as_str()).ok_or_else(|| {
            CollaboratorError::invalid("registry", format!("unknown property {property_id}"))
        })
    }
}

impl WeightProvider for Registry {
    fn weight_of(
        &self,
        property_id: &PropertyId,
        user_id: &UserId,
        _as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError> {
        let property = self.property(property_id)?;
        Ok(Weight::new(
            property
                .holdings
                .get(user_id.as_str())
                .copied()
                .unwrap_or(0),
        ))
    }

    fn total_eligible_weight(
        &self,
        property_id: &PropertyId,
        _as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError> {
        self.property(property_id)?
            .total()
            .map(Weight::new)
            .ok_or_else(|| {
                CollaboratorError::invalid("registry", format!("holdings of {property_id} overflow"))
            })
    }
}

impl RoleDirectory for Registry {
    fn role_of(&self, user_id: &UserId) -> Result<Role, CollaboratorError> {
        Ok(self.roles.get(user_id.as_str()).copied().unwrap_or_default())
    }
}
