//! Shared test utilities and fixtures
//!
//! In-memory collaborators and a manual clock for driving the governance
//! service through whole proposal lifecycles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use stakevote_engine::{
    CollaboratorError, Collaborators, GovernanceConfig, GovernanceEvent, GovernanceService,
    ManualClock, NotificationSink, PropertyId, ProposalDraft, Role, RoleDirectory, UserId, Weight,
    WeightProvider,
};
use stakevote_store::{GovernanceStore, RetryPolicy, StoreOptions};

pub const PROPERTY: &str = "prop-1";

/// A fixed instant plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// Holdings per user; total eligible weight is fixed separately.
pub struct Holdings {
    total: u64,
    weights: RwLock<HashMap<String, u64>>,
}

impl Holdings {
    pub fn new(total: u64, weights: &[(&str, u64)]) -> Self {
        Self {
            total,
            weights: RwLock::new(
                weights
                    .iter()
                    .map(|(user, weight)| ((*user).to_string(), *weight))
                    .collect(),
            ),
        }
    }

    pub fn set(&self, user: &str, weight: u64) {
        self.weights
            .write()
            .unwrap()
            .insert(user.to_string(), weight);
    }
}

impl WeightProvider for Holdings {
    fn weight_of(
        &self,
        _property_id: &PropertyId,
        user_id: &UserId,
        _as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError> {
        let weights = self.weights.read().unwrap();
        Ok(Weight::new(weights.get(user_id.as_str()).copied().unwrap_or(0)))
    }

    fn total_eligible_weight(
        &self,
        _property_id: &PropertyId,
        _as_of: DateTime<Utc>,
    ) -> Result<Weight, CollaboratorError> {
        Ok(Weight::new(self.total))
    }
}

#[derive(Default)]
pub struct Roles(HashMap<String, Role>);

impl Roles {
    pub fn with(mut self, user: &str, role: Role) -> Self {
        self.0.insert(user.to_string(), role);
        self
    }
}

impl RoleDirectory for Roles {
    fn role_of(&self, user_id: &UserId) -> Result<Role, CollaboratorError> {
        Ok(self.0.get(user_id.as_str()).copied().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<GovernanceEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<GovernanceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }
}

impl NotificationSink for RecordingNotifier {
    fn dispatch(&self, event: &GovernanceEvent) -> Result<(), CollaboratorError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A sink whose delivery always fails.
pub struct FailingNotifier;

impl NotificationSink for FailingNotifier {
    fn dispatch(&self, _event: &GovernanceEvent) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::unavailable("notifier", "connection refused"))
    }
}

/// Collaborators shared by every service a test opens.
///
/// Scenario holdings: A=60, B=30, C=40, D=0 of 200 eligible; "admin" is an
/// administrator and "ops" an operations manager.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub holdings: Arc<Holdings>,
    pub roles: Arc<Roles>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: GovernanceConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GovernanceConfig::default())
    }

    pub fn with_config(config: GovernanceConfig) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(at(0))),
            holdings: Arc::new(Holdings::new(
                200,
                &[("A", 60), ("B", 30), ("C", 40), ("D", 0)],
            )),
            roles: Arc::new(
                Roles::default()
                    .with("admin", Role::Administrator)
                    .with("ops", Role::OperationsManager),
            ),
            notifier: Arc::new(RecordingNotifier::default()),
            config,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            weights: self.holdings.clone(),
            roles: self.roles.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn service(&self) -> GovernanceService {
        GovernanceService::new(
            GovernanceStore::open_in_memory().unwrap(),
            self.collaborators(),
            self.config.clone(),
        )
    }

    /// A service on a shared database file, as a separate process would open it.
    pub fn service_at(&self, path: &Path) -> GovernanceService {
        let options = StoreOptions {
            busy_timeout: Duration::from_millis(50),
            retry: RetryPolicy {
                max_retries: 200,
                initial_delay_ms: 1,
                max_delay_ms: 20,
                jitter_factor: 0.5,
            },
        };
        GovernanceService::new(
            GovernanceStore::open(path, &options).unwrap(),
            self.collaborators(),
            self.config.clone(),
        )
    }
}

pub fn draft(proposer: &str, window_secs: u64) -> ProposalDraft {
    ProposalDraft {
        property_id: PropertyId::new(PROPERTY),
        proposer_id: user(proposer),
        title: "Replace the roof".to_string(),
        description: "Three contractor quotes attached".to_string(),
        voting_window: Duration::from_secs(window_secs),
    }
}
