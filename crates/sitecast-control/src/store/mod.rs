//! Deployment and profile storage.
//!
//! Persistence technology is outside this crate; the traits here are the
//! seam. [`MemoryStore`] implements both for tests and single-process use.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::ControlResult;
use crate::profile::DeploymentProfile;
use crate::types::{DeploymentId, DeploymentRecord, DeploymentStatus, ProfileId};

/// Filter criteria for listing deployments.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    /// Match any of these statuses.
    pub statuses: Option<Vec<DeploymentStatus>>,
    pub site_name: Option<String>,
    pub limit: Option<usize>,
}

impl DeploymentFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            statuses: None,
            site_name: None,
            limit: None,
        }
    }

    /// Records that have not reached a terminal status.
    #[must_use]
    pub fn active() -> Self {
        Self::new().with_statuses(vec![
            DeploymentStatus::Pending,
            DeploymentStatus::InProgress,
            DeploymentStatus::ValidationFailed,
            DeploymentStatus::DatabaseDeploying,
            DeploymentStatus::ConfiguringSsl,
            DeploymentStatus::AppDeploying,
            DeploymentStatus::RunningHealthChecks,
        ])
    }

    #[must_use]
    pub fn with_statuses(mut self, statuses: Vec<DeploymentStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    #[must_use]
    pub fn with_site(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = Some(site_name.into());
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` satisfies the filter, ignoring `limit`.
    #[must_use]
    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }
        if let Some(site) = &self.site_name {
            if &record.site_name != site {
                return false;
            }
        }
        true
    }
}

/// Backend for storing deployment records.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn insert(&self, record: &DeploymentRecord) -> ControlResult<()>;

    async fn get(&self, id: &DeploymentId) -> ControlResult<Option<DeploymentRecord>>;

    /// Replace an existing record. Fails with `DeploymentNotFound` if it
    /// was never inserted.
    async fn update(&self, record: &DeploymentRecord) -> ControlResult<()>;

    /// List records matching the filter, newest first.
    async fn list(&self, filter: &DeploymentFilter) -> ControlResult<Vec<DeploymentRecord>>;

    /// Find records for which `predicate` holds, newest first.
    async fn find(
        &self,
        predicate: &(dyn for<'r> Fn(&'r DeploymentRecord) -> bool + Send + Sync),
    ) -> ControlResult<Vec<DeploymentRecord>>;

    /// Delete a record. Retention is a caller concern; the orchestrator
    /// never calls this.
    async fn delete(&self, id: &DeploymentId) -> ControlResult<()>;
}

/// Backend for deployment profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert_profile(&self, profile: &DeploymentProfile) -> ControlResult<()>;

    async fn get_profile(&self, id: &ProfileId) -> ControlResult<Option<DeploymentProfile>>;

    async fn list_profiles(&self) -> ControlResult<Vec<DeploymentProfile>>;

    async fn delete_profile(&self, id: &ProfileId) -> ControlResult<()>;
}
