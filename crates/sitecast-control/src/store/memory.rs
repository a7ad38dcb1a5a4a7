//! In-memory store for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::profile::DeploymentProfile;
use crate::types::{DeploymentId, DeploymentRecord, ProfileId};

use super::{DeploymentFilter, DeploymentStore, ProfileStore};

/// In-memory deployment and profile store.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<String, DeploymentRecord>>,
    profiles: RwLock<HashMap<String, DeploymentProfile>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(
        &self,
        predicate: impl Fn(&DeploymentRecord) -> bool,
    ) -> ControlResult<Vec<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let mut results: Vec<_> = deployments
            .values()
            .filter(|r| predicate(*r))
            .cloned()
            .collect();

        // ulids sort by creation time
        results.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(results)
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(&self, record: &DeploymentRecord) -> ControlResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let key = record.id.as_str().to_owned();
        if deployments.contains_key(&key) {
            return Err(ControlError::store(format!("deployment {key} already exists")));
        }

        deployments.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, id: &DeploymentId) -> ControlResult<Option<DeploymentRecord>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(deployments.get(id.as_str()).cloned())
    }

    async fn update(&self, record: &DeploymentRecord) -> ControlResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let existing = deployments
            .get_mut(record.id.as_str())
            .ok_or_else(|| ControlError::DeploymentNotFound(record.id.to_string()))?;
        *existing = record.clone();
        Ok(())
    }

    async fn list(&self, filter: &DeploymentFilter) -> ControlResult<Vec<DeploymentRecord>> {
        let mut results = self.collect(|r| filter.matches(r))?;
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn find(
        &self,
        predicate: &(dyn for<'r> Fn(&'r DeploymentRecord) -> bool + Send + Sync),
    ) -> ControlResult<Vec<DeploymentRecord>> {
        self.collect(predicate)
    }

    async fn delete(&self, id: &DeploymentId) -> ControlResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        deployments
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| ControlError::DeploymentNotFound(id.to_string()))
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn insert_profile(&self, profile: &DeploymentProfile) -> ControlResult<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        profiles.insert(profile.id.as_str().to_owned(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, id: &ProfileId) -> ControlResult<Option<DeploymentProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(profiles.get(id.as_str()).cloned())
    }

    async fn list_profiles(&self) -> ControlResult<Vec<DeploymentProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let mut all: Vec<_> = profiles.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn delete_profile(&self, id: &ProfileId) -> ControlResult<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        profiles.remove(id.as_str());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::DeploymentStatus;

    fn record(domain: &str) -> DeploymentRecord {
        DeploymentRecord::new("app", "/src", domain, "/sites")
    }

    #[tokio::test]
    async fn insert_get_update() {
        let store = MemoryStore::new();
        let mut record = record("a.local");

        store.insert(&record).await.unwrap();
        assert!(store.insert(&record).await.is_err());

        record.status = DeploymentStatus::InProgress;
        store.update(&record).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DeploymentStatus::InProgress);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = MemoryStore::new();
        let err = store.update(&record("a.local")).await.unwrap_err();
        assert!(matches!(err, ControlError::DeploymentNotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_site() {
        let store = MemoryStore::new();
        let pending = record("a.local");
        let mut done = record("b.local");
        done.status = DeploymentStatus::Success;
        store.insert(&pending).await.unwrap();
        store.insert(&done).await.unwrap();

        let active = store.list(&DeploymentFilter::active()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, pending.id);

        let by_site = store
            .list(&DeploymentFilter::new().with_site("b_local"))
            .await
            .unwrap();
        assert_eq!(by_site.len(), 1);

        let limited = store
            .list(&DeploymentFilter::new().with_limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn find_by_predicate() {
        let store = MemoryStore::new();
        store.insert(&record("a.local")).await.unwrap();
        store.insert(&record("b.local")).await.unwrap();

        let found = store
            .find(&|r: &DeploymentRecord| r.domain_name.starts_with('b'))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].site_name, "b_local");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryStore::new();
        let record = record("a.local");
        store.insert(&record).await.unwrap();

        store.delete(&record.id).await.unwrap();
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.delete(&record.id).await.is_err());
    }

    #[tokio::test]
    async fn profiles_round_trip() {
        let store = MemoryStore::new();
        let profile = DeploymentProfile::new("intranet", "Intranet defaults");

        store.insert_profile(&profile).await.unwrap();
        let loaded = store.get_profile(&profile.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Intranet defaults");
        assert_eq!(store.list_profiles().await.unwrap().len(), 1);

        store.delete_profile(&profile.id).await.unwrap();
        assert!(store.get_profile(&profile.id).await.unwrap().is_none());
    }
}
