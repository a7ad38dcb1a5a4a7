//! Builds deployment records from requests and profiles.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ControlError, ControlResult};
use crate::profile::{DeploymentProfile, DeploymentRequest};
use crate::store::{DeploymentStore, ProfileStore};
use crate::types::DeploymentRecord;

/// Domain used when neither the request nor the profile names one.
pub const DEFAULT_DOMAIN: &str = "myapp.local";

/// Merges requests with profiles into pending deployment records.
///
/// Each field resolves as request value, then profile value, then hard
/// default.
pub struct ConfigurationResolver {
    deployments: Arc<dyn DeploymentStore>,
    profiles: Arc<dyn ProfileStore>,
    sites_root: PathBuf,
}

impl ConfigurationResolver {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        profiles: Arc<dyn ProfileStore>,
        sites_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            deployments,
            profiles,
            sites_root: sites_root.into(),
        }
    }

    /// Resolve `request` and persist the resulting pending record.
    pub async fn resolve(&self, request: DeploymentRequest) -> ControlResult<DeploymentRecord> {
        let profile = match &request.profile_id {
            Some(id) => Some(
                self.profiles
                    .get_profile(id)
                    .await?
                    .ok_or_else(|| ControlError::ProfileNotFound(id.to_string()))?,
            ),
            None => None,
        };

        let record = self.merge(request, profile.as_ref());
        self.deployments.insert(&record).await?;

        info!(
            deployment_id = %record.id,
            site = %record.site_name,
            domain = %record.domain_name,
            profile = ?record.profile_id,
            "deployment record created"
        );
        Ok(record)
    }

    /// Merge without persisting.
    #[must_use]
    pub fn merge(
        &self,
        request: DeploymentRequest,
        profile: Option<&DeploymentProfile>,
    ) -> DeploymentRecord {
        let name = request
            .name
            .clone()
            .or_else(|| {
                request
                    .source_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "app".to_owned());

        let domain = request
            .domain_name
            .clone()
            .or_else(|| profile.and_then(|p| p.domain_for(&name)))
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_owned());

        // placeholder path; replaced below once the site name is known
        let mut record = DeploymentRecord::new(&name, &request.source_path, domain, PathBuf::new());
        record.physical_path = request
            .physical_path
            .clone()
            .unwrap_or_else(|| self.sites_root.join(&record.site_name));

        macro_rules! pick {
            ($field:ident) => {
                if let Some(value) = request
                    .$field
                    .clone()
                    .or_else(|| profile.and_then(|p| p.$field.clone()))
                {
                    record.$field = value;
                }
            };
        }
        pick!(http_port);
        pick!(https_port);
        pick!(target_platform);
        pick!(environment);
        pick!(strategy);
        pick!(runtime_version);
        pick!(pipeline_mode);
        pick!(run_health_checks);

        record.database = request
            .database
            .or_else(|| profile.and_then(|p| p.database.clone()));
        record.ssl = request.ssl.or_else(|| profile.and_then(|p| p.ssl.clone()));
        record.cloud = request
            .cloud
            .or_else(|| profile.and_then(|p| p.cloud.clone()));

        if let Some(profile) = profile {
            record.environment_variables = profile.environment_variables.clone();
            record.profile_id = Some(profile.id.clone());
        }
        record
            .environment_variables
            .extend(request.environment_variables);

        debug!(deployment_id = %record.id, "request resolved");
        record
    }
}

impl std::fmt::Debug for ConfigurationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationResolver")
            .field("sites_root", &self.sites_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::strategy::DeploymentStrategy;
    use crate::types::{DeploymentStatus, Environment, TargetPlatform};
    use sitecast_hosting::PipelineMode;

    fn resolver() -> (ConfigurationResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let resolver = ConfigurationResolver::new(store.clone(), store.clone(), "/sites");
        (resolver, store)
    }

    #[test]
    fn hard_defaults() {
        let (resolver, _) = resolver();
        let record = resolver.merge(DeploymentRequest::new("/src/shop"), None);

        assert_eq!(record.name, "shop");
        assert_eq!(record.domain_name, "myapp.local");
        assert_eq!(record.site_name, "myapp_local");
        assert_eq!((record.http_port, record.https_port), (80, 443));
        assert_eq!(record.target_platform, TargetPlatform::LocalHost);
        assert_eq!(record.environment, Environment::Development);
        assert_eq!(record.strategy, DeploymentStrategy::StopAndDeploy);
        assert_eq!(record.runtime_version, "");
        assert_eq!(record.pipeline_mode, PipelineMode::Integrated);
        assert_eq!(record.physical_path, PathBuf::from("/sites/myapp_local"));
        assert_eq!(record.status, DeploymentStatus::Pending);
    }

    #[test]
    fn request_beats_profile_beats_default() {
        let (resolver, _) = resolver();
        let mut profile = DeploymentProfile::new("intranet", "Intranet");
        profile.domain_pattern = Some("{name}.corp.local".to_owned());
        profile.http_port = Some(8080);
        profile.https_port = Some(8443);
        profile.environment = Some(Environment::Staging);
        profile
            .environment_variables
            .insert("MODE".to_owned(), "profile".to_owned());

        let mut request = DeploymentRequest::new("/src/shop").with_ports(9090, 9443);
        request
            .environment_variables
            .insert("MODE".to_owned(), "request".to_owned());

        let record = resolver.merge(request, Some(&profile));

        assert_eq!(record.domain_name, "shop.corp.local");
        assert_eq!(record.app_pool_name, "AppPool_shop_corp_local");
        assert_eq!((record.http_port, record.https_port), (9090, 9443));
        assert_eq!(record.environment, Environment::Staging);
        assert_eq!(record.environment_variables["MODE"], "request");
        assert_eq!(record.profile_id, Some(profile.id));
    }

    #[tokio::test]
    async fn resolve_persists_record() {
        let (resolver, store) = resolver();
        let record = resolver
            .resolve(DeploymentRequest::new("/app").with_domain("demo.local"))
            .await
            .unwrap();

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.site_name, "demo_local");
    }

    #[tokio::test]
    async fn missing_profile_is_reported() {
        let (resolver, store) = resolver();
        let err = resolver
            .resolve(DeploymentRequest::new("/app").with_profile("nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::ProfileNotFound(_)));
        assert!(err.to_string().contains("Profile"));
        assert!(store
            .list(&crate::store::DeploymentFilter::new())
            .await
            .unwrap()
            .is_empty());
    }
}
