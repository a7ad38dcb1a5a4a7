//! Deployment requests and the profiles that supply their defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sitecast_hosting::PipelineMode;

use crate::strategy::DeploymentStrategy;
use crate::types::{
    CloudConfig, DatabaseConfig, Environment, ProfileId, SslConfig, TargetPlatform,
};

/// A named template of deployment defaults.
///
/// Every field is optional; unset fields fall through to the hard
/// defaults applied by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentProfile {
    pub id: ProfileId,
    pub name: String,
    /// Domain template. `{name}` is replaced with the deployment name.
    #[serde(default)]
    pub domain_pattern: Option<String>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub https_port: Option<u16>,
    #[serde(default)]
    pub target_platform: Option<TargetPlatform>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub strategy: Option<DeploymentStrategy>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub pipeline_mode: Option<PipelineMode>,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub ssl: Option<SslConfig>,
    #[serde(default)]
    pub cloud: Option<CloudConfig>,
    #[serde(default)]
    pub run_health_checks: Option<bool>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

impl DeploymentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(id),
            name: name.into(),
            domain_pattern: None,
            http_port: None,
            https_port: None,
            target_platform: None,
            environment: None,
            strategy: None,
            runtime_version: None,
            pipeline_mode: None,
            database: None,
            ssl: None,
            cloud: None,
            run_health_checks: None,
            environment_variables: BTreeMap::new(),
        }
    }

    /// Expand the domain pattern for a deployment name.
    #[must_use]
    pub fn domain_for(&self, name: &str) -> Option<String> {
        self.domain_pattern
            .as_deref()
            .map(|pattern| pattern.replace("{name}", name))
    }
}

/// An ad-hoc deployment request.
///
/// Only `source_path` is mandatory. Set fields take precedence over the
/// referenced profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub source_path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_id: Option<ProfileId>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub https_port: Option<u16>,
    /// Overrides the site directory derived from the configured root.
    #[serde(default)]
    pub physical_path: Option<PathBuf>,
    #[serde(default)]
    pub target_platform: Option<TargetPlatform>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub strategy: Option<DeploymentStrategy>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub pipeline_mode: Option<PipelineMode>,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub ssl: Option<SslConfig>,
    #[serde(default)]
    pub cloud: Option<CloudConfig>,
    #[serde(default)]
    pub run_health_checks: Option<bool>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

impl DeploymentRequest {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, id: impl Into<String>) -> Self {
        self.profile_id = Some(ProfileId::new(id));
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_ports(mut self, http: u16, https: u16) -> Self {
        self.http_port = Some(http);
        self.https_port = Some(https);
        self
    }

    #[must_use]
    pub fn with_physical_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.physical_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: TargetPlatform) -> Self {
        self.target_platform = Some(target);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: DeploymentStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn with_runtime(mut self, version: impl Into<String>, mode: PipelineMode) -> Self {
        self.runtime_version = Some(version.into());
        self.pipeline_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    #[must_use]
    pub fn with_health_checks(mut self, enabled: bool) -> Self {
        self.run_health_checks = Some(enabled);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn domain_pattern_expands_name() {
        let mut profile = DeploymentProfile::new("p", "Intranet");
        assert_eq!(profile.domain_for("shop"), None);

        profile.domain_pattern = Some("{name}.intranet.local".to_owned());
        assert_eq!(
            profile.domain_for("shop").as_deref(),
            Some("shop.intranet.local")
        );
    }

    #[test]
    fn request_from_json_needs_only_path() {
        let request: DeploymentRequest = serde_json::from_str(r#"{"source_path":"/app"}"#).unwrap();
        assert_eq!(request.source_path, PathBuf::from("/app"));
        assert!(request.profile_id.is_none());
        assert!(request.database.is_none());
    }
}
