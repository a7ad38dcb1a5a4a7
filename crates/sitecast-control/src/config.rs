//! Configuration for sitecast-control.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use sitecast_hosting::{
    AppCmdEngine, CertificateAttachPolicy, CommandInstaller, EngineReadiness, FeatureInstaller,
    HostingEngine, HostsFile, MemoryEngine, SiteDriver,
};

use crate::error::{ControlError, ControlResult};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// Hosting-engine configuration.
    #[serde(default)]
    pub hosting: HostingConfig,

    /// Deployment behaviour configuration.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Database step defaults.
    #[serde(default)]
    pub database: DatabaseDefaults,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. `sitecast.toml` in the current directory (if present)
    /// 3. Environment variables with the `SITECAST_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file("sitecast.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SITECAST_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// Which hosting engine implementation to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The engine's command-line administration tool.
    #[default]
    Appcmd,

    /// In-memory engine for testing.
    Memory,
}

/// Hosting-engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HostingConfig {
    #[serde(default)]
    pub engine: EngineKind,

    /// Directory under which each site's physical path is created.
    #[serde(default = "default_sites_root")]
    pub sites_root: PathBuf,

    /// Directory receiving pre-deploy file backups.
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,

    /// Hosts-resolution file. Defaults to the system file.
    #[serde(default)]
    pub hosts_file: Option<PathBuf>,

    /// Wait after stopping a site before touching its files.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,

    /// Identity granted modify rights on deployed files.
    #[serde(default = "default_app_identity")]
    pub app_identity: String,

    /// Feature installation command. Defaults to the platform's.
    #[serde(default)]
    pub install_program: Option<String>,

    #[serde(default)]
    pub install_args: Vec<String>,

    /// Override for the administration tool location.
    #[serde(default)]
    pub appcmd_path: Option<PathBuf>,
}

fn default_sites_root() -> PathBuf {
    PathBuf::from(r"C:\inetpub\sites")
}

fn default_backup_root() -> PathBuf {
    PathBuf::from(r"C:\inetpub\backups")
}

const fn default_settle_interval_ms() -> u64 {
    2000
}

fn default_app_identity() -> String {
    "IIS_IUSRS".to_owned()
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            sites_root: default_sites_root(),
            backup_root: default_backup_root(),
            hosts_file: None,
            settle_interval_ms: default_settle_interval_ms(),
            app_identity: default_app_identity(),
            install_program: None,
            install_args: Vec::new(),
            appcmd_path: None,
        }
    }
}

impl HostingConfig {
    #[must_use]
    pub const fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    /// Build a site driver from this configuration.
    ///
    /// `readiness` should be shared by every driver in the process.
    pub fn build_driver(&self, readiness: Arc<EngineReadiness>) -> SiteDriver {
        let engine: Arc<dyn HostingEngine> = match self.engine {
            EngineKind::Appcmd => match &self.appcmd_path {
                Some(path) => Arc::new(AppCmdEngine::with_path(path)),
                None => Arc::new(AppCmdEngine::new()),
            },
            EngineKind::Memory => Arc::new(MemoryEngine::new()),
        };

        let installer: Arc<dyn FeatureInstaller> = match &self.install_program {
            Some(program) => Arc::new(CommandInstaller::new(program, self.install_args.clone())),
            None => Arc::new(CommandInstaller::windows_features()),
        };

        let hosts = match &self.hosts_file {
            Some(path) => HostsFile::new(path),
            None => HostsFile::system(),
        };

        SiteDriver::new(engine, installer, Arc::new(hosts), readiness)
    }
}

/// Deployment behaviour configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Case-insensitive name fragments never copied into a site.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Stop the site before replacing files. The `in_place` strategy
    /// overrides this.
    #[serde(default = "default_true")]
    pub stop_before_deploy: bool,

    #[serde(default = "default_true")]
    pub backup_before_deploy: bool,

    #[serde(default)]
    pub certificate_attach_policy: CertificateAttachPolicy,

    /// Allow at most one running deployment per site name.
    #[serde(default = "default_true")]
    pub serialize_targets: bool,

    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,

    #[serde(default)]
    pub always_running: bool,
}

fn default_exclude_patterns() -> Vec<String> {
    [".git", ".vs", "obj", ".pdb", "web.debug.config"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

const fn default_true() -> bool {
    true
}

const fn default_idle_timeout_minutes() -> u64 {
    20
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
            stop_before_deploy: true,
            backup_before_deploy: true,
            certificate_attach_policy: CertificateAttachPolicy::default(),
            serialize_targets: true,
            idle_timeout_minutes: default_idle_timeout_minutes(),
            always_running: false,
        }
    }
}

/// Defaults for the database step.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseDefaults {
    /// Directory receiving database backups.
    #[serde(default = "default_database_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_database_backup_dir() -> PathBuf {
    PathBuf::from(r"C:\inetpub\backups\databases")
}

impl Default for DatabaseDefaults {
    fn default() -> Self {
        Self {
            backup_dir: default_database_backup_dir(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ControlConfig::default();
        assert_eq!(config.hosting.engine, EngineKind::Appcmd);
        assert_eq!(config.hosting.settle_interval(), Duration::from_secs(2));
        assert_eq!(config.hosting.app_identity, "IIS_IUSRS");
        assert!(config.deployment.serialize_targets);
        assert_eq!(
            config.deployment.certificate_attach_policy,
            CertificateAttachPolicy::Warn
        );
        assert!(config
            .deployment
            .exclude_patterns
            .contains(&".git".to_owned()));
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [hosting]
            engine = "memory"
            sites_root = "/srv/sites"
            settle_interval_ms = 0
            install_program = "apt-get"
            install_args = ["install", "-y", "nginx"]

            [deployment]
            exclude_patterns = ["node_modules"]
            certificate_attach_policy = "fail_fast"
            serialize_targets = false

            [database]
            backup_dir = "/srv/db-backups"
        "#;

        let config: ControlConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.hosting.engine, EngineKind::Memory);
        assert_eq!(config.hosting.sites_root, PathBuf::from("/srv/sites"));
        assert_eq!(config.hosting.settle_interval(), Duration::ZERO);
        assert_eq!(config.hosting.install_args.len(), 3);
        assert_eq!(config.deployment.exclude_patterns, vec!["node_modules"]);
        assert_eq!(
            config.deployment.certificate_attach_policy,
            CertificateAttachPolicy::FailFast
        );
        assert!(!config.deployment.serialize_targets);
        assert!(config.deployment.backup_before_deploy);
        assert_eq!(config.database.backup_dir, PathBuf::from("/srv/db-backups"));
    }

    #[test]
    fn from_file_layers_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitecast.toml");
        std::fs::write(&path, "[hosting]\napp_identity = \"svc-web\"\n").unwrap();

        let config = ControlConfig::from_file(&path).unwrap();
        assert_eq!(config.hosting.app_identity, "svc-web");
        assert_eq!(config.hosting.settle_interval_ms, 2000);
    }

    #[test]
    fn memory_driver_from_config() {
        let config = HostingConfig {
            engine: EngineKind::Memory,
            ..HostingConfig::default()
        };
        let driver = config.build_driver(Arc::new(EngineReadiness::new()));
        assert!(!driver.readiness().is_ready());
    }
}
