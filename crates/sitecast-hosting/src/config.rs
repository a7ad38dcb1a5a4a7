//! Pool, site and file-deployment descriptors.
//!
//! These are built fresh for every driver call and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime version meaning "no managed code".
pub const NO_MANAGED_CODE: &str = "";

/// Prefix applied to the site name to form the process-pool name.
pub const POOL_NAME_PREFIX: &str = "AppPool_";

/// Derive the site name for a domain.
///
/// Every character that is not ASCII alphanumeric becomes `_`, so
/// `my-app.local` maps to `my_app_local`.
pub fn site_name_for(domain: &str) -> String {
    domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Derive the process-pool name for a domain.
pub fn pool_name_for(domain: &str) -> String {
    format!("{POOL_NAME_PREFIX}{}", site_name_for(domain))
}

/// Request pipeline mode of a process pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Integrated,
    Classic,
}

impl PipelineMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Integrated => "Integrated",
            Self::Classic => "Classic",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-as identity for a process pool.
#[derive(Clone, PartialEq, Eq)]
pub struct PoolIdentity {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolIdentity")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Target configuration for a process pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub name: String,
    /// Managed runtime version, or [`NO_MANAGED_CODE`].
    pub runtime_version: String,
    pub pipeline_mode: PipelineMode,
    pub idle_timeout: Duration,
    pub always_running: bool,
    pub identity: Option<PoolIdentity>,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime_version: NO_MANAGED_CODE.to_string(),
            pipeline_mode: PipelineMode::Integrated,
            idle_timeout: Duration::from_secs(20 * 60),
            always_running: false,
            identity: None,
        }
    }

    pub fn with_runtime(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = version.into();
        self
    }

    pub fn with_pipeline(mut self, mode: PipelineMode) -> Self {
        self.pipeline_mode = mode;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_always_running(mut self, always_running: bool) -> Self {
        self.always_running = always_running;
        self
    }

    pub fn with_identity(mut self, identity: PoolIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Whether the pool runs managed code.
    pub fn is_managed(&self) -> bool {
        !self.runtime_version.is_empty()
    }
}

/// What to do when attaching a certificate to an HTTPS binding fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateAttachPolicy {
    /// Log a warning and keep the site reachable over HTTP.
    #[default]
    Warn,
    /// Fail site creation.
    FailFast,
}

/// Binding protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// A site binding: protocol plus `ip:port:host` information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub protocol: Protocol,
    pub ip: String,
    pub port: u16,
    pub host: String,
}

impl Binding {
    pub fn http(port: u16, host: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Http,
            ip: "*".to_string(),
            port,
            host: host.into(),
        }
    }

    pub fn https(port: u16, host: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Https,
            ip: "*".to_string(),
            port,
            host: host.into(),
        }
    }

    /// The `ip:port:host` triple used by the engine.
    pub fn information(&self) -> String {
        format!("{}:{}:{}", self.ip, self.port, self.host)
    }

    /// Parse the `protocol/ip:port:host` form printed by the engine.
    pub fn parse(s: &str) -> Option<Self> {
        let (protocol, info) = s.split_once('/')?;
        let protocol = match protocol {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => return None,
        };
        let mut parts = info.splitn(3, ':');
        let ip = parts.next()?.to_string();
        let port = parts.next()?.parse().ok()?;
        let host = parts.next().unwrap_or_default().to_string();
        Some(Self {
            protocol,
            ip,
            port,
            host,
        })
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol.as_str(), self.information())
    }
}

/// Target configuration for a site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub physical_path: PathBuf,
    pub pool_name: String,
    pub domain_name: String,
    pub http_port: u16,
    pub https_port: u16,
    pub enable_https: bool,
    pub certificate_thumbprint: Option<String>,
    pub attach_policy: CertificateAttachPolicy,
}

impl SiteConfig {
    /// Build a site configuration with names derived from the domain.
    pub fn for_domain(domain: impl Into<String>, physical_path: impl Into<PathBuf>) -> Self {
        let domain_name = domain.into();
        Self {
            name: site_name_for(&domain_name),
            pool_name: pool_name_for(&domain_name),
            physical_path: physical_path.into(),
            domain_name,
            http_port: 80,
            https_port: 443,
            enable_https: false,
            certificate_thumbprint: None,
            attach_policy: CertificateAttachPolicy::Warn,
        }
    }

    pub fn with_ports(mut self, http: u16, https: u16) -> Self {
        self.http_port = http;
        self.https_port = https;
        self
    }

    pub fn with_certificate(mut self, thumbprint: impl Into<String>) -> Self {
        self.enable_https = true;
        self.certificate_thumbprint = Some(thumbprint.into());
        self
    }

    pub fn with_attach_policy(mut self, policy: CertificateAttachPolicy) -> Self {
        self.attach_policy = policy;
        self
    }

    pub fn http_binding(&self) -> Binding {
        Binding::http(self.http_port, &self.domain_name)
    }

    pub fn https_binding(&self) -> Binding {
        Binding::https(self.https_port, &self.domain_name)
    }
}

/// Parameters of the file-synchronisation procedure.
#[derive(Debug, Clone)]
pub struct FileDeployConfig {
    pub site_name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Stop the site (and wait `settle_interval`) before touching files.
    pub stop_site: bool,
    /// Copy the existing destination aside before clearing it.
    pub backup: bool,
    pub backup_root: PathBuf,
    /// Case-insensitive substrings; matching entries are not copied.
    pub exclude_patterns: Vec<String>,
    /// Identity granted modify rights on the destination.
    pub app_identity: String,
    pub settle_interval: Duration,
}

impl FileDeployConfig {
    pub fn new(
        site_name: impl Into<String>,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            source: source.into(),
            destination: destination.into(),
            stop_site: true,
            backup: true,
            backup_root: std::env::temp_dir().join("sitecast-backups"),
            exclude_patterns: Vec::new(),
            app_identity: "IIS_IUSRS".to_string(),
            settle_interval: Duration::from_secs(2),
        }
    }

    pub fn with_stop_site(mut self, stop: bool) -> Self {
        self.stop_site = stop;
        self
    }

    pub fn with_backup(mut self, backup: bool, root: impl Into<PathBuf>) -> Self {
        self.backup = backup;
        self.backup_root = root.into();
        self
    }

    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.app_identity = identity.into();
        self
    }

    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn derived_names_replace_separators() {
        assert_eq!(site_name_for("my-app.local"), "my_app_local");
        assert_eq!(pool_name_for("my-app.local"), "AppPool_my_app_local");
        assert_eq!(site_name_for("shop.example.com"), "shop_example_com");
    }

    #[test]
    fn site_config_for_domain() {
        let config = SiteConfig::for_domain("demo.local", "/srv/demo").with_ports(8080, 8443);
        assert_eq!(config.name, "demo_local");
        assert_eq!(config.pool_name, "AppPool_demo_local");
        assert_eq!(config.http_binding().to_string(), "http/*:8080:demo.local");
        assert!(!config.enable_https);
    }

    #[test]
    fn binding_parse() {
        let binding = Binding::parse("https/*:443:shop.local").unwrap();
        assert_eq!(binding, Binding::https(443, "shop.local"));

        let no_host = Binding::parse("http/*:80:").unwrap();
        assert_eq!(no_host.host, "");
        assert!(Binding::parse("net.tcp/808:*").is_none());
    }

    #[test]
    fn identity_debug_is_redacted() {
        let identity = PoolIdentity {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }
}
