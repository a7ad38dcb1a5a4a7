//! Core types for sitecast-control.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitecast_hosting::{pool_name_for, site_name_for, PipelineMode, NO_MANAGED_CODE};

use crate::error::ControlResult;
use crate::state::{self, StatusEvent};
use crate::strategy::DeploymentStrategy;

/// Unique identifier for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Create a deployment ID from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique deployment ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeploymentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a deployment profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the application is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPlatform {
    #[default]
    LocalHost,
    AppService,
    CloudVm,
    Kubernetes,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
    Test,
}

/// Status of a deployment record.
///
/// See [`crate::state`] for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Record created, not yet started.
    Pending,
    /// Started; discovery and engine readiness run here.
    InProgress,
    /// Discovery reported warnings. Overwritten by the next stage.
    ValidationFailed,
    DatabaseDeploying,
    ConfiguringSsl,
    AppDeploying,
    RunningHealthChecks,
    Success,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::ValidationFailed => "validation_failed",
            Self::DatabaseDeploying => "database_deploying",
            Self::ConfiguringSsl => "configuring_ssl",
            Self::AppDeploying => "app_deploying",
            Self::RunningHealthChecks => "running_health_checks",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::RolledBack)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "validation_failed" => Ok(Self::ValidationFailed),
            "database_deploying" => Ok(Self::DatabaseDeploying),
            "configuring_ssl" => Ok(Self::ConfiguringSsl),
            "app_deploying" => Ok(Self::AppDeploying),
            "running_health_checks" => Ok(Self::RunningHealthChecks),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            _ => Err(format!("unknown deployment status: {s}")),
        }
    }
}

/// Database engine behind a [`DatabaseConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseProvider {
    #[default]
    SqlServer,
    PostgreSql,
    MySql,
    Sqlite,
}

/// Database provisioning settings for a deployment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub provider: DatabaseProvider,
    /// Server host, or the database file path for SQLite.
    pub server: String,
    pub database_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Use the process identity instead of a username and password.
    #[serde(default)]
    pub integrated_security: bool,
    #[serde(default = "default_true")]
    pub backup_before_deploy: bool,
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
    /// SQL scripts run in order after creation.
    #[serde(default)]
    pub scripts: Vec<PathBuf>,
    #[serde(default)]
    pub migrations_folder: Option<PathBuf>,
    #[serde(default)]
    pub auto_rollback_on_failure: bool,
}

const fn default_true() -> bool {
    true
}

impl DatabaseConfig {
    pub fn new(
        provider: DatabaseProvider,
        server: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            server: server.into(),
            database_name: database_name.into(),
            username: None,
            password: None,
            integrated_security: false,
            backup_before_deploy: true,
            create_if_missing: true,
            scripts: Vec::new(),
            migrations_folder: None,
            auto_rollback_on_failure: false,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self.integrated_security = false;
        self
    }

    #[must_use]
    pub fn with_integrated_security(mut self) -> Self {
        self.integrated_security = true;
        self
    }

    #[must_use]
    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_deploy = enabled;
        self
    }

    #[must_use]
    pub fn with_scripts(mut self, scripts: Vec<PathBuf>) -> Self {
        self.scripts = scripts;
        self
    }

    #[must_use]
    pub fn with_migrations(mut self, folder: impl Into<PathBuf>) -> Self {
        self.migrations_folder = Some(folder.into());
        self
    }

    /// Connection string for the configured provider.
    #[must_use]
    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();

        match self.provider {
            DatabaseProvider::SqlServer if self.integrated_security => format!(
                "Server={};Database={};Trusted_Connection=True;TrustServerCertificate=True;",
                self.server, self.database_name
            ),
            DatabaseProvider::SqlServer => format!(
                "Server={};Database={};User Id={user};Password={password};TrustServerCertificate=True;",
                self.server, self.database_name
            ),
            DatabaseProvider::PostgreSql => format!(
                "Host={};Database={};Username={user};Password={password}",
                self.server, self.database_name
            ),
            DatabaseProvider::MySql => format!(
                "Server={};Database={};Uid={user};Pwd={password};",
                self.server, self.database_name
            ),
            DatabaseProvider::Sqlite => format!("Data Source={}", self.server),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("provider", &self.provider)
            .field("server", &self.server)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("integrated_security", &self.integrated_security)
            .field("backup_before_deploy", &self.backup_before_deploy)
            .field("create_if_missing", &self.create_if_missing)
            .field("scripts", &self.scripts)
            .field("migrations_folder", &self.migrations_folder)
            .field("auto_rollback_on_failure", &self.auto_rollback_on_failure)
            .finish()
    }
}

/// How a TLS certificate is obtained.
///
/// Unknown names deserialize into [`CertificateType::Unrecognized`] so that
/// the orchestrator, not the parser, reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CertificateType {
    /// Generate a self-signed certificate.
    SelfSigned,
    /// Request a certificate from an external ACME issuer.
    LetsEncrypt,
    /// Install a supplied certificate file.
    Import,
    /// Fetch a certificate from a managed secret store.
    KeyVault,
    Unrecognized(String),
}

impl CertificateType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SelfSigned => "self_signed",
            Self::LetsEncrypt => "lets_encrypt",
            Self::Import => "import",
            Self::KeyVault => "key_vault",
            Self::Unrecognized(name) => name,
        }
    }
}

impl From<String> for CertificateType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "self_signed" | "selfsigned" => Self::SelfSigned,
            "lets_encrypt" | "letsencrypt" => Self::LetsEncrypt,
            "import" => Self::Import,
            "key_vault" | "keyvault" => Self::KeyVault,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<CertificateType> for String {
    fn from(t: CertificateType) -> Self {
        t.as_str().to_owned()
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TLS settings for a deployment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfig {
    pub certificate_type: CertificateType,
    /// Certificate file for [`CertificateType::Import`].
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    #[serde(default, skip_serializing)]
    pub certificate_password: Option<String>,
    /// Contact address for external issuance.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub vault_name: Option<String>,
    #[serde(default)]
    pub secret_name: Option<String>,
}

impl SslConfig {
    pub fn new(certificate_type: CertificateType) -> Self {
        Self {
            certificate_type,
            certificate_path: None,
            certificate_password: None,
            email: None,
            vault_name: None,
            secret_name: None,
        }
    }

    pub fn self_signed() -> Self {
        Self::new(CertificateType::SelfSigned)
    }

    pub fn imported(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            certificate_path: Some(path.into()),
            certificate_password: Some(password.into()),
            ..Self::new(CertificateType::Import)
        }
    }
}

impl fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslConfig")
            .field("certificate_type", &self.certificate_type)
            .field("certificate_path", &self.certificate_path)
            .field("email", &self.email)
            .field("vault_name", &self.vault_name)
            .field("secret_name", &self.secret_name)
            .finish_non_exhaustive()
    }
}

/// Cloud placement settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
}

/// Severity of a deployment log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One entry of a deployment's ordered log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Audit event recorded against a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub action: String,
    pub data: serde_json::Value,
}

/// A deployment attempt and its audit trail.
///
/// Created by the resolver in [`DeploymentStatus::Pending`], advanced only
/// through [`DeploymentRecord::apply`], and left unchanged once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub name: String,
    pub source_path: PathBuf,
    pub application_type: Option<String>,
    pub target_platform: TargetPlatform,
    pub environment: Environment,
    pub domain_name: String,
    pub http_port: u16,
    pub https_port: u16,
    pub site_name: String,
    pub app_pool_name: String,
    pub physical_path: PathBuf,
    pub runtime_version: String,
    pub pipeline_mode: PipelineMode,
    pub database: Option<DatabaseConfig>,
    pub ssl: Option<SslConfig>,
    pub cloud: Option<CloudConfig>,
    pub strategy: DeploymentStrategy,
    pub run_health_checks: bool,
    pub environment_variables: BTreeMap<String, String>,
    pub profile_id: Option<ProfileId>,

    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub rollback_command: Option<String>,

    pub certificate_thumbprint: Option<String>,
    pub certificate_expiry: Option<DateTime<Utc>>,
    pub database_backup_path: Option<PathBuf>,
    pub cloud_provider: Option<String>,
    pub public_ip: Option<String>,

    pub logs: Vec<LogEntry>,
    pub health_checks: Vec<HealthCheckRecord>,
    pub audit: Vec<AuditEntry>,
    pub metadata: BTreeMap<String, String>,
}

impl DeploymentRecord {
    /// Create a pending record with names derived from `domain_name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        domain_name: impl Into<String>,
        physical_path: impl Into<PathBuf>,
    ) -> Self {
        let domain_name = domain_name.into();
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            name: name.into(),
            source_path: source_path.into(),
            application_type: None,
            target_platform: TargetPlatform::default(),
            environment: Environment::default(),
            site_name: site_name_for(&domain_name),
            app_pool_name: pool_name_for(&domain_name),
            domain_name,
            http_port: 80,
            https_port: 443,
            physical_path: physical_path.into(),
            runtime_version: NO_MANAGED_CODE.to_owned(),
            pipeline_mode: PipelineMode::default(),
            database: None,
            ssl: None,
            cloud: None,
            strategy: DeploymentStrategy::default(),
            run_health_checks: false,
            environment_variables: BTreeMap::new(),
            profile_id: None,
            status: DeploymentStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            rollback_command: None,
            certificate_thumbprint: None,
            certificate_expiry: None,
            database_backup_path: None,
            cloud_provider: None,
            public_ip: None,
            logs: Vec::new(),
            health_checks: Vec::new(),
            audit: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// `https://{domain}:{https_port}`.
    #[must_use]
    pub fn target_url(&self) -> String {
        format!("https://{}:{}", self.domain_name, self.https_port)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance the status by `event`, stamping the timestamps it implies.
    pub fn apply(&mut self, event: StatusEvent) -> ControlResult<DeploymentStatus> {
        let next = state::transition(self.status, event)?;
        let now = Utc::now();

        if next == DeploymentStatus::InProgress {
            self.started_at = Some(now);
        }
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
            let start = self.started_at.unwrap_or(self.created_at);
            self.duration_ms = Some(
                u64::try_from((now - start).num_milliseconds()).unwrap_or_default(),
            );
        }

        self.status = next;
        self.updated_at = now;
        Ok(next)
    }

    /// Append an entry to the deployment log.
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>, error: Option<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error,
        });
    }

    /// Append an audit entry.
    pub fn push_audit(
        &mut self,
        event_type: impl Into<String>,
        action: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.audit.push(AuditEntry {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            action: action.into(),
            data,
        });
    }
}
