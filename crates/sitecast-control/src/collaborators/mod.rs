//! Contracts for the services the orchestrator calls out to.
//!
//! Discovery heuristics, database tooling, certificate issuance, health
//! probes, cloud detection and audit delivery live behind these traits.
//! Recording doubles for all of them are in [`mock`].

pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitecast_hosting::ProgressSink;
use tracing::{error, info, warn};

use crate::error::ControlResult;
use crate::types::{
    CertificateType, DatabaseConfig, DeploymentId, DeploymentRecord, HealthCheckRecord, LogLevel,
};

/// What discovery learned about an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub detected_type: String,
    pub framework_version: Option<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Inspects an application source tree.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn discover(&self, path: &Path) -> ControlResult<DiscoveryResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupResult {
    pub success: bool,
    pub backup_path: PathBuf,
    pub size_bytes: u64,
}

/// Database provisioning and migration.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    async fn exists(&self, config: &DatabaseConfig) -> ControlResult<bool>;

    async fn create(&self, config: &DatabaseConfig, progress: &dyn ProgressSink)
        -> ControlResult<()>;

    async fn backup(&self, config: &DatabaseConfig, path: &Path) -> ControlResult<BackupResult>;

    async fn restore(&self, config: &DatabaseConfig, path: &Path) -> ControlResult<()>;

    /// Run scripts in order. Returns the number executed.
    async fn run_scripts(
        &self,
        config: &DatabaseConfig,
        scripts: &[PathBuf],
        progress: &dyn ProgressSink,
    ) -> ControlResult<usize>;

    /// Apply a folder of migrations. Returns the number applied.
    async fn run_migrations(&self, config: &DatabaseConfig, folder: &Path) -> ControlResult<usize>;

    /// Write `connection_string` into an application configuration file.
    async fn update_connection_string(
        &self,
        config_file: &Path,
        connection_string: &str,
    ) -> ControlResult<()> {
        crate::database::rewrite_connection_string(config_file, connection_string).await
    }
}

/// An issued or installed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateResult {
    pub success: bool,
    pub thumbprint: String,
    pub certificate_type: CertificateType,
    pub expiry_date: DateTime<Utc>,
}

/// Certificate issuance, one method per [`CertificateType`].
#[async_trait]
pub trait CertificateService: Send + Sync {
    async fn create_self_signed(&self, domain: &str) -> ControlResult<CertificateResult>;

    async fn request_external(
        &self,
        domain: &str,
        email: Option<&str>,
    ) -> ControlResult<CertificateResult>;

    async fn import(&self, path: &Path, password: Option<&str>)
        -> ControlResult<CertificateResult>;

    async fn fetch_from_vault(
        &self,
        vault_name: &str,
        secret_name: &str,
    ) -> ControlResult<CertificateResult>;
}

/// Aggregate of a health-check run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub all_healthy: bool,
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub results: Vec<HealthCheckRecord>,
}

/// Runs the health-check suite against a deployed site.
#[async_trait]
pub trait HealthService: Send + Sync {
    async fn run_all_checks(&self, deployment: &DeploymentRecord) -> ControlResult<HealthSummary>;
}

/// Cloud placement of the current host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEnvironment {
    pub provider: Option<String>,
    pub is_cloud: bool,
    pub public_ip: Option<String>,
    pub region: Option<String>,
    pub instance_id: Option<String>,
}

#[async_trait]
pub trait CloudService: Send + Sync {
    async fn detect_environment(&self) -> ControlResult<CloudEnvironment>;
}

/// Audit-event and log delivery.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_event(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        action: &str,
        resource_id: &str,
        data: &serde_json::Value,
    ) -> ControlResult<()>;

    async fn log(
        &self,
        deployment_id: &DeploymentId,
        level: LogLevel,
        message: &str,
        error: Option<&str>,
    ) -> ControlResult<()>;
}

/// Audit sink that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

#[async_trait]
impl AuditLog for TracingAudit {
    async fn log_event(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        action: &str,
        resource_id: &str,
        data: &serde_json::Value,
    ) -> ControlResult<()> {
        info!(
            target: "sitecast::audit",
            event_type,
            user_id = user_id.unwrap_or("system"),
            action,
            resource_id,
            data = %data,
            "audit event"
        );
        Ok(())
    }

    async fn log(
        &self,
        deployment_id: &DeploymentId,
        level: LogLevel,
        message: &str,
        error: Option<&str>,
    ) -> ControlResult<()> {
        match level {
            LogLevel::Error => error!(target: "sitecast::audit", %deployment_id, error, "{message}"),
            LogLevel::Warning => warn!(target: "sitecast::audit", %deployment_id, error, "{message}"),
            LogLevel::Info | LogLevel::Debug => {
                info!(target: "sitecast::audit", %deployment_id, "{message}");
            }
        }
        Ok(())
    }
}

/// The full set of collaborators an orchestrator needs.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn DiscoveryService>,
    pub database: Arc<dyn DatabaseService>,
    pub certificates: Arc<dyn CertificateService>,
    pub health: Arc<dyn HealthService>,
    pub cloud: Arc<dyn CloudService>,
    pub audit: Arc<dyn AuditLog>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
