//! Recording collaborator doubles for tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sitecast_hosting::{ProgressInfo, ProgressSink};

use crate::error::{ControlError, ControlResult};
use crate::types::{CertificateType, DatabaseConfig, DeploymentId, DeploymentRecord, LogLevel};

use super::{
    AuditLog, BackupResult, CertificateResult, CertificateService, CloudEnvironment, CloudService,
    Collaborators, DatabaseService, DiscoveryResult, DiscoveryService, HealthService,
    HealthSummary,
};

fn push<T>(list: &Mutex<Vec<T>>, item: T) {
    if let Ok(mut list) = list.lock() {
        list.push(item);
    }
}

fn snapshot<T: Clone>(list: &Mutex<Vec<T>>) -> Vec<T> {
    list.lock().map(|l| l.clone()).unwrap_or_default()
}

/// Discovery double returning a fixed result.
#[derive(Debug, Default)]
pub struct MockDiscovery {
    result: Mutex<DiscoveryResult>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockDiscovery {
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: Mutex::new(DiscoveryResult {
                detected_type: "static_site".to_owned(),
                ..DiscoveryResult::default()
            }),
            ..Self::default()
        }
    }

    pub fn set_warnings(&self, warnings: Vec<String>) {
        if let Ok(mut result) = self.result.lock() {
            result.warnings = warnings;
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryService for MockDiscovery {
    async fn discover(&self, path: &Path) -> ControlResult<DiscoveryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::Discovery(format!(
                "cannot inspect {}",
                path.display()
            )));
        }
        self.result
            .lock()
            .map(|r| r.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

/// A call received by [`MockDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseCall {
    Exists,
    Create,
    Backup(PathBuf),
    Restore(PathBuf),
    RunScripts(Vec<PathBuf>),
    RunMigrations(PathBuf),
    UpdateConnectionString(PathBuf),
}

/// Database operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseOp {
    Create,
    Backup,
    Restore,
    RunScripts,
}

/// Database double that records every call.
#[derive(Debug, Default)]
pub struct MockDatabase {
    exists: AtomicBool,
    calls: Mutex<Vec<DatabaseCall>>,
    failures: Mutex<HashSet<DatabaseOp>>,
}

impl MockDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A database double that reports the database as already present.
    #[must_use]
    pub fn existing() -> Self {
        let db = Self::default();
        db.exists.store(true, Ordering::SeqCst);
        db
    }

    pub fn fail(&self, op: DatabaseOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(op);
        }
    }

    pub fn calls(&self) -> Vec<DatabaseCall> {
        snapshot(&self.calls)
    }

    fn check(&self, op: DatabaseOp) -> ControlResult<()> {
        let failing = self
            .failures
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?
            .contains(&op);
        if failing {
            return Err(ControlError::database(format!("injected failure: {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for MockDatabase {
    async fn exists(&self, _config: &DatabaseConfig) -> ControlResult<bool> {
        push(&self.calls, DatabaseCall::Exists);
        Ok(self.exists.load(Ordering::SeqCst))
    }

    async fn create(
        &self,
        config: &DatabaseConfig,
        progress: &dyn ProgressSink,
    ) -> ControlResult<()> {
        push(&self.calls, DatabaseCall::Create);
        self.check(DatabaseOp::Create)?;
        progress.report(ProgressInfo::info(
            "database",
            100,
            format!("created {}", config.database_name),
        ));
        self.exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn backup(&self, _config: &DatabaseConfig, path: &Path) -> ControlResult<BackupResult> {
        push(&self.calls, DatabaseCall::Backup(path.to_path_buf()));
        self.check(DatabaseOp::Backup)?;
        Ok(BackupResult {
            success: true,
            backup_path: path.to_path_buf(),
            size_bytes: 4096,
        })
    }

    async fn restore(&self, _config: &DatabaseConfig, path: &Path) -> ControlResult<()> {
        push(&self.calls, DatabaseCall::Restore(path.to_path_buf()));
        self.check(DatabaseOp::Restore)
    }

    async fn run_scripts(
        &self,
        _config: &DatabaseConfig,
        scripts: &[PathBuf],
        _progress: &dyn ProgressSink,
    ) -> ControlResult<usize> {
        push(&self.calls, DatabaseCall::RunScripts(scripts.to_vec()));
        self.check(DatabaseOp::RunScripts)?;
        Ok(scripts.len())
    }

    async fn run_migrations(&self, _config: &DatabaseConfig, folder: &Path) -> ControlResult<usize> {
        push(&self.calls, DatabaseCall::RunMigrations(folder.to_path_buf()));
        Ok(1)
    }

    async fn update_connection_string(
        &self,
        config_file: &Path,
        connection_string: &str,
    ) -> ControlResult<()> {
        push(
            &self.calls,
            DatabaseCall::UpdateConnectionString(config_file.to_path_buf()),
        );
        crate::database::rewrite_connection_string(config_file, connection_string).await
    }
}

/// A call received by [`MockCertificates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateCall {
    SelfSigned(String),
    External(String),
    Import(PathBuf),
    Vault(String, String),
}

/// Certificate double that records which issuance path was taken.
#[derive(Debug, Default)]
pub struct MockCertificates {
    calls: Mutex<Vec<CertificateCall>>,
    fail: AtomicBool,
}

impl MockCertificates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CertificateCall> {
        snapshot(&self.calls)
    }

    fn issue(
        &self,
        call: CertificateCall,
        certificate_type: CertificateType,
    ) -> ControlResult<CertificateResult> {
        push(&self.calls, call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::certificate("injected failure"));
        }
        Ok(CertificateResult {
            success: true,
            thumbprint: format!("MOCK{}", certificate_type.as_str().to_uppercase()),
            certificate_type,
            expiry_date: Utc::now() + Duration::days(90),
        })
    }
}

#[async_trait]
impl CertificateService for MockCertificates {
    async fn create_self_signed(&self, domain: &str) -> ControlResult<CertificateResult> {
        self.issue(
            CertificateCall::SelfSigned(domain.to_owned()),
            CertificateType::SelfSigned,
        )
    }

    async fn request_external(
        &self,
        domain: &str,
        _email: Option<&str>,
    ) -> ControlResult<CertificateResult> {
        self.issue(
            CertificateCall::External(domain.to_owned()),
            CertificateType::LetsEncrypt,
        )
    }

    async fn import(
        &self,
        path: &Path,
        _password: Option<&str>,
    ) -> ControlResult<CertificateResult> {
        self.issue(
            CertificateCall::Import(path.to_path_buf()),
            CertificateType::Import,
        )
    }

    async fn fetch_from_vault(
        &self,
        vault_name: &str,
        secret_name: &str,
    ) -> ControlResult<CertificateResult> {
        self.issue(
            CertificateCall::Vault(vault_name.to_owned(), secret_name.to_owned()),
            CertificateType::KeyVault,
        )
    }
}

/// Health double returning a fixed summary.
#[derive(Debug)]
pub struct MockHealth {
    summary: Mutex<HealthSummary>,
    calls: AtomicUsize,
}

impl Default for MockHealth {
    fn default() -> Self {
        Self {
            summary: Mutex::new(HealthSummary {
                all_healthy: true,
                total: 2,
                healthy: 2,
                ..HealthSummary::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockHealth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_summary(&self, summary: HealthSummary) {
        if let Ok(mut current) = self.summary.lock() {
            *current = summary;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthService for MockHealth {
    async fn run_all_checks(&self, _deployment: &DeploymentRecord) -> ControlResult<HealthSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.summary
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ControlError::internal("lock poisoned"))
    }
}

/// Cloud double reporting a fixed environment.
#[derive(Debug, Default)]
pub struct MockCloud {
    environment: CloudEnvironment,
    calls: AtomicUsize,
}

impl MockCloud {
    #[must_use]
    pub fn new(environment: CloudEnvironment) -> Self {
        Self {
            environment,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudService for MockCloud {
    async fn detect_environment(&self) -> ControlResult<CloudEnvironment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.environment.clone())
    }
}

/// An audit event captured by [`MemoryAudit`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event_type: String,
    pub action: String,
    pub resource_id: String,
    pub data: serde_json::Value,
}

/// Audit sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<RecordedEvent>>,
    logs: Mutex<Vec<(String, LogLevel, String)>>,
}

impl MemoryAudit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        snapshot(&self.events)
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }

    pub fn logs(&self) -> Vec<(String, LogLevel, String)> {
        snapshot(&self.logs)
    }
}

#[async_trait]
impl AuditLog for MemoryAudit {
    async fn log_event(
        &self,
        event_type: &str,
        _user_id: Option<&str>,
        action: &str,
        resource_id: &str,
        data: &serde_json::Value,
    ) -> ControlResult<()> {
        push(
            &self.events,
            RecordedEvent {
                event_type: event_type.to_owned(),
                action: action.to_owned(),
                resource_id: resource_id.to_owned(),
                data: data.clone(),
            },
        );
        Ok(())
    }

    async fn log(
        &self,
        deployment_id: &DeploymentId,
        level: LogLevel,
        message: &str,
        _error: Option<&str>,
    ) -> ControlResult<()> {
        push(
            &self.logs,
            (deployment_id.to_string(), level, message.to_owned()),
        );
        Ok(())
    }
}

/// One of every double, kept so tests can inspect them.
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    pub discovery: Arc<MockDiscovery>,
    pub database: Arc<MockDatabase>,
    pub certificates: Arc<MockCertificates>,
    pub health: Arc<MockHealth>,
    pub cloud: Arc<MockCloud>,
    pub audit: Arc<MemoryAudit>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self {
            discovery: Arc::new(MockDiscovery::new()),
            database: Arc::new(MockDatabase::new()),
            certificates: Arc::new(MockCertificates::new()),
            health: Arc::new(MockHealth::new()),
            cloud: Arc::new(MockCloud::default()),
            audit: Arc::new(MemoryAudit::new()),
        }
    }
}

impl MockCollaborators {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_database(mut self, database: MockDatabase) -> Self {
        self.database = Arc::new(database);
        self
    }

    #[must_use]
    pub fn with_cloud(mut self, environment: CloudEnvironment) -> Self {
        self.cloud = Arc::new(MockCloud::new(environment));
        self
    }

    /// Type-erased handles for the orchestrator.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            discovery: self.discovery.clone(),
            database: self.database.clone(),
            certificates: self.certificates.clone(),
            health: self.health.clone(),
            cloud: self.cloud.clone(),
            audit: self.audit.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::DatabaseProvider;
    use sitecast_hosting::CollectingProgress;

    #[tokio::test]
    async fn database_records_calls_and_injected_failures() {
        let db = MockDatabase::new();
        let config = DatabaseConfig::new(DatabaseProvider::Sqlite, "/tmp/x.db", "x");
        let progress = CollectingProgress::new();

        assert!(!db.exists(&config).await.unwrap());
        db.create(&config, &progress).await.unwrap();
        assert!(db.exists(&config).await.unwrap());

        db.fail(DatabaseOp::Restore);
        assert!(db.restore(&config, Path::new("/b/x.bak")).await.is_err());

        assert_eq!(
            db.calls(),
            vec![
                DatabaseCall::Exists,
                DatabaseCall::Create,
                DatabaseCall::Exists,
                DatabaseCall::Restore(PathBuf::from("/b/x.bak")),
            ]
        );
    }

    #[tokio::test]
    async fn certificates_report_issuing_path() {
        let certs = MockCertificates::new();
        let result = certs.create_self_signed("a.local").await.unwrap();

        assert_eq!(result.certificate_type, CertificateType::SelfSigned);
        assert_eq!(result.thumbprint, "MOCKSELF_SIGNED");
        assert_eq!(
            certs.calls(),
            vec![CertificateCall::SelfSigned("a.local".to_owned())]
        );
    }

    #[tokio::test]
    async fn audit_keeps_order() {
        let audit = MemoryAudit::new();
        let data = serde_json::json!({ "k": 1 });
        audit
            .log_event("a", None, "create", "id", &data)
            .await
            .unwrap();
        audit
            .log_event("b", None, "update", "id", &data)
            .await
            .unwrap();

        assert_eq!(audit.event_types(), vec!["a", "b"]);
    }
}
