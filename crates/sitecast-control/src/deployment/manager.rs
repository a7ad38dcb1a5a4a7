//! Core deployment orchestration logic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use sitecast_hosting::{
    CollectingProgress, FileDeployConfig, PoolConfig, ProgressInfo, ProgressSink, Severity,
    SiteConfig, SiteDriver, TracingProgress,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::certificates;
use crate::collaborators::Collaborators;
use crate::config::ControlConfig;
use crate::database;
use crate::error::{ControlError, ControlResult};
use crate::profile::DeploymentRequest;
use crate::resolver::ConfigurationResolver;
use crate::state::{self, StatusEvent};
use crate::store::{DeploymentFilter, DeploymentStore, ProfileStore};
use crate::types::{DeploymentId, DeploymentRecord, DeploymentStatus, LogLevel, TargetPlatform};

use super::{DeploymentResult, RollbackResult, StageResults};

/// Holds a site name in the running set until dropped.
struct TargetGuard<'a> {
    targets: &'a Mutex<HashSet<String>>,
    site: String,
}

impl Drop for TargetGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.remove(&self.site);
        }
    }
}

/// Forwards events to the caller's sink as they happen and keeps a copy
/// for the deployment log.
struct StageProgress<'a> {
    live: &'a dyn ProgressSink,
    collected: CollectingProgress,
}

impl ProgressSink for StageProgress<'_> {
    fn report(&self, info: ProgressInfo) {
        self.live.report(info.clone());
        self.collected.report(info);
    }
}

fn checkpoint(cancel: &CancellationToken) -> ControlResult<()> {
    if cancel.is_cancelled() {
        return Err(ControlError::Cancelled);
    }
    Ok(())
}

/// Orchestrates deployment, rollback and status queries.
pub struct DeploymentManager {
    store: Arc<dyn DeploymentStore>,
    resolver: ConfigurationResolver,
    driver: Arc<SiteDriver>,
    collaborators: Collaborators,
    config: ControlConfig,
    progress: Arc<dyn ProgressSink>,
    targets: Mutex<HashSet<String>>,
}

impl DeploymentManager {
    /// Create a new deployment manager.
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        profiles: Arc<dyn ProfileStore>,
        driver: Arc<SiteDriver>,
        collaborators: Collaborators,
        config: ControlConfig,
    ) -> Self {
        let resolver =
            ConfigurationResolver::new(store.clone(), profiles, config.hosting.sites_root.clone());
        Self {
            store,
            resolver,
            driver,
            collaborators,
            config,
            progress: Arc::new(TracingProgress),
            targets: Mutex::new(HashSet::new()),
        }
    }

    /// Send live progress of engine installation, database changes and file
    /// synchronisation to `progress` instead of the tracing log.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn driver(&self) -> &Arc<SiteDriver> {
        &self.driver
    }

    /// Make the hosting engine ready ahead of any deployment.
    ///
    /// Deployments also check readiness, but that check is free once this
    /// has succeeded.
    pub async fn bootstrap(&self, progress: &dyn ProgressSink) -> ControlResult<()> {
        self.driver.ensure_engine_ready(progress).await?;
        info!("hosting engine ready");
        Ok(())
    }

    /// Run a deployment end to end.
    ///
    /// Never fails: errors are reported through the returned result and
    /// the record's log. The record always ends in a terminal status.
    pub async fn deploy(
        &self,
        request: DeploymentRequest,
        cancel: &CancellationToken,
    ) -> DeploymentResult {
        let mut record = match self.resolver.resolve(request).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "deployment request rejected");
                return DeploymentResult::rejected(&e);
            }
        };

        let deployment_id = record.id.clone();
        info!(
            deployment_id = %deployment_id,
            site = %record.site_name,
            source = %record.source_path.display(),
            "starting deployment"
        );

        let guard = match self.lock_target(&record.site_name) {
            Ok(guard) => guard,
            Err(e) => {
                self.mark_failed(&mut record, &e).await;
                return DeploymentResult::from_record(&record, StageResults::default());
            }
        };

        let mut stages = StageResults::default();
        let outcome = match self.execute(&mut record, &mut stages, cancel).await {
            Ok(()) => self.complete(&mut record).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!(deployment_id = %deployment_id, error = %e, "deployment failed");
            self.mark_failed(&mut record, &e).await;

            let auto_rollback = record
                .database
                .as_ref()
                .is_some_and(|db| db.auto_rollback_on_failure);
            if auto_rollback {
                if let Err(rollback_error) = self.rollback_record(&mut record).await {
                    self.log(
                        &mut record,
                        LogLevel::Error,
                        "automatic rollback failed",
                        Some(rollback_error.to_string()),
                    )
                    .await;
                }
            }
        }

        self.persist(&record).await;
        drop(guard);

        info!(
            deployment_id = %deployment_id,
            status = %record.status,
            duration_ms = ?record.duration_ms,
            "deployment finished"
        );
        DeploymentResult::from_record(&record, stages)
    }

    async fn execute(
        &self,
        record: &mut DeploymentRecord,
        stages: &mut StageResults,
        cancel: &CancellationToken,
    ) -> ControlResult<()> {
        checkpoint(cancel)?;
        self.advance(record, StatusEvent::Start).await?;
        let message = format!("deploying {} to {}", record.name, record.target_url());
        self.log(record, LogLevel::Info, message, None).await;
        let started = json!({
            "site": record.site_name,
            "domain": record.domain_name,
            "environment": record.environment,
            "target": record.target_platform,
        });
        self.audit(record, "deployment.started", "deploy", started)
            .await;

        if record.target_platform == TargetPlatform::CloudVm {
            checkpoint(cancel)?;
            let environment = self.collaborators.cloud.detect_environment().await?;
            record.cloud_provider = environment.provider;
            record.public_ip = environment.public_ip;
            let message = format!(
                "cloud environment: {} ({})",
                record.cloud_provider.as_deref().unwrap_or("none"),
                record.public_ip.as_deref().unwrap_or("no public address")
            );
            self.log(record, LogLevel::Info, message, None).await;
        }

        checkpoint(cancel)?;
        self.discover(record).await?;

        checkpoint(cancel)?;
        let progress = self.stage_progress();
        let ready = self.driver.ensure_engine_ready(&progress).await;
        self.drain(record, &progress).await;
        ready?;

        if let Some(db) = record.database.clone() {
            checkpoint(cancel)?;
            self.advance(record, StatusEvent::DeployDatabase).await?;

            let service = self.collaborators.database.as_ref();
            let snapshot =
                database::backup_database(service, &db, &self.config.database.backup_dir).await?;
            if let Some(path) = &snapshot.backup_path {
                record.database_backup_path = Some(path.clone());
                self.store.update(record).await?;
                let message = format!("database backed up to {}", path.display());
                self.log(record, LogLevel::Info, message, None).await;
            }

            let progress = self.stage_progress();
            let result = database::apply_database_changes(
                service,
                &db,
                &snapshot,
                &record.source_path,
                &progress,
            )
            .await;
            self.drain(record, &progress).await;
            let result = result?;

            let message = format!(
                "database {} ready on {} ({} scripts)",
                result.database_name, result.server_name, result.scripts_executed
            );
            self.log(record, LogLevel::Info, message, None).await;
            stages.database = Some(result);
        }

        if let Some(ssl) = record.ssl.clone() {
            checkpoint(cancel)?;
            self.advance(record, StatusEvent::ConfigureSsl).await?;

            let certificate = certificates::configure_ssl(
                self.collaborators.certificates.as_ref(),
                &ssl,
                &record.domain_name,
            )
            .await?;

            record.certificate_thumbprint = Some(certificate.thumbprint.clone());
            record.certificate_expiry = Some(certificate.expiry_date);
            self.store.update(record).await?;
            let message = format!(
                "{} certificate {} expires {}",
                certificate.certificate_type, certificate.thumbprint, certificate.expiry_date
            );
            self.log(record, LogLevel::Info, message, None).await;
            stages.certificate = Some(certificate);
        }

        checkpoint(cancel)?;
        self.advance(record, StatusEvent::DeployApplication).await?;
        self.deploy_application(record).await?;

        if record.run_health_checks {
            checkpoint(cancel)?;
            self.advance(record, StatusEvent::RunHealthChecks).await?;

            let summary = self.collaborators.health.run_all_checks(record).await?;
            record.health_checks.extend(summary.results.iter().cloned());
            let level = if summary.all_healthy {
                LogLevel::Info
            } else {
                LogLevel::Warning
            };
            let message = format!(
                "health checks: {} healthy, {} degraded, {} unhealthy of {}",
                summary.healthy, summary.degraded, summary.unhealthy, summary.total
            );
            self.log(record, level, message, None).await;
            stages.health = Some(summary);
        }

        Ok(())
    }

    async fn discover(&self, record: &mut DeploymentRecord) -> ControlResult<()> {
        let discovery = self
            .collaborators
            .discovery
            .discover(&record.source_path)
            .await?;

        record.application_type = Some(discovery.detected_type.clone());
        if let Some(version) = discovery.framework_version {
            record
                .metadata
                .insert("framework_version".to_owned(), version);
        }
        let message = format!("detected application type {}", discovery.detected_type);
        self.log(record, LogLevel::Info, message, None).await;

        if !discovery.warnings.is_empty() {
            self.advance(record, StatusEvent::ValidationWarnings)
                .await?;
            for warning in discovery.warnings {
                self.log(record, LogLevel::Warning, warning, None).await;
            }
        }
        for recommendation in discovery.recommendations {
            self.log(record, LogLevel::Info, recommendation, None).await;
        }
        Ok(())
    }

    async fn deploy_application(&self, record: &mut DeploymentRecord) -> ControlResult<()> {
        let deployment = &self.config.deployment;
        let hosting = &self.config.hosting;

        let pool = PoolConfig::new(&record.app_pool_name)
            .with_runtime(&record.runtime_version)
            .with_pipeline(record.pipeline_mode)
            .with_idle_timeout(Duration::from_secs(deployment.idle_timeout_minutes * 60))
            .with_always_running(deployment.always_running);

        let mut site = SiteConfig::for_domain(&record.domain_name, &record.physical_path)
            .with_ports(record.http_port, record.https_port)
            .with_attach_policy(deployment.certificate_attach_policy);
        if let Some(thumbprint) = &record.certificate_thumbprint {
            site = site.with_certificate(thumbprint);
        }

        self.driver.create_or_replace_pool(&pool).await?;
        let site_report = self.driver.create_or_replace_site(&site).await?;
        for warning in site_report.warnings {
            self.log(record, LogLevel::Warning, warning, None).await;
        }

        let stop = record.strategy.stops_site() && deployment.stop_before_deploy;
        let settle = if stop {
            hosting.settle_interval()
        } else {
            Duration::ZERO
        };
        let files = FileDeployConfig::new(
            &record.site_name,
            &record.source_path,
            &record.physical_path,
        )
        .with_stop_site(stop)
        .with_backup(deployment.backup_before_deploy, &hosting.backup_root)
        .with_excludes(deployment.exclude_patterns.clone())
        .with_identity(&hosting.app_identity)
        .with_settle_interval(settle);

        let progress = self.stage_progress();
        let report = self.driver.deploy_files(&files, &progress).await;
        self.drain(record, &progress).await;
        let report = report?;

        if let Some(backup) = &report.backup_path {
            record
                .metadata
                .insert("file_backup_path".to_owned(), backup.display().to_string());
        }
        record
            .metadata
            .insert("files_copied".to_owned(), report.files_copied.to_string());
        for warning in &report.warnings {
            self.log(record, LogLevel::Warning, warning.clone(), None).await;
        }

        let message = format!(
            "deployed {} files to {} ({} excluded, {} warnings)",
            report.files_copied,
            record.physical_path.display(),
            report.entries_excluded,
            report.warnings.len()
        );
        self.log(record, LogLevel::Info, message, None).await;
        Ok(())
    }

    async fn complete(&self, record: &mut DeploymentRecord) -> ControlResult<()> {
        record.rollback_command = Some(format!("sitecast rollback --id {}", record.id));
        self.advance(record, StatusEvent::Succeed).await?;

        let message = format!("deployment succeeded: {}", record.target_url());
        self.log(record, LogLevel::Info, message, None).await;
        let data = json!({
            "url": record.target_url(),
            "duration_ms": record.duration_ms,
        });
        self.audit(record, "deployment.succeeded", "deploy", data)
            .await;
        Ok(())
    }

    async fn mark_failed(&self, record: &mut DeploymentRecord, error: &ControlError) {
        record.error_message = Some(error.to_string());
        if let Err(e) = record.apply(StatusEvent::Fail) {
            warn!(deployment_id = %record.id, error = %e, "could not mark deployment failed");
        }

        self.log(
            record,
            LogLevel::Error,
            "deployment failed",
            Some(format!("{error:?}")),
        )
        .await;
        let data = json!({
            "error": error.to_string(),
            "status": record.status,
            "duration_ms": record.duration_ms,
        });
        self.audit(record, "deployment.failed", "deploy", data)
            .await;
        self.persist(record).await;
    }

    /// Undo a deployment: restore the database backup and remove the site.
    ///
    /// Never fails: errors are reported through the returned result.
    pub async fn rollback(&self, id: &DeploymentId, cancel: &CancellationToken) -> RollbackResult {
        if cancel.is_cancelled() {
            return RollbackResult::failed(id, None, &ControlError::Cancelled);
        }

        let mut record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let e = ControlError::DeploymentNotFound(id.to_string());
                warn!(deployment_id = %id, "rollback requested for unknown deployment");
                return RollbackResult::failed(id, None, &e);
            }
            Err(e) => {
                error!(deployment_id = %id, error = %e, "failed to load deployment");
                return RollbackResult::failed(id, None, &e);
            }
        };

        let result = match self.lock_target(&record.site_name) {
            Ok(_guard) => self.rollback_record(&mut record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => RollbackResult::succeeded(&record),
            Err(e) => {
                error!(deployment_id = %id, error = %e, "rollback failed");
                self.log(
                    &mut record,
                    LogLevel::Error,
                    "rollback failed",
                    Some(e.to_string()),
                )
                .await;
                self.persist(&record).await;
                RollbackResult::failed(id, Some(record.status), &e)
            }
        }
    }

    async fn rollback_record(&self, record: &mut DeploymentRecord) -> ControlResult<()> {
        // refuse before undoing anything
        state::transition(record.status, StatusEvent::RollBack)?;
        self.log(record, LogLevel::Warning, "rolling back deployment", None)
            .await;

        if let (Some(db), Some(path)) = (&record.database, &record.database_backup_path) {
            self.collaborators.database.restore(db, path).await?;
            let message = format!("database restored from {}", path.display());
            self.log(record, LogLevel::Info, message, None).await;
        }

        if !record.site_name.is_empty() {
            let removed = self.driver.remove_site(&record.site_name).await?;
            if removed {
                let message = format!("site {} removed", record.site_name);
                self.log(record, LogLevel::Info, message, None).await;
            }
        }

        self.advance(record, StatusEvent::RollBack).await?;
        let data = json!({
            "site": record.site_name,
            "database_backup": record.database_backup_path,
        });
        self.audit(record, "deployment.rolled_back", "rollback", data)
            .await;
        self.persist(record).await;
        info!(deployment_id = %record.id, "deployment rolled back");
        Ok(())
    }

    /// Current status of a deployment.
    pub async fn get_status(&self, id: &DeploymentId) -> ControlResult<DeploymentStatus> {
        self.store
            .get(id)
            .await?
            .map(|record| record.status)
            .ok_or_else(|| ControlError::DeploymentNotFound(id.to_string()))
    }

    /// Get a deployment record.
    pub async fn get(&self, id: &DeploymentId) -> ControlResult<Option<DeploymentRecord>> {
        self.store.get(id).await
    }

    /// Deployments that have not reached a terminal status.
    pub async fn get_active_deployments(&self) -> ControlResult<Vec<DeploymentRecord>> {
        self.store.list(&DeploymentFilter::active()).await
    }

    fn lock_target(&self, site: &str) -> ControlResult<Option<TargetGuard<'_>>> {
        if !self.config.deployment.serialize_targets {
            return Ok(None);
        }

        let mut targets = self
            .targets
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        if !targets.insert(site.to_owned()) {
            return Err(ControlError::TargetBusy(site.to_owned()));
        }

        Ok(Some(TargetGuard {
            targets: &self.targets,
            site: site.to_owned(),
        }))
    }

    async fn advance(
        &self,
        record: &mut DeploymentRecord,
        event: StatusEvent,
    ) -> ControlResult<()> {
        let from = record.status;
        let to = record.apply(event)?;
        debug!(deployment_id = %record.id, %from, %to, "status changed");
        self.store.update(record).await
    }

    async fn persist(&self, record: &DeploymentRecord) {
        if let Err(e) = self.store.update(record).await {
            warn!(deployment_id = %record.id, error = %e, "failed to persist deployment record");
        }
    }

    async fn log(
        &self,
        record: &mut DeploymentRecord,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<String>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Error => {
                error!(deployment_id = %record.id, error = ?error, "{message}");
            }
            LogLevel::Warning => warn!(deployment_id = %record.id, "{message}"),
            LogLevel::Info => info!(deployment_id = %record.id, "{message}"),
            LogLevel::Debug => debug!(deployment_id = %record.id, "{message}"),
        }

        if let Err(e) = self
            .collaborators
            .audit
            .log(&record.id, level, &message, error.as_deref())
            .await
        {
            debug!(error = %e, "audit log delivery failed");
        }
        record.push_log(level, message, error);
    }

    async fn audit(
        &self,
        record: &mut DeploymentRecord,
        event_type: &str,
        action: &str,
        data: serde_json::Value,
    ) {
        if let Err(e) = self
            .collaborators
            .audit
            .log_event(event_type, None, action, record.id.as_str(), &data)
            .await
        {
            warn!(deployment_id = %record.id, error = %e, "audit event delivery failed");
        }
        record.push_audit(event_type, action, data);
    }

    fn stage_progress(&self) -> StageProgress<'_> {
        StageProgress {
            live: self.progress.as_ref(),
            collected: CollectingProgress::new(),
        }
    }

    async fn drain(&self, record: &mut DeploymentRecord, progress: &StageProgress<'_>) {
        for event in progress.collected.events() {
            let level = match event.severity {
                Severity::Info => LogLevel::Info,
                Severity::Warning => LogLevel::Warning,
                Severity::Error => LogLevel::Error,
            };
            let message = format!("[{} {}%] {}", event.stage, event.percent, event.message);
            self.log(record, level, message, None).await;
        }
    }
}

impl std::fmt::Debug for DeploymentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentManager")
            .field("serialize_targets", &self.config.deployment.serialize_targets)
            .finish_non_exhaustive()
    }
}
