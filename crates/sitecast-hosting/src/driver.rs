//! Site lifecycle driver.
//!
//! Reconciles the engine's process pools and sites with a target
//! configuration and synchronises application files. The driver holds no
//! state of its own beyond the shared readiness latch; every mutating
//! operation is remove-then-recreate, so retrying an attempt converges on
//! the same engine state.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::FeatureInstaller;
use crate::config::{CertificateAttachPolicy, FileDeployConfig, PoolConfig, SiteConfig};
use crate::engine::{HostingEngine, SiteInfo};
use crate::error::{HostingError, HostingResult};
use crate::hosts::HostsResolver;
use crate::progress::{ProgressInfo, ProgressSink};
use crate::readiness::EngineReadiness;
use crate::sync::{self, StepOutcome, StepStatus, SyncReport, SyncStep};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Result of creating a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteReport {
    /// Whether a certificate is attached to an HTTPS binding.
    pub https_bound: bool,
    pub warnings: Vec<String>,
}

/// Drives pool and site lifecycle on a hosting engine.
pub struct SiteDriver {
    engine: Arc<dyn HostingEngine>,
    installer: Arc<dyn FeatureInstaller>,
    hosts: Arc<dyn HostsResolver>,
    readiness: Arc<EngineReadiness>,
}

impl SiteDriver {
    pub fn new(
        engine: Arc<dyn HostingEngine>,
        installer: Arc<dyn FeatureInstaller>,
        hosts: Arc<dyn HostsResolver>,
        readiness: Arc<EngineReadiness>,
    ) -> Self {
        Self {
            engine,
            installer,
            hosts,
            readiness,
        }
    }

    pub fn engine(&self) -> &Arc<dyn HostingEngine> {
        &self.engine
    }

    pub fn readiness(&self) -> &Arc<EngineReadiness> {
        &self.readiness
    }

    /// Make sure the engine is installed, installing it if necessary.
    ///
    /// A no-op once the shared readiness latch is set, so environment
    /// bootstrap can call this up front and deployments pay nothing.
    pub async fn ensure_engine_ready(&self, progress: &dyn ProgressSink) -> HostingResult<()> {
        if self.readiness.is_ready() {
            return Ok(());
        }

        let _guard = self.readiness.lock_init().await;
        if self.readiness.is_ready() {
            return Ok(());
        }

        if self.engine.is_installed().await? {
            debug!("hosting engine already installed");
        } else {
            info!("hosting engine not installed, installing");
            self.installer.install(progress).await?;

            if !self.engine.is_installed().await? {
                return Err(HostingError::EngineInstallFailed {
                    exit_code: Some(0),
                    message: "engine still unavailable after installation".to_string(),
                });
            }
        }

        self.readiness.mark_ready();
        Ok(())
    }

    /// Create the pool, removing any existing pool of the same name first.
    pub async fn create_or_replace_pool(&self, config: &PoolConfig) -> HostingResult<()> {
        if self.engine.pool_exists(&config.name).await? {
            info!(pool = %config.name, "removing existing process pool");
            self.engine.delete_pool(&config.name).await?;
        }

        self.engine.create_pool(config).await?;
        info!(
            pool = %config.name,
            runtime = %config.runtime_version,
            pipeline = %config.pipeline_mode,
            always_running = config.always_running,
            "process pool created"
        );
        Ok(())
    }

    /// Create the site, removing any existing site of the same name first.
    pub async fn create_or_replace_site(&self, config: &SiteConfig) -> HostingResult<SiteReport> {
        let mut report = SiteReport::default();

        if self.engine.site_exists(&config.name).await? {
            info!(site = %config.name, "removing existing site");
            self.engine.delete_site(&config.name).await?;
        }

        tokio::fs::create_dir_all(&config.physical_path).await?;

        self.engine
            .create_site(&config.name, &config.physical_path, &config.pool_name)
            .await?;
        self.engine.clear_bindings(&config.name).await?;
        self.engine
            .add_binding(&config.name, &config.http_binding())
            .await?;

        if let (true, Some(thumbprint)) = (config.enable_https, &config.certificate_thumbprint) {
            let binding = config.https_binding();
            self.engine.add_binding(&config.name, &binding).await?;

            match self
                .engine
                .attach_certificate(&config.name, &binding, thumbprint)
                .await
            {
                Ok(()) => report.https_bound = true,
                Err(e) if config.attach_policy == CertificateAttachPolicy::Warn => {
                    warn!(site = %config.name, error = %e, "certificate attach failed, site remains available over HTTP");
                    report
                        .warnings
                        .push(format!("certificate attach failed: {e}"));
                }
                Err(e) => return Err(e),
            }
        }

        if let Err(e) = self.hosts.register(&config.domain_name, LOOPBACK).await {
            warn!(domain = %config.domain_name, error = %e, "failed to register hosts mapping");
            report
                .warnings
                .push(format!("hosts registration failed: {e}"));
        }

        info!(
            site = %config.name,
            pool = %config.pool_name,
            path = %config.physical_path.display(),
            https = report.https_bound,
            "site created"
        );
        Ok(report)
    }

    /// Synchronise application files into the site's directory.
    pub async fn deploy_files(
        &self,
        config: &FileDeployConfig,
        progress: &dyn ProgressSink,
    ) -> HostingResult<SyncReport> {
        let mut report = SyncReport::new();
        let emit = |step: SyncStep, message: String| {
            progress.report(ProgressInfo::info(step.as_str(), step.percent(), message));
        };

        // 1. validate
        let outcome = if !tokio::fs::try_exists(&config.source).await.unwrap_or(false) {
            StepOutcome::Fatal(HostingError::SourceNotFound(config.source.clone()))
        } else if sync::paths_overlap(&config.destination, &config.source) {
            StepOutcome::Fatal(HostingError::PathOverlap {
                first: config.destination.clone(),
                second: config.source.clone(),
            })
        } else if config.backup && sync::paths_overlap(&config.backup_root, &config.destination) {
            StepOutcome::Fatal(HostingError::PathOverlap {
                first: config.backup_root.clone(),
                second: config.destination.clone(),
            })
        } else {
            StepOutcome::Ok
        };
        report.record(SyncStep::Validate, outcome)?;
        emit(SyncStep::Validate, format!("source {} found", config.source.display()));

        // 2. stop and settle
        let outcome = if config.stop_site {
            let outcome = StepOutcome::best_effort(
                self.engine.stop_site(&config.site_name).await,
                "failed to stop site",
            );
            tokio::time::sleep(config.settle_interval).await;
            outcome
        } else {
            StepOutcome::Skipped
        };
        let message = match report.record(SyncStep::StopSite, outcome)? {
            StepStatus::Ok => format!("site {} stopped", config.site_name),
            StepStatus::Skipped => format!("site {} left running", config.site_name),
            StepStatus::Warning => format!("site {} could not be stopped", config.site_name),
        };
        emit(SyncStep::StopSite, message);

        // 3. backup
        let destination_exists = tokio::fs::try_exists(&config.destination)
            .await
            .unwrap_or(false);
        let outcome = if config.backup && destination_exists {
            let destination = config.destination.clone();
            let root = config.backup_root.clone();
            let site = config.site_name.clone();
            let result = tokio::task::spawn_blocking(move || {
                sync::backup_directory(&destination, &root, &site)
            })
            .await
            .map_err(|e| HostingError::engine(format!("backup task failed: {e}")))
            .and_then(|r| r);
            match result {
                Ok(path) => {
                    info!(backup = %path.display(), "destination backed up");
                    report.backup_path = Some(path);
                    StepOutcome::Ok
                }
                Err(e) => StepOutcome::Warning(format!("backup failed, continuing without: {e}")),
            }
        } else {
            StepOutcome::Skipped
        };
        report.record(SyncStep::Backup, outcome)?;
        emit(SyncStep::Backup, "backup step finished".to_string());

        // 4. clear
        tokio::fs::create_dir_all(&config.destination).await?;
        let destination = config.destination.clone();
        let failures = tokio::task::spawn_blocking(move || sync::clear_directory(&destination))
            .await
            .map_err(|e| HostingError::engine(format!("clear task failed: {e}")))??;
        let outcome = if failures.is_empty() {
            StepOutcome::Ok
        } else {
            StepOutcome::Warning(failures.join("; "))
        };
        report.record(SyncStep::Clear, outcome)?;
        emit(SyncStep::Clear, "destination cleared".to_string());

        // 5. copy
        let source = config.source.clone();
        let destination = config.destination.clone();
        let patterns = config.exclude_patterns.clone();
        let copied = tokio::task::spawn_blocking(move || {
            sync::copy_tree(&source, &destination, &patterns)
        })
        .await
        .map_err(|e| HostingError::engine(format!("copy task failed: {e}")))
        .and_then(|r| r);
        let outcome = match copied {
            Ok(stats) => {
                report.files_copied = stats.files;
                report.entries_excluded = stats.excluded;
                StepOutcome::Ok
            }
            Err(e) => StepOutcome::Fatal(e),
        };
        report.record(SyncStep::Copy, outcome)?;
        emit(
            SyncStep::Copy,
            format!(
                "copied {} files ({} entries excluded)",
                report.files_copied, report.entries_excluded
            ),
        );

        // 6. permissions
        let outcome = StepOutcome::best_effort(
            self.engine
                .grant_modify(&config.destination, &config.app_identity)
                .await,
            "failed to set permissions",
        );
        report.record(SyncStep::Permissions, outcome)?;
        emit(
            SyncStep::Permissions,
            format!("granted modify rights to {}", config.app_identity),
        );

        // 7. start
        let outcome = StepOutcome::required(self.engine.start_site(&config.site_name).await);
        report.record(SyncStep::StartSite, outcome)?;
        emit(SyncStep::StartSite, format!("site {} started", config.site_name));

        info!(
            site = %config.site_name,
            files = report.files_copied,
            warnings = report.warnings.len(),
            "file deployment complete"
        );
        Ok(report)
    }

    /// Remove a site, and its pool if no other site uses it.
    ///
    /// Returns `false` if the site did not exist.
    pub async fn remove_site(&self, name: &str) -> HostingResult<bool> {
        let sites = self.engine.list_sites().await?;
        let Some(site) = sites.iter().find(|s| s.name == name) else {
            debug!(site = %name, "site not present, nothing to remove");
            return Ok(false);
        };

        self.engine.delete_site(name).await?;
        info!(site = %name, "site removed");

        if let Some(pool) = &site.pool_name {
            let shared = sites
                .iter()
                .any(|s| s.name != name && s.pool_name.as_deref() == Some(pool.as_str()));
            if shared {
                debug!(pool = %pool, "process pool still in use, keeping it");
            } else if self.engine.pool_exists(pool).await? {
                self.engine.delete_pool(pool).await?;
                info!(pool = %pool, "process pool removed");
            }
        }

        Ok(true)
    }

    /// Remove a pool if it exists and no site references it.
    pub async fn remove_pool_if_orphaned(&self, pool: &str) -> HostingResult<bool> {
        if !self.engine.pool_exists(pool).await? {
            return Ok(false);
        }
        let in_use = self
            .engine
            .list_sites()
            .await?
            .iter()
            .any(|s| s.pool_name.as_deref() == Some(pool));
        if in_use {
            return Ok(false);
        }
        self.engine.delete_pool(pool).await?;
        info!(pool = %pool, "orphaned process pool removed");
        Ok(true)
    }

    /// Snapshot of every site known to the engine.
    pub async fn list_sites(&self) -> HostingResult<Vec<SiteInfo>> {
        self.engine.list_sites().await
    }
}

impl std::fmt::Debug for SiteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteDriver")
            .field("ready", &self.readiness.is_ready())
            .finish_non_exhaustive()
    }
}
