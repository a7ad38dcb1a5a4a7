//! Common test utilities for deployment integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use sitecast_control::collaborators::mock::MockCollaborators;
use sitecast_control::{ControlConfig, DeploymentManager, EngineKind, MemoryStore};
use sitecast_hosting::{CommandInstaller, EngineReadiness, HostsFile, MemoryEngine, SiteDriver};
use tempfile::TempDir;

/// A deployment manager wired to in-memory doubles and a scratch directory.
pub struct TestDeployer {
    pub manager: DeploymentManager,
    pub engine: Arc<MemoryEngine>,
    pub store: Arc<MemoryStore>,
    pub mocks: MockCollaborators,
    pub dir: TempDir,
}

impl TestDeployer {
    pub fn new() -> Self {
        Self::with_mocks(MockCollaborators::new())
    }

    pub fn with_mocks(mocks: MockCollaborators) -> Self {
        Self::build(mocks, |_| {})
    }

    /// Build with a config hook applied after the scratch paths are set.
    pub fn build(mocks: MockCollaborators, configure: impl FnOnce(&mut ControlConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut config = ControlConfig::default();
        config.hosting.engine = EngineKind::Memory;
        config.hosting.sites_root = dir.path().join("sites");
        config.hosting.backup_root = dir.path().join("backups");
        config.hosting.hosts_file = Some(dir.path().join("hosts"));
        config.hosting.settle_interval_ms = 0;
        config.database.backup_dir = dir.path().join("db-backups");
        configure(&mut config);

        let engine = Arc::new(MemoryEngine::new());
        let driver = SiteDriver::new(
            engine.clone(),
            Arc::new(CommandInstaller::new("true", Vec::new())),
            Arc::new(HostsFile::new(dir.path().join("hosts"))),
            Arc::new(EngineReadiness::new()),
        );

        let store = Arc::new(MemoryStore::new());
        let manager = DeploymentManager::new(
            store.clone(),
            store.clone(),
            Arc::new(driver),
            mocks.collaborators(),
            config,
        );

        Self {
            manager,
            engine,
            store,
            mocks,
            dir,
        }
    }

    pub fn sites_root(&self) -> PathBuf {
        self.dir.path().join("sites")
    }

    pub fn hosts_contents(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("hosts")).unwrap_or_default()
    }
}

impl Default for TestDeployer {
    fn default() -> Self {
        Self::new()
    }
}
