//! In-memory hosting engine for testing.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::config::{Binding, PipelineMode, PoolConfig};
use crate::error::{HostingError, HostingResult};

use super::{HostingEngine, ObjectState, SiteInfo};

/// Engine operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    CreatePool,
    CreateSite,
    AddBinding,
    AttachCertificate,
    StartSite,
    StopSite,
    GrantModify,
}

#[derive(Debug, Clone)]
struct PoolEntry {
    config: PoolConfig,
    state: ObjectState,
}

#[derive(Debug, Clone)]
struct SiteEntry {
    physical_path: PathBuf,
    pool_name: String,
    state: ObjectState,
    bindings: Vec<Binding>,
    certificates: BTreeMap<u16, String>,
}

#[derive(Debug, Default)]
struct Registry {
    pools: BTreeMap<String, PoolEntry>,
    sites: BTreeMap<String, SiteEntry>,
}

/// Hosting engine that keeps its registry in memory.
///
/// Mirrors the rules of a real engine closely enough for the driver's
/// procedures to be exercised: names are unique, a classic pipeline needs a
/// managed runtime, and deleting a pool leaves any site that uses it
/// pointing at the missing pool until a pool of that name is recreated.
#[derive(Debug)]
pub struct MemoryEngine {
    installed: AtomicBool,
    registry: RwLock<Registry>,
    failures: Mutex<HashSet<EngineOp>>,
    journal: Mutex<Vec<String>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self {
            installed: AtomicBool::new(true),
            registry: RwLock::new(Registry::default()),
            failures: Mutex::new(HashSet::new()),
            journal: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine that reports itself as not yet installed.
    pub fn not_installed() -> Self {
        let engine = Self::default();
        engine.installed.store(false, Ordering::SeqCst);
        engine
    }

    pub fn set_installed(&self, installed: bool) {
        self.installed.store(installed, Ordering::SeqCst);
    }

    /// Make every subsequent call of `op` fail.
    pub fn fail(&self, op: EngineOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(op);
        }
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: EngineOp) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(&op);
        }
    }

    /// Every mutating call made so far, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    pub fn pool(&self, name: &str) -> Option<PoolConfig> {
        self.registry
            .read()
            .ok()?
            .pools
            .get(name)
            .map(|p| p.config.clone())
    }

    pub fn site_bindings(&self, name: &str) -> Option<Vec<Binding>> {
        self.registry
            .read()
            .ok()?
            .sites
            .get(name)
            .map(|s| s.bindings.clone())
    }

    pub fn site_certificate(&self, name: &str, port: u16) -> Option<String> {
        self.registry
            .read()
            .ok()?
            .sites
            .get(name)?
            .certificates
            .get(&port)
            .cloned()
    }

    pub fn pool_count(&self) -> usize {
        self.registry.read().map(|r| r.pools.len()).unwrap_or(0)
    }

    pub fn site_count(&self) -> usize {
        self.registry.read().map(|r| r.sites.len()).unwrap_or(0)
    }

    fn record(&self, entry: String) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(entry);
        }
    }

    fn check(&self, op: EngineOp) -> HostingResult<()> {
        let failing = self
            .failures
            .lock()
            .map_err(|_| HostingError::engine("lock poisoned"))?
            .contains(&op);
        if failing {
            return Err(HostingError::engine(format!("injected failure: {op:?}")));
        }
        Ok(())
    }

    fn write(&self) -> HostingResult<std::sync::RwLockWriteGuard<'_, Registry>> {
        self.registry
            .write()
            .map_err(|_| HostingError::engine("lock poisoned"))
    }

    fn read(&self) -> HostingResult<std::sync::RwLockReadGuard<'_, Registry>> {
        self.registry
            .read()
            .map_err(|_| HostingError::engine("lock poisoned"))
    }

    fn with_site<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SiteEntry) -> R,
    ) -> HostingResult<R> {
        let mut registry = self.write()?;
        let site = registry
            .sites
            .get_mut(name)
            .ok_or_else(|| HostingError::SiteNotFound(name.to_string()))?;
        Ok(f(site))
    }
}

#[async_trait]
impl HostingEngine for MemoryEngine {
    async fn is_installed(&self) -> HostingResult<bool> {
        Ok(self.installed.load(Ordering::SeqCst))
    }

    async fn pool_exists(&self, name: &str) -> HostingResult<bool> {
        Ok(self.read()?.pools.contains_key(name))
    }

    async fn create_pool(&self, config: &PoolConfig) -> HostingResult<()> {
        self.check(EngineOp::CreatePool)?;

        if config.pipeline_mode == PipelineMode::Classic && !config.is_managed() {
            return Err(HostingError::PoolConfiguration(format!(
                "pool {}: classic pipeline requires a managed runtime",
                config.name
            )));
        }

        let mut registry = self.write()?;
        if registry.pools.contains_key(&config.name) {
            return Err(HostingError::engine(format!(
                "pool {} already exists",
                config.name
            )));
        }
        registry.pools.insert(
            config.name.clone(),
            PoolEntry {
                config: config.clone(),
                state: ObjectState::Started,
            },
        );
        drop(registry);

        self.record(format!("create_pool {}", config.name));
        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> HostingResult<()> {
        // sites keep referring to a deleted pool until it is recreated
        let mut registry = self.write()?;
        if registry.pools.remove(name).is_none() {
            return Err(HostingError::engine(format!("pool not found: {name}")));
        }
        drop(registry);

        self.record(format!("delete_pool {name}"));
        Ok(())
    }

    async fn site_exists(&self, name: &str) -> HostingResult<bool> {
        Ok(self.read()?.sites.contains_key(name))
    }

    async fn create_site(
        &self,
        name: &str,
        physical_path: &Path,
        pool_name: &str,
    ) -> HostingResult<()> {
        self.check(EngineOp::CreateSite)?;

        let mut registry = self.write()?;
        if registry.sites.contains_key(name) {
            return Err(HostingError::engine(format!("site {name} already exists")));
        }
        if !registry.pools.contains_key(pool_name) {
            return Err(HostingError::engine(format!("pool not found: {pool_name}")));
        }
        registry.sites.insert(
            name.to_string(),
            SiteEntry {
                physical_path: physical_path.to_path_buf(),
                pool_name: pool_name.to_string(),
                state: ObjectState::Stopped,
                // a freshly created site carries the engine's default binding
                bindings: vec![Binding::http(80, "")],
                certificates: BTreeMap::new(),
            },
        );
        drop(registry);

        self.record(format!("create_site {name}"));
        Ok(())
    }

    async fn delete_site(&self, name: &str) -> HostingResult<()> {
        if self.write()?.sites.remove(name).is_none() {
            return Err(HostingError::SiteNotFound(name.to_string()));
        }
        self.record(format!("delete_site {name}"));
        Ok(())
    }

    async fn clear_bindings(&self, site: &str) -> HostingResult<()> {
        self.with_site(site, |s| {
            s.bindings.clear();
            s.certificates.clear();
        })?;
        self.record(format!("clear_bindings {site}"));
        Ok(())
    }

    async fn add_binding(&self, site: &str, binding: &Binding) -> HostingResult<()> {
        self.check(EngineOp::AddBinding)?;
        self.with_site(site, |s| {
            if !s.bindings.contains(binding) {
                s.bindings.push(binding.clone());
            }
        })?;
        self.record(format!("add_binding {site} {binding}"));
        Ok(())
    }

    async fn attach_certificate(
        &self,
        site: &str,
        binding: &Binding,
        thumbprint: &str,
    ) -> HostingResult<()> {
        self.check(EngineOp::AttachCertificate)
            .map_err(|e| HostingError::CertificateAttach(e.to_string()))?;
        self.with_site(site, |s| {
            s.certificates.insert(binding.port, thumbprint.to_string());
        })?;
        self.record(format!("attach_certificate {site} {}", binding.port));
        Ok(())
    }

    async fn start_site(&self, name: &str) -> HostingResult<()> {
        self.check(EngineOp::StartSite)?;
        self.with_site(name, |s| s.state = ObjectState::Started)?;
        self.record(format!("start_site {name}"));
        Ok(())
    }

    async fn stop_site(&self, name: &str) -> HostingResult<()> {
        self.check(EngineOp::StopSite)?;
        self.with_site(name, |s| s.state = ObjectState::Stopped)?;
        self.record(format!("stop_site {name}"));
        Ok(())
    }

    async fn grant_modify(&self, path: &Path, identity: &str) -> HostingResult<()> {
        self.check(EngineOp::GrantModify)?;
        self.record(format!("grant_modify {} {identity}", path.display()));
        Ok(())
    }

    async fn list_sites(&self) -> HostingResult<Vec<SiteInfo>> {
        let registry = self.read()?;
        Ok(registry
            .sites
            .iter()
            .map(|(name, site)| SiteInfo {
                name: name.clone(),
                state: site.state,
                pool_name: Some(site.pool_name.clone()),
                pool_state: registry
                    .pools
                    .get(&site.pool_name)
                    .map_or(ObjectState::Unknown, |p| p.state),
                physical_path: Some(site.physical_path.clone()),
                bindings: site.bindings.clone(),
            })
            .collect())
    }
}
