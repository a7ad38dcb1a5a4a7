//! Hosting-engine abstraction.
//!
//! The engine's registry of process pools and sites is the source of truth;
//! nothing here caches it. [`AppCmdEngine`] drives a real engine through its
//! command-line administration tool, [`MemoryEngine`] keeps the registry in
//! memory for tests.

mod appcmd;
mod memory;

pub use appcmd::AppCmdEngine;
pub use memory::{EngineOp, MemoryEngine};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Binding, PoolConfig};
use crate::error::HostingResult;

/// Running state of a site or pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    Started,
    Stopped,
    Unknown,
}

impl ObjectState {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "started" | "starting" => Self::Started,
            "stopped" | "stopping" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of a site as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,
    pub state: ObjectState,
    pub pool_name: Option<String>,
    pub pool_state: ObjectState,
    pub physical_path: Option<PathBuf>,
    pub bindings: Vec<Binding>,
}

/// Primitive operations on a hosting engine.
///
/// The driver composes these into idempotent remove-then-recreate
/// procedures; implementations do not need to be idempotent themselves.
#[async_trait]
pub trait HostingEngine: Send + Sync {
    /// Whether the engine is installed and reachable.
    async fn is_installed(&self) -> HostingResult<bool>;

    async fn pool_exists(&self, name: &str) -> HostingResult<bool>;

    /// Create a pool. Returns `PoolConfiguration` if the engine rejects
    /// the runtime/pipeline combination.
    async fn create_pool(&self, config: &PoolConfig) -> HostingResult<()>;

    async fn delete_pool(&self, name: &str) -> HostingResult<()>;

    async fn site_exists(&self, name: &str) -> HostingResult<bool>;

    /// Create a site rooted at `physical_path` running under `pool_name`.
    async fn create_site(
        &self,
        name: &str,
        physical_path: &Path,
        pool_name: &str,
    ) -> HostingResult<()>;

    async fn delete_site(&self, name: &str) -> HostingResult<()>;

    /// Remove every binding from a site.
    async fn clear_bindings(&self, site: &str) -> HostingResult<()>;

    async fn add_binding(&self, site: &str, binding: &Binding) -> HostingResult<()>;

    /// Attach a certificate, by thumbprint, to an HTTPS binding.
    async fn attach_certificate(
        &self,
        site: &str,
        binding: &Binding,
        thumbprint: &str,
    ) -> HostingResult<()>;

    async fn start_site(&self, name: &str) -> HostingResult<()>;

    async fn stop_site(&self, name: &str) -> HostingResult<()>;

    /// Grant `identity` modify rights on `path`, recursively.
    async fn grant_modify(&self, path: &Path, identity: &str) -> HostingResult<()>;

    async fn list_sites(&self) -> HostingResult<Vec<SiteInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_state_parse() {
        assert_eq!(ObjectState::parse("Started"), ObjectState::Started);
        assert_eq!(ObjectState::parse(" stopped "), ObjectState::Stopped);
        assert_eq!(ObjectState::parse("Unknown"), ObjectState::Unknown);
        assert_eq!(ObjectState::parse(""), ObjectState::Unknown);
    }
}
