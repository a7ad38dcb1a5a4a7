//! Local web-hosting driver for Sitecast.
//!
//! This crate owns everything that touches the local hosting engine:
//!
//! - **Engine readiness**: detecting the engine and installing its features
//!   once per process
//! - **Process pools and sites**: idempotent remove-then-recreate of pools,
//!   sites and their bindings
//! - **File synchronisation**: the stop, backup, clear, copy, permission and
//!   start procedure, with progress reporting
//! - **Name resolution**: registering site domains in the hosts file
//!
//! # File synchronisation
//!
//! ```text
//! validate ─▶ stop ─▶ backup ─▶ clear ─▶ copy ─▶ permissions ─▶ start
//!   10%       20%      30%       50%     80%        90%          100%
//! ```
//!
//! Stop, backup, clear and permissions are best-effort and degrade to
//! warnings. Validation, copy and start are fatal.

#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod hosts;
pub mod progress;
pub mod readiness;
pub mod sync;

pub use command::{CommandInstaller, CommandRunner, FeatureInstaller};
pub use config::{
    pool_name_for, site_name_for, Binding, CertificateAttachPolicy, FileDeployConfig,
    PipelineMode, PoolConfig, PoolIdentity, Protocol, SiteConfig, NO_MANAGED_CODE,
};
pub use driver::{SiteDriver, SiteReport};
pub use engine::{AppCmdEngine, EngineOp, HostingEngine, MemoryEngine, ObjectState, SiteInfo};
pub use error::{HostingError, HostingResult};
pub use hosts::{HostsFile, HostsResolver};
pub use progress::{CollectingProgress, ProgressInfo, ProgressSink, Severity, TracingProgress};
pub use readiness::EngineReadiness;
pub use sync::{StepOutcome, StepStatus, SyncReport, SyncStep};
