//! Sitecast deployment orchestration.
//!
//! This crate turns a deployment request into a running local site. It
//! resolves the request against an optional profile, drives the deployment
//! record through its stages and compensates when a stage fails.
//!
//! # Architecture
//!
//! - **Resolution**: request values override profile values, which override
//!   hard defaults ([`ConfigurationResolver`])
//! - **Orchestration**: cloud detection, discovery, engine readiness,
//!   database, certificate, application and health stages
//!   ([`DeploymentManager`])
//! - **Hosting**: pools, sites, bindings and file synchronisation are
//!   delegated to [`sitecast_hosting::SiteDriver`]
//! - **Collaborators**: discovery, database tooling, certificate issuance,
//!   health probes, cloud detection and audit delivery sit behind traits in
//!   [`collaborators`]
//!
//! # State Machine
//!
//! ```text
//! Pending ──▶ InProgress ──▶ DatabaseDeploying ──▶ ConfiguringSsl ──▶ AppDeploying
//!                 │                                                      │
//!                 ▼                                                      ▼
//!          ValidationFailed                                   RunningHealthChecks
//!                                                                        │
//!   any non-terminal ──▶ Failed ──▶ RolledBack ◀── Success ◀─────────────┘
//! ```
//!
//! Stages that do not apply are skipped. `Success`, `Failed` and
//! `RolledBack` are terminal; only an explicit rollback leaves `Failed` or
//! `Success`.

#![forbid(unsafe_code)]

pub mod certificates;
pub mod collaborators;
pub mod config;
pub mod database;
pub mod deployment;
pub mod error;
pub mod profile;
pub mod resolver;
pub mod state;
pub mod store;
pub mod strategy;
pub mod types;

// Re-export commonly used types at the crate root
pub use collaborators::{
    AuditLog, CertificateResult, CertificateService, CloudService, Collaborators,
    DatabaseService, DiscoveryService, HealthService, HealthSummary, TracingAudit,
};
pub use config::{ControlConfig, DatabaseDefaults, DeploymentConfig, EngineKind, HostingConfig};
pub use database::DatabaseDeploymentResult;
pub use deployment::{DeploymentManager, DeploymentResult, RollbackResult, StageResults};
pub use error::{ControlError, ControlResult};
pub use profile::{DeploymentProfile, DeploymentRequest};
pub use resolver::ConfigurationResolver;
pub use state::StatusEvent;
pub use store::{DeploymentFilter, DeploymentStore, MemoryStore, ProfileStore};
pub use strategy::DeploymentStrategy;
pub use types::{
    CertificateType, DatabaseConfig, DatabaseProvider, DeploymentId, DeploymentRecord,
    DeploymentStatus, Environment, LogLevel, ProfileId, SslConfig, TargetPlatform,
};
