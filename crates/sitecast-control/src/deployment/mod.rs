//! Deployment orchestration.
//!
//! This module contains the [`DeploymentManager`] which drives a deployment
//! record through its stages and compensates on failure.

mod manager;

pub use manager::DeploymentManager;

use serde::Serialize;

use crate::collaborators::{CertificateResult, HealthSummary};
use crate::database::DatabaseDeploymentResult;
use crate::error::ControlError;
use crate::types::{DeploymentId, DeploymentRecord, DeploymentStatus};

/// Sub-results gathered while running the optional stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageResults {
    pub database: Option<DatabaseDeploymentResult>,
    pub certificate: Option<CertificateResult>,
    pub health: Option<HealthSummary>,
}

/// Outcome of a deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub success: bool,
    /// Absent when the request was rejected before a record existed.
    pub deployment_id: Option<DeploymentId>,
    pub url: Option<String>,
    pub duration_ms: Option<u64>,
    pub status: DeploymentStatus,
    pub error_message: Option<String>,
    pub database_result: Option<DatabaseDeploymentResult>,
    pub certificate_result: Option<CertificateResult>,
    pub health_summary: Option<HealthSummary>,
}

impl DeploymentResult {
    pub(crate) fn from_record(record: &DeploymentRecord, stages: StageResults) -> Self {
        let success = record.status == DeploymentStatus::Success;
        Self {
            success,
            deployment_id: Some(record.id.clone()),
            url: Some(record.target_url()),
            duration_ms: record.duration_ms,
            status: record.status,
            error_message: if success {
                None
            } else {
                record.error_message.clone()
            },
            database_result: stages.database,
            certificate_result: stages.certificate,
            health_summary: stages.health,
        }
    }

    pub(crate) fn rejected(error: &ControlError) -> Self {
        Self {
            success: false,
            deployment_id: None,
            url: None,
            duration_ms: None,
            status: DeploymentStatus::Failed,
            error_message: Some(error.to_string()),
            database_result: None,
            certificate_result: None,
            health_summary: None,
        }
    }
}

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackResult {
    pub success: bool,
    pub deployment_id: DeploymentId,
    /// Status after the attempt, if the record was found.
    pub status: Option<DeploymentStatus>,
    pub error_message: Option<String>,
}

impl RollbackResult {
    pub(crate) fn succeeded(record: &DeploymentRecord) -> Self {
        Self {
            success: true,
            deployment_id: record.id.clone(),
            status: Some(record.status),
            error_message: None,
        }
    }

    pub(crate) fn failed(
        id: &DeploymentId,
        status: Option<DeploymentStatus>,
        error: &ControlError,
    ) -> Self {
        Self {
            success: false,
            deployment_id: id.clone(),
            status,
            error_message: Some(error.to_string()),
        }
    }
}
