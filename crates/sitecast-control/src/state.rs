//! Deployment status machine.
//!
//! Status changes go through [`transition`], a pure function of the current
//! status and an event. The orchestrator persists the record after every
//! successful transition.
//!
//! ```text
//! Pending ──▶ InProgress ──▶ (ValidationFailed) ──▶ (DatabaseDeploying)
//!                 ──▶ (ConfiguringSsl) ──▶ AppDeploying
//!                 ──▶ (RunningHealthChecks) ──▶ Success
//!
//! any non-terminal ──▶ Failed ──▶ RolledBack
//!                     Success ──▶ RolledBack   (explicit rollback)
//! ```
//!
//! Parenthesised stages are optional. Stages only move forward.

use crate::error::{ControlError, ControlResult};
use crate::types::DeploymentStatus;

/// Something that happened to a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Start,
    /// Discovery reported warnings.
    ValidationWarnings,
    DeployDatabase,
    ConfigureSsl,
    DeployApplication,
    RunHealthChecks,
    Succeed,
    Fail,
    RollBack,
}

impl StatusEvent {
    const fn target(self) -> DeploymentStatus {
        match self {
            Self::Start => DeploymentStatus::InProgress,
            Self::ValidationWarnings => DeploymentStatus::ValidationFailed,
            Self::DeployDatabase => DeploymentStatus::DatabaseDeploying,
            Self::ConfigureSsl => DeploymentStatus::ConfiguringSsl,
            Self::DeployApplication => DeploymentStatus::AppDeploying,
            Self::RunHealthChecks => DeploymentStatus::RunningHealthChecks,
            Self::Succeed => DeploymentStatus::Success,
            Self::Fail => DeploymentStatus::Failed,
            Self::RollBack => DeploymentStatus::RolledBack,
        }
    }
}

/// Position of an active stage in the forward order.
const fn stage_rank(status: DeploymentStatus) -> Option<u8> {
    match status {
        DeploymentStatus::InProgress => Some(1),
        DeploymentStatus::ValidationFailed => Some(2),
        DeploymentStatus::DatabaseDeploying => Some(3),
        DeploymentStatus::ConfiguringSsl => Some(4),
        DeploymentStatus::AppDeploying => Some(5),
        DeploymentStatus::RunningHealthChecks => Some(6),
        _ => None,
    }
}

/// Compute the status that `event` moves `from` into.
pub fn transition(from: DeploymentStatus, event: StatusEvent) -> ControlResult<DeploymentStatus> {
    use DeploymentStatus as S;

    let to = event.target();
    let allowed = match event {
        StatusEvent::Start => from == S::Pending,
        StatusEvent::ValidationWarnings => from == S::InProgress,
        StatusEvent::DeployDatabase
        | StatusEvent::ConfigureSsl
        | StatusEvent::DeployApplication
        | StatusEvent::RunHealthChecks => match (stage_rank(from), stage_rank(to)) {
            (Some(current), Some(next)) => current < next,
            _ => false,
        },
        StatusEvent::Succeed => matches!(from, S::AppDeploying | S::RunningHealthChecks),
        StatusEvent::Fail => !from.is_terminal(),
        StatusEvent::RollBack => matches!(from, S::Failed | S::Success),
    };

    if allowed {
        Ok(to)
    } else {
        Err(ControlError::InvalidStateTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use DeploymentStatus as S;

    fn run(events: &[StatusEvent]) -> ControlResult<DeploymentStatus> {
        events
            .iter()
            .try_fold(S::Pending, |status, event| transition(status, *event))
    }

    #[test]
    fn minimal_path() {
        let status = run(&[
            StatusEvent::Start,
            StatusEvent::DeployApplication,
            StatusEvent::Succeed,
        ])
        .unwrap();
        assert_eq!(status, S::Success);
    }

    #[test]
    fn full_path() {
        let status = run(&[
            StatusEvent::Start,
            StatusEvent::ValidationWarnings,
            StatusEvent::DeployDatabase,
            StatusEvent::ConfigureSsl,
            StatusEvent::DeployApplication,
            StatusEvent::RunHealthChecks,
            StatusEvent::Succeed,
        ])
        .unwrap();
        assert_eq!(status, S::Success);
    }

    #[test]
    fn stages_only_move_forward() {
        assert!(transition(S::AppDeploying, StatusEvent::DeployDatabase).is_err());
        assert!(transition(S::ConfiguringSsl, StatusEvent::ConfigureSsl).is_err());
        assert!(transition(S::Pending, StatusEvent::DeployApplication).is_err());
        assert!(transition(S::DatabaseDeploying, StatusEvent::ValidationWarnings).is_err());
    }

    #[test]
    fn success_requires_deployed_application() {
        assert!(transition(S::InProgress, StatusEvent::Succeed).is_err());
        assert!(transition(S::DatabaseDeploying, StatusEvent::Succeed).is_err());
        assert_eq!(
            transition(S::RunningHealthChecks, StatusEvent::Succeed).unwrap(),
            S::Success
        );
    }

    #[test]
    fn any_active_status_can_fail() {
        for from in [
            S::Pending,
            S::InProgress,
            S::ValidationFailed,
            S::DatabaseDeploying,
            S::ConfiguringSsl,
            S::AppDeploying,
            S::RunningHealthChecks,
        ] {
            assert_eq!(transition(from, StatusEvent::Fail).unwrap(), S::Failed);
        }
    }

    #[test]
    fn terminal_statuses_are_final() {
        for from in [S::Success, S::Failed, S::RolledBack] {
            assert!(transition(from, StatusEvent::Fail).is_err());
            assert!(transition(from, StatusEvent::Start).is_err());
        }
        assert!(transition(S::RolledBack, StatusEvent::RollBack).is_err());
    }

    #[test]
    fn rollback_from_failed_or_success() {
        assert_eq!(
            transition(S::Failed, StatusEvent::RollBack).unwrap(),
            S::RolledBack
        );
        assert_eq!(
            transition(S::Success, StatusEvent::RollBack).unwrap(),
            S::RolledBack
        );
        let err = transition(S::AppDeploying, StatusEvent::RollBack).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid state transition: cannot transition from app_deploying to rolled_back"
        );
    }
}
