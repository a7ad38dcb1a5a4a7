//! Push-style progress reporting for long-running operations.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Severity of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single progress event. Transient: consumed by the sink, never stored
/// by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub stage: String,
    pub percent: u8,
    pub message: String,
    pub severity: Severity,
}

impl ProgressInfo {
    pub fn info(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.min(100),
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn warning(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::info(stage, percent, message)
        }
    }
}

/// Receiver of progress events.
///
/// Implementations must not block; the caller does not wait on rendering.
pub trait ProgressSink: Send + Sync {
    fn report(&self, info: ProgressInfo);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressInfo) + Send + Sync,
{
    fn report(&self, info: ProgressInfo) {
        self(info)
    }
}

/// Sink that turns progress events into tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, info: ProgressInfo) {
        match info.severity {
            Severity::Info => {
                info!(stage = %info.stage, percent = info.percent, "{}", info.message)
            }
            Severity::Warning => {
                warn!(stage = %info.stage, percent = info.percent, "{}", info.message)
            }
            Severity::Error => {
                error!(stage = %info.stage, percent = info.percent, "{}", info.message)
            }
        }
    }
}

/// Sink that keeps every event, for inspection in tests and reports.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressInfo>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressInfo> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().iter().map(|e| e.percent).collect()
    }
}

impl ProgressSink for CollectingProgress {
    fn report(&self, info: ProgressInfo) {
        if let Ok(mut events) = self.events.lock() {
            events.push(info);
        }
    }
}
