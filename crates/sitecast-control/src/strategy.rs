//! File deployment strategies.

use serde::{Deserialize, Serialize};

/// How application files replace a running site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    /// Stop the site, wait for file handles to close, then replace files.
    ///
    /// The site is unavailable for the duration of the copy.
    #[default]
    StopAndDeploy,

    /// Replace files while the site keeps running.
    ///
    /// Locked files are skipped during the clear step and may be left
    /// stale. Only suitable for static content.
    InPlace,
}

impl DeploymentStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StopAndDeploy => "stop_and_deploy",
            Self::InPlace => "in_place",
        }
    }

    /// Whether the site is stopped before files are touched.
    #[must_use]
    pub const fn stops_site(&self) -> bool {
        matches!(self, Self::StopAndDeploy)
    }
}

impl std::fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
