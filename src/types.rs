//! Shared primitive IDs, app keys, and operation status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend-assigned operation identifier.
pub type OperationId = u64;
/// Opaque instance identifier.
pub type InstanceId = String;

/// Composite key of an app: reverse-domain name plus version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppKey {
    /// Reverse-domain app name, e.g. `org.eclipse.mosquitto`.
    pub name: String,
    /// Version string, e.g. `2.0.14-openssl`.
    pub version: String,
}

impl AppKey {
    /// Builds a key from name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Returns the same app name at another version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

/// Closed set of operation states.
///
/// Both wire generations decode into this enum: the older "job" names
/// (`queued`, `running`, `successful`) and the newer "quest" names
/// (`pending`, `ongoing`, `success`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    /// Accepted but not started.
    #[serde(alias = "queued")]
    Pending,
    /// In progress.
    #[serde(alias = "ongoing")]
    Running,
    /// Still running, but a child already failed.
    Failing,
    /// Finished without error.
    #[serde(alias = "success", alias = "finished-ok")]
    Successful,
    /// Finished with an error.
    #[serde(alias = "finished-error")]
    Failed,
    /// Cancelled before finishing.
    Cancelled,
    /// Not executed because it was not needed.
    Skipped,
    /// A state this client does not know.
    #[serde(other)]
    Unknown,
}

impl OperationStatus {
    /// True once the status can no longer change.
    ///
    /// Unknown states count as finished.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running | Self::Failing)
    }

    /// True for terminal states that orchestration treats as success.
    pub fn is_finished_ok(self) -> bool {
        matches!(self, Self::Successful | Self::Skipped)
    }

    /// True while the backend is actively working on the operation.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Failing)
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failing => "failing",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
