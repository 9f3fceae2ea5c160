//! When a failed primary attempt escalates to the fallback location.

use serde::Deserialize;

use crate::domain::AttemptOutcome;

/// Escalation rule applied after a failed primary attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Any primary failure is retried on fallback storage.
    #[default]
    Always,
    /// Only failures that look like a storage problem (disk full, permission
    /// denied, I/O error) are retried on fallback storage.
    #[serde(rename = "storage-errors")]
    StorageErrorsOnly,
}

impl FallbackPolicy {
    /// Whether `outcome` of the primary attempt should be retried on fallback.
    ///
    /// Successful and interrupted attempts never escalate.
    pub fn should_fall_back(&self, outcome: &AttemptOutcome) -> bool {
        match (self, outcome.failure_class()) {
            (_, None) => false,
            (Self::Always, Some(_)) => true,
            (Self::StorageErrorsOnly, Some(class)) => class.is_storage(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::StorageErrorsOnly => "storage-errors",
        }
    }
}
