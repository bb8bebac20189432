use serde::{Deserialize, Serialize};
use std::fmt;

/// Batch lifecycle status.
///
/// Serialized as the fixed lowercase tokens used on the wire and in the
/// record store (`started`, `sendCompleted`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    /// Initial state, records are still being sent
    Started,
    /// Integrator finished sending, validation is processing the batch
    SendCompleted,
    /// Batch fully processed
    Completed,
    /// Integrator abandoned the batch
    Terminated,
    /// Processing failed
    Failed,
    /// Stored value not recognised
    Unknown,
}

impl BatchStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Failed)
    }

    /// States in which records may still be flowing
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::SendCompleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::SendCompleted => "sendCompleted",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse used when reading stored records: anything
    /// unrecognised maps to `Unknown` instead of failing the read.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "sendCompleted" => Ok(Self::SendCompleted),
            "completed" => Ok(Self::Completed),
            "terminated" => Ok(Self::Terminated),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}

/// New batches always start here
impl Default for BatchStatus {
    fn default() -> Self {
        Self::Started
    }
}
