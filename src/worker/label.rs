use super::types::{WorkerId, WorkerState};
use crate::error::LabelError;
use std::fmt;
use std::str::FromStr;

const RUNNING: &str = "running...";
const CLOSING: &str = "closing...";

/// Status segment of a worker label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStatus {
    Running,
    Closing,
}

impl LabelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelStatus::Running => RUNNING,
            LabelStatus::Closing => CLOSING,
        }
    }
}

impl From<WorkerState> for LabelStatus {
    fn from(state: WorkerState) -> Self {
        match state {
            WorkerState::Running => LabelStatus::Running,
            WorkerState::Stopping | WorkerState::Stopped => LabelStatus::Closing,
        }
    }
}

/// Display label of a worker: `"<prefix> #<id> (<status>)"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLabel {
    pub prefix: String,
    pub id: WorkerId,
    pub status: LabelStatus,
}

impl WorkerLabel {
    pub fn new(prefix: impl Into<String>, id: WorkerId, state: WorkerState) -> Self {
        Self {
            prefix: prefix.into(),
            id,
            status: state.into(),
        }
    }

    /// Parse a label of any prefix
    pub fn parse(label: &str) -> Result<Self, LabelError> {
        let (prefix, rest) = label
            .split_once(" #")
            .ok_or_else(|| LabelError::MissingId(label.to_string()))?;

        let (raw_id, status) = rest
            .split_once(" (")
            .ok_or_else(|| LabelError::MissingStatus(label.to_string()))?;

        let id = raw_id
            .parse::<u64>()
            .map(WorkerId::from_raw)
            .map_err(|_| LabelError::InvalidId(raw_id.to_string()))?;

        let status = status
            .strip_suffix(')')
            .ok_or_else(|| LabelError::MissingStatus(label.to_string()))?;

        let status = match status {
            RUNNING => LabelStatus::Running,
            CLOSING => LabelStatus::Closing,
            other => return Err(LabelError::UnknownStatus(other.to_string())),
        };

        Ok(Self {
            prefix: prefix.to_string(),
            id,
            status,
        })
    }

    /// Parse a label and require a specific prefix
    pub fn parse_with_prefix(label: &str, prefix: &str) -> Result<Self, LabelError> {
        let parsed = Self::parse(label)?;
        if parsed.prefix != prefix {
            return Err(LabelError::PrefixMismatch {
                label: label.to_string(),
                prefix: prefix.to_string(),
            });
        }
        Ok(parsed)
    }
}

impl fmt::Display for WorkerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} ({})", self.prefix, self.id, self.status.as_str())
    }
}

impl FromStr for WorkerLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
