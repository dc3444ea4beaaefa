use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single build run, handed out by `StatusStore::start`.
pub type RunId = Uuid;

/// State of the current (or most recent) build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// No build has been triggered since the process started.
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildState::Success | BuildState::Failed)
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::Idle => write!(f, "idle"),
            BuildState::Running => write!(f, "running"),
            BuildState::Success => write!(f, "success"),
            BuildState::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of the live or most recent build run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BuildRun {
    /// `None` until the first build starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RunId>,
    pub state: BuildState,
    pub logs: Vec<String>,
    /// Number of old lines evicted from `logs` because the buffer was full.
    #[serde(default)]
    pub truncated: usize,
    pub start_time: Option<DateTime<Utc>>,
    /// Unset while the run is in progress.
    pub end_time: Option<DateTime<Utc>>,
    pub action: String,
    pub article_id: String,
}

impl BuildRun {
    /// Wall-clock duration of a finished run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
