use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    InProgress,
    Complete,
    Error,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Complete | EventStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    Classification,
    PipelineSelected,
    Stage,
    EmbeddedAnalysis,
    Reasoning,
    Finalizing,
    Terminal,
}

/// One entry in a task's ordered event log. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub sequence: u64,
    pub step: Step,
    pub message: String,
    pub status: EventStatus,
    /// Terminal `complete` events embed the full report; terminal `error`
    /// events embed the reason and an error-kind tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
