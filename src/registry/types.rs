use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::classify::PipelineKind;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Classifying,
    RunningPipeline,
    AwaitingReasoning,
    Finalizing,
    Complete,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Classifying => "classifying",
            TaskStatus::RunningPipeline => "running_pipeline",
            TaskStatus::AwaitingReasoning => "awaiting_reasoning",
            TaskStatus::Finalizing => "finalizing",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }

    /// Forward-only lifecycle. Reasoning is optional, so FINALIZING is
    /// reachable from RUNNING_PIPELINE directly; ERROR is reachable from any
    /// non-terminal state.
    pub fn is_valid_transition(&self, next: TaskStatus) -> bool {
        if next == TaskStatus::Error {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Classifying)
                | (TaskStatus::Classifying, TaskStatus::RunningPipeline)
                | (TaskStatus::RunningPipeline, TaskStatus::AwaitingReasoning)
                | (TaskStatus::RunningPipeline, TaskStatus::Finalizing)
                | (TaskStatus::AwaitingReasoning, TaskStatus::Finalizing)
                | (TaskStatus::Finalizing, TaskStatus::Complete)
        )
    }
}

/// Why a task ended in ERROR; carried on the terminal event and the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedDocument,
    CorruptDocument,
    ProcessingTimeout,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedDocument => "unsupported_document",
            FailureKind::CorruptDocument => "corrupt_document",
            FailureKind::ProcessingTimeout => "processing_timeout",
            FailureKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Point-in-time view of a task, safe to hand out without holding any lock.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_kind: Option<PipelineKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub terminal_at: Option<OffsetDateTime>,
}
