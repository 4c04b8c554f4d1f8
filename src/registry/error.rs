use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    UnknownTask,
    InvalidTransition,
    TerminalTask,
    ReportConflict,
}

impl RegistryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryErrorKind::UnknownTask => "unknown_task",
            RegistryErrorKind::InvalidTransition => "invalid_transition",
            RegistryErrorKind::TerminalTask => "terminal_task",
            RegistryErrorKind::ReportConflict => "report_conflict",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryError {
    pub kind: RegistryErrorKind,
    pub message: String,
}

impl RegistryError {
    pub fn new(kind: RegistryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry {}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for RegistryError {}

pub fn unknown_task(task_id: &str) -> RegistryError {
    RegistryError::new(
        RegistryErrorKind::UnknownTask,
        format!("no task with id {task_id}"),
    )
}

pub fn invalid_transition(message: impl Into<String>) -> RegistryError {
    RegistryError::new(RegistryErrorKind::InvalidTransition, message)
}

pub fn terminal_task(message: impl Into<String>) -> RegistryError {
    RegistryError::new(RegistryErrorKind::TerminalTask, message)
}

pub fn report_conflict(message: impl Into<String>) -> RegistryError {
    RegistryError::new(RegistryErrorKind::ReportConflict, message)
}
