use std::fmt;

/// How badly a stage failed.
///
/// Recoverable faults (technique unavailable, sub-computation did not
/// converge) degrade into a finding and the pipeline continues. Fatal
/// faults (document unreadable beyond recovery) abort the whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFaultKind {
    Recoverable,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFault {
    pub kind: StageFaultKind,
    pub technique: String,
    pub message: String,
}

impl StageFault {
    pub fn new(kind: StageFaultKind, technique: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            technique: technique.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.technique)
    }
}

impl std::error::Error for StageFault {}

pub fn recoverable(technique: impl Into<String>, message: impl Into<String>) -> StageFault {
    StageFault::new(StageFaultKind::Recoverable, technique, message)
}

pub fn fatal(technique: impl Into<String>, message: impl Into<String>) -> StageFault {
    StageFault::new(StageFaultKind::Fatal, technique, message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    FatalStage,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PipelineError {}

pub fn fatal_stage(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::FatalStage, message)
}

pub fn internal_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Internal, message)
}
