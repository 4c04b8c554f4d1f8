use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningErrorKind {
    /// The assessor did not answer within its deadline.
    Timeout,
    /// Transport-level or capacity fault worth exactly one retry.
    Transient,
    /// The assessor refused the request; retrying would refuse again.
    Rejected,
    /// The assessor answered, but the payload cannot be normalized.
    Malformed,
}

impl ReasoningErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningErrorKind::Timeout => "timeout",
            ReasoningErrorKind::Transient => "transient",
            ReasoningErrorKind::Rejected => "rejected",
            ReasoningErrorKind::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningError {
    pub kind: ReasoningErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ReasoningError {
    pub fn new(kind: ReasoningErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(kind, ReasoningErrorKind::Transient),
        }
    }
}

impl fmt::Display for ReasoningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reasoning {}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ReasoningError {}

pub fn timeout(message: impl Into<String>) -> ReasoningError {
    ReasoningError::new(ReasoningErrorKind::Timeout, message)
}

pub fn transient(message: impl Into<String>) -> ReasoningError {
    ReasoningError::new(ReasoningErrorKind::Transient, message)
}

pub fn rejected(message: impl Into<String>) -> ReasoningError {
    ReasoningError::new(ReasoningErrorKind::Rejected, message)
}

pub fn malformed(message: impl Into<String>) -> ReasoningError {
    ReasoningError::new(ReasoningErrorKind::Malformed, message)
}
