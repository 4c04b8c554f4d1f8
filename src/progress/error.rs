use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressErrorKind {
    StreamClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressError {
    pub kind: ProgressErrorKind,
    pub message: String,
}

impl ProgressError {
    pub fn new(kind: ProgressErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProgressError {}

pub fn stream_closed(message: impl Into<String>) -> ProgressError {
    ProgressError::new(ProgressErrorKind::StreamClosed, message)
}
