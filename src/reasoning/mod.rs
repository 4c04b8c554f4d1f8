pub mod adapters;
pub mod bridge;
pub mod error;
pub mod normalizer;
pub mod ports;
pub mod types;

pub use bridge::ReasoningBridge;
pub use error::{ReasoningError, ReasoningErrorKind};
pub use ports::ReasoningPort;
pub use types::{BoundingBoxAnnotation, ReasoningOutcome, ReasoningRequest, ReasoningVerdict};
