use async_trait::async_trait;
use serde_json::Value;

use crate::reasoning::{error::ReasoningError, types::ReasoningRequest};

/// Boundary to the external reasoning service. Implementations return the
/// raw response payload; normalization happens on this side of the seam so
/// every adapter is held to the same contract.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    async fn assess(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError>;
}
