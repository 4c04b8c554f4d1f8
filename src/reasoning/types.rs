use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::PipelineKind;

/// What the deterministic layer hands the external assessor: no raw bytes,
/// only the findings digest and enough context to interpret it.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningRequest {
    pub task_id: String,
    pub document_reference: String,
    pub pipeline_kind: PipelineKind,
    pub findings_summary: Value,
}

/// A normalized external assessment. Construction goes through the
/// normalizer, which enforces the score range and drops malformed entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningVerdict {
    /// 0 (certainly forged) to 100 (certainly authentic).
    pub authenticity_score: u8,
    pub flagged_issues: Vec<String>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_boxes: Vec<BoundingBoxAnnotation>,
}

/// Region of interest in the rendered document, `[y_min, x_min, y_max, x_max]`
/// on a 0..=1000 normalized grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBoxAnnotation {
    pub box_2d: [u16; 4],
    pub label: String,
}

/// How the consultation ended. `Degraded` and `Skipped` both leave the
/// deterministic result authoritative; only `Degraded` is surfaced to the
/// caller as a warning flag.
#[derive(Debug, Clone)]
pub enum ReasoningOutcome {
    Verdict(ReasoningVerdict),
    Degraded { reason: String },
    Skipped,
}

impl ReasoningOutcome {
    pub fn verdict(&self) -> Option<&ReasoningVerdict> {
        match self {
            ReasoningOutcome::Verdict(verdict) => Some(verdict),
            _ => None,
        }
    }
}
