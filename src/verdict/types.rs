use serde::{Deserialize, Serialize};

use crate::{
    classify::PipelineKind,
    pipeline::types::StageReport,
    reasoning::types::BoundingBoxAnnotation,
};

/// One merged suspicion. `topic` is the dedup key across the local and
/// reasoning flag sources; `penalty` feeds the fallback score when no
/// assessment exists (zero for reasoning-contributed flags) and never goes
/// over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub text: String,
    pub topic: String,
    #[serde(skip)]
    pub penalty: u8,
}

impl Flag {
    pub fn new(text: impl Into<String>, topic: impl Into<String>, penalty: u8) -> Self {
        Self {
            text: text.into(),
            topic: topic.into(),
            penalty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictLabel {
    Authentic,
    Tampered,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::Authentic => "authentic",
            VerdictLabel::Tampered => "tampered",
        }
    }
}

/// Narrative carried over from the external assessment, kept separate from
/// the deterministic evidence so callers can tell the two apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningNarrative {
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding_boxes: Vec<BoundingBoxAnnotation>,
}

/// The final, immutable analysis report for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub task_id: String,
    pub pipeline_kind: PipelineKind,
    pub stages: Vec<StageReport>,
    pub flags: Vec<Flag>,
    /// 0 (certainly forged) to 100 (certainly authentic).
    pub trust_score: u8,
    pub verdict: VerdictLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningNarrative>,
    /// True when the external assessment was consulted but unusable and the
    /// score fell back to the deterministic one.
    #[serde(default)]
    pub reasoning_degraded: bool,
}
