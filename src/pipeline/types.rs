use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{classify::PipelineKind, document::Document};

/// Penalty applied to flags whose technique never declared a weight.
pub const DEFAULT_PENALTY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Findings at this severity surface as user-facing flags.
    pub fn is_flagged(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Critical)
    }
}

/// A single raw observation emitted by an analysis stage. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub technique: String,
    pub severity: Severity,
    pub message: String,
    /// Identifier of a generated evidence artifact (digest, sub-document
    /// reference, heatmap id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<String>,
}

impl Finding {
    pub fn new(technique: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            technique: technique.into(),
            severity,
            message: message.into(),
            evidence_ref: None,
        }
    }

    pub fn with_evidence(mut self, evidence_ref: impl Into<String>) -> Self {
        self.evidence_ref = Some(evidence_ref.into());
        self
    }
}

/// Output of one stage run.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub findings: Vec<Finding>,
    /// False when the stage itself considers its result too weak to settle
    /// the verdict without external reasoning.
    pub conclusive: bool,
    /// A deterministic proof of tampering (e.g. data altered after
    /// signing). Forces the final score below the suspicion threshold and
    /// lets the runner short-circuit the remaining stages.
    pub integrity_breach: bool,
    /// Extracted content to analyze recursively (bounded depth).
    pub sub_documents: Vec<Document>,
}

impl StageOutput {
    pub fn conclusive_with(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            conclusive: true,
            ..Default::default()
        }
    }
}

/// Findings grouped by the stage run that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub technique: String,
    pub findings: Vec<Finding>,
}

/// Aggregate result of one pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub kind: PipelineKind,
    pub stages: Vec<StageReport>,
    /// Penalty weight declared by each technique that ran.
    pub penalty_weights: BTreeMap<String, u8>,
    /// Composite local trust score: 100 minus one penalty per flagged
    /// topic, floored at zero.
    pub local_score: u8,
    pub conclusive: bool,
    pub integrity_breach: bool,
    pub embedded_analyzed: usize,
}

impl PipelineOutcome {
    pub fn flagged_findings(&self) -> impl Iterator<Item = &Finding> {
        self.stages
            .iter()
            .flat_map(|stage| stage.findings.iter())
            .filter(|finding| finding.severity.is_flagged())
    }
}
