//! Merge of deterministic findings and the external assessment into one
//! immutable report.
//!
//! Flags from both sources are keyed by topic; when both sources raise the
//! same topic the deterministic flag wins and the reasoning duplicate is
//! dropped. The trust score comes from the assessment when one exists and
//! otherwise from the penalty arithmetic over the deduplicated flags, one
//! penalty per topic. A proven integrity breach caps it below the suspicion
//! threshold no matter what either source said.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    config::VerdictConfig,
    pipeline::types::{DEFAULT_PENALTY, PipelineOutcome},
    reasoning::types::ReasoningOutcome,
    verdict::types::{Flag, ReasoningNarrative, Report, VerdictLabel},
};

const REASONING_TOPIC: &str = "reasoning";

/// Topic vocabulary: the first matching pattern names the topic. Ordered
/// from most to least specific.
fn vocabulary() -> &'static Vec<(&'static str, Regex)> {
    static VOCABULARY: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    VOCABULARY.get_or_init(|| {
        [
            ("signature", r"(?i)signature|byte ?range|after signing"),
            (
                "end-marker",
                r"(?i)end.?marker|incremental update|truncat|malformed document",
            ),
            ("script-content", r"(?i)javascript|active script"),
            (
                "embedded-content",
                r"(?i)embedded (file|image|content|attachment)|recursion limit",
            ),
            ("metadata", r"(?i)producer|metadata|creator|software tool"),
            (
                "compression-artifact",
                r"(?i)quantization|histogram|compress|re.?encod|re.?saved|jpeg segment",
            ),
            ("degraded-technique", r"(?i)technique degraded"),
            (
                "visual-inconsistency",
                r"(?i)font|align|splic|clone|copy.?paste|inconsistent|region|lighting|shadow",
            ),
        ]
        .into_iter()
        .map(|(topic, pattern)| {
            let regex = Regex::new(pattern).expect("topic pattern must compile");
            (topic, regex)
        })
        .collect()
    })
}

/// Topic for a flag text: vocabulary first, then a slug of the leading words
/// so unknown phrasings still dedup against themselves.
pub fn topic_for(text: &str) -> String {
    for (topic, pattern) in vocabulary() {
        if pattern.is_match(text) {
            return (*topic).to_string();
        }
    }
    let slug: Vec<String> = text
        .split_whitespace()
        .take(3)
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect();
    if slug.is_empty() {
        "unclassified".to_string()
    } else {
        slug.join("-")
    }
}

pub struct VerdictAggregator {
    config: VerdictConfig,
}

impl VerdictAggregator {
    pub fn new(config: VerdictConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(
        name = "verdict_merge",
        target = "verdict",
        skip_all,
        fields(task_id = %task_id)
    )]
    pub fn merge(
        &self,
        task_id: &str,
        outcome: PipelineOutcome,
        reasoning: ReasoningOutcome,
    ) -> Report {
        let mut flags: Vec<Flag> = Vec::new();
        for finding in outcome.flagged_findings() {
            let penalty = outcome
                .penalty_weights
                .get(&finding.technique)
                .copied()
                .unwrap_or(DEFAULT_PENALTY);
            let topic = topic_for(&finding.message);
            if flags.iter().any(|flag| flag.topic == topic) {
                continue;
            }
            flags.push(Flag::new(finding.message.clone(), topic, penalty));
        }

        let mut narrative = None;
        let mut reasoning_degraded = false;
        let mut assessed_score = None;

        match reasoning {
            ReasoningOutcome::Verdict(verdict) => {
                for issue in &verdict.flagged_issues {
                    let topic = topic_for(issue);
                    // Deterministic evidence outranks the narrative.
                    if flags.iter().any(|flag| flag.topic == topic) {
                        continue;
                    }
                    flags.push(Flag::new(issue.clone(), topic, 0));
                }
                assessed_score = Some(verdict.authenticity_score);
                narrative = Some(ReasoningNarrative {
                    reasoning: verdict.reasoning,
                    summary: verdict.summary,
                    bounding_boxes: verdict.bounding_boxes,
                });
            }
            ReasoningOutcome::Degraded { reason } => {
                reasoning_degraded = true;
                flags.push(Flag::new(
                    format!("external reasoning unavailable: {reason}"),
                    REASONING_TOPIC,
                    0,
                ));
            }
            ReasoningOutcome::Skipped => {}
        }

        // Fallback score over the deduplicated flags: repeated findings on
        // one topic collapsed into one flag above, so they charge once.
        // Flags the reasoning side contributed carry no penalty.
        let local_penalty: u32 = flags.iter().map(|flag| u32::from(flag.penalty)).sum();
        let local_fallback = 100u8.saturating_sub(local_penalty.min(100) as u8);
        let mut trust_score = assessed_score.unwrap_or(local_fallback);
        if outcome.integrity_breach {
            trust_score = trust_score.min(self.config.integrity_score_cap);
        }
        let verdict = if trust_score < self.config.suspicion_threshold {
            VerdictLabel::Tampered
        } else {
            VerdictLabel::Authentic
        };

        tracing::info!(
            target: "verdict",
            trust_score,
            verdict = verdict.as_str(),
            flags = flags.len(),
            reasoning_degraded,
            "verdict_merged"
        );

        Report {
            task_id: task_id.to_string(),
            pipeline_kind: outcome.kind,
            stages: outcome.stages,
            flags,
            trust_score,
            verdict,
            reasoning: narrative,
            reasoning_degraded,
        }
    }
}
