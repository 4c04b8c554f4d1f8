//! Consultation driver for the external assessor.
//!
//! The bridge owns the fault policy: one deadline per attempt, exactly one
//! retry for transient faults, and degradation for everything else. A failed
//! consultation never fails the task; the deterministic result stays
//! authoritative and the degradation is reported as an outcome.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    config::ReasoningConfig,
    progress::{EventStatus, ProgressStream, Step},
    reasoning::{
        error::{ReasoningError, ReasoningErrorKind, timeout as timeout_error},
        normalizer,
        ports::ReasoningPort,
        types::{ReasoningOutcome, ReasoningRequest},
    },
};

pub struct ReasoningBridge {
    port: Arc<dyn ReasoningPort>,
    config: ReasoningConfig,
}

impl ReasoningBridge {
    pub fn new(port: Arc<dyn ReasoningPort>, config: ReasoningConfig) -> Self {
        Self { port, config }
    }

    /// Whether this pipeline kind consults reasoning even on a conclusive
    /// local result.
    pub fn always_consults(&self, kind: crate::classify::PipelineKind) -> bool {
        self.config.always_consult.contains(&kind)
    }

    #[tracing::instrument(
        name = "reasoning_consult",
        target = "reasoning",
        skip(self, request, progress),
        fields(task_id = %request.task_id)
    )]
    pub async fn consult(
        &self,
        request: &ReasoningRequest,
        progress: &Arc<ProgressStream>,
    ) -> ReasoningOutcome {
        let _ = progress.append(
            Step::Reasoning,
            EventStatus::InProgress,
            "consulting external reasoning",
        );

        let error = match self.attempt(request).await {
            Ok(outcome) => return outcome,
            Err(error) => error,
        };
        if !error.retryable {
            return self.degrade(error, progress);
        }

        tracing::warn!(target: "reasoning", error = %error, "reasoning_retrying");
        let _ = progress.append(
            Step::Reasoning,
            EventStatus::InProgress,
            "external reasoning faulted, retrying once",
        );
        match self.attempt(request).await {
            Ok(outcome) => outcome,
            Err(error) => self.degrade(error, progress),
        }
    }

    async fn attempt(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningOutcome, ReasoningError> {
        let deadline = Duration::from_millis(self.config.timeout_ms.max(1));
        let payload = timeout(deadline, self.port.assess(request))
            .await
            .map_err(|_| {
                timeout_error(format!(
                    "assessor did not answer within {}ms",
                    self.config.timeout_ms
                ))
            })??;
        let verdict = normalizer::normalize(&payload)?;
        tracing::info!(
            target: "reasoning",
            authenticity_score = verdict.authenticity_score,
            flagged_issues = verdict.flagged_issues.len(),
            "reasoning_verdict_received"
        );
        Ok(ReasoningOutcome::Verdict(verdict))
    }

    fn degrade(&self, error: ReasoningError, progress: &Arc<ProgressStream>) -> ReasoningOutcome {
        tracing::warn!(
            target: "reasoning",
            kind = error.kind.as_str(),
            error = %error,
            "reasoning_degraded"
        );
        let _ = progress.append(
            Step::Reasoning,
            EventStatus::InProgress,
            format!("external reasoning unavailable: {}", error.message),
        );
        let reason = match error.kind {
            ReasoningErrorKind::Timeout => "assessor timed out".to_string(),
            ReasoningErrorKind::Malformed => format!("assessor answer unusable: {}", error.message),
            _ => error.message,
        };
        ReasoningOutcome::Degraded { reason }
    }
}
