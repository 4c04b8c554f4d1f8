//! Pipeline execution.
//!
//! Stages within one pipeline run sequentially so each result can gate
//! what still needs to run; a proven integrity breach short-circuits the
//! remaining stages. Embedded sub-documents are analyzed concurrently but
//! must all settle before the pipeline is considered finished. Every call
//! into a stage happens under bounded supervision: a deadline plus a
//! join-fault boundary, so no stage failure escapes unhandled.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use tokio::{task::JoinSet, time::timeout};

use crate::{
    classify::PipelineKind,
    config::PipelineConfig,
    document::Document,
    pipeline::{
        error::{PipelineError, StageFaultKind, fatal_stage, internal_error},
        ports::AnalysisStage,
        stages::{CryptoStage, StructuralStage, VisualStage},
        types::{DEFAULT_PENALTY, Finding, PipelineOutcome, Severity, StageOutput, StageReport},
    },
    progress::{EventStatus, ProgressStream, Step},
    verdict::topic_for,
};

const EMBEDDED_TECHNIQUE: &str = "embedded-content";

pub struct PipelineRunner {
    structural: Arc<dyn AnalysisStage>,
    visual: Arc<dyn AnalysisStage>,
    crypto: Arc<dyn AnalysisStage>,
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let structural = Arc::new(StructuralStage::new(config.max_embedded_per_document));
        Self {
            structural,
            visual: Arc::new(VisualStage::new()),
            crypto: Arc::new(CryptoStage::new()),
            config,
        }
    }

    /// Replace the built-in techniques; used by hosts wiring their own
    /// stage implementations and by tests.
    pub fn with_stages(
        config: PipelineConfig,
        structural: Arc<dyn AnalysisStage>,
        visual: Arc<dyn AnalysisStage>,
        crypto: Arc<dyn AnalysisStage>,
    ) -> Self {
        Self {
            structural,
            visual,
            crypto,
            config,
        }
    }

    fn sequence(&self, kind: PipelineKind) -> Vec<Arc<dyn AnalysisStage>> {
        match kind {
            PipelineKind::StructuralOnly | PipelineKind::HybridWithEmbeddedImages => {
                vec![Arc::clone(&self.structural)]
            }
            PipelineKind::VisualOnly => vec![Arc::clone(&self.visual)],
            PipelineKind::CryptoThenStructural => {
                vec![Arc::clone(&self.crypto), Arc::clone(&self.structural)]
            }
        }
    }

    #[tracing::instrument(
        name = "pipeline_run",
        target = "pipeline",
        skip(self, document, progress),
        fields(kind = %kind, document = %document.reference)
    )]
    pub async fn run(
        &self,
        kind: PipelineKind,
        document: Arc<Document>,
        progress: Arc<ProgressStream>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let deadline = Duration::from_millis(self.config.stage_timeout_ms.max(1));

        let mut stages = Vec::new();
        let mut penalty_weights: BTreeMap<String, u8> = BTreeMap::new();
        let mut conclusive = true;
        let mut integrity_breach = false;
        let mut pending_sub_documents = Vec::new();

        for stage in self.sequence(kind) {
            if integrity_breach {
                let _ = progress.append(
                    Step::Stage,
                    EventStatus::InProgress,
                    format!(
                        "skipping {} analysis: integrity breach already proven",
                        stage.technique()
                    ),
                );
                tracing::info!(
                    target: "pipeline",
                    technique = stage.technique(),
                    "stage_short_circuited"
                );
                break;
            }

            penalty_weights.insert(stage.technique().to_string(), stage.penalty_weight());
            let output = supervise(
                Arc::clone(&stage),
                Arc::clone(&document),
                Arc::clone(&progress),
                deadline,
            )
            .await?;

            conclusive &= output.conclusive;
            integrity_breach |= output.integrity_breach;
            pending_sub_documents.extend(output.sub_documents);
            stages.push(StageReport {
                technique: stage.technique().to_string(),
                findings: output.findings,
            });
        }

        let mut embedded_analyzed = 0;
        if !pending_sub_documents.is_empty() {
            if document.depth >= self.config.max_embedded_depth {
                penalty_weights
                    .entry(EMBEDDED_TECHNIQUE.to_string())
                    .or_insert(DEFAULT_PENALTY);
                stages.push(StageReport {
                    technique: EMBEDDED_TECHNIQUE.to_string(),
                    findings: vec![Finding::new(
                        EMBEDDED_TECHNIQUE,
                        Severity::Warning,
                        "embedded content beyond the recursion limit was not analyzed",
                    )],
                });
            } else {
                let (reports, any_ambiguous) = self
                    .analyze_embedded(pending_sub_documents, Arc::clone(&progress), deadline)
                    .await?;
                embedded_analyzed = reports.len();
                conclusive &= !any_ambiguous;
                for (index, output) in reports {
                    let mut findings = output.findings;
                    if findings.iter().any(|f| f.severity.is_flagged()) {
                        penalty_weights
                            .entry(EMBEDDED_TECHNIQUE.to_string())
                            .or_insert(DEFAULT_PENALTY);
                        findings.push(Finding::new(
                            EMBEDDED_TECHNIQUE,
                            Severity::Warning,
                            format!("embedded image {} shows tampering signals", index + 1),
                        ));
                    }
                    stages.push(StageReport {
                        technique: self.visual.technique().to_string(),
                        findings,
                    });
                }
                penalty_weights
                    .entry(self.visual.technique().to_string())
                    .or_insert(self.visual.penalty_weight());
            }
        }

        // One penalty per topic: repeated findings about the same suspicion
        // merge into one flag downstream and must charge only once here.
        let mut charged_topics = BTreeSet::new();
        let penalty_total: u32 = stages
            .iter()
            .flat_map(|report| report.findings.iter())
            .filter(|finding| finding.severity.is_flagged())
            .filter(|finding| charged_topics.insert(topic_for(&finding.message)))
            .map(|finding| {
                u32::from(
                    penalty_weights
                        .get(&finding.technique)
                        .copied()
                        .unwrap_or(DEFAULT_PENALTY),
                )
            })
            .sum();
        let local_score = 100u8.saturating_sub(penalty_total.min(100) as u8);

        if local_score >= self.config.ambiguous_band_low
            && local_score < self.config.ambiguous_band_high
        {
            conclusive = false;
        }
        // A deterministic proof needs no second opinion.
        if integrity_breach {
            conclusive = true;
        }

        tracing::info!(
            target: "pipeline",
            local_score,
            conclusive,
            integrity_breach,
            embedded_analyzed,
            "pipeline_completed"
        );

        Ok(PipelineOutcome {
            kind,
            stages,
            penalty_weights,
            local_score,
            conclusive,
            integrity_breach,
            embedded_analyzed,
        })
    }

    /// Run the visual technique over extracted sub-documents concurrently.
    /// All analyses must settle (or fatally fail) before returning.
    async fn analyze_embedded(
        &self,
        sub_documents: Vec<Document>,
        progress: Arc<ProgressStream>,
        deadline: Duration,
    ) -> Result<(Vec<(usize, StageOutput)>, bool), PipelineError> {
        let bounded: Vec<Document> = sub_documents
            .into_iter()
            .take(self.config.max_embedded_per_document)
            .collect();
        let _ = progress.append(
            Step::EmbeddedAnalysis,
            EventStatus::InProgress,
            format!("analyzing {} embedded images concurrently", bounded.len()),
        );

        let mut set = JoinSet::new();
        for (index, sub) in bounded.into_iter().enumerate() {
            let stage = Arc::clone(&self.visual);
            let progress = Arc::clone(&progress);
            let sub = Arc::new(sub);
            set.spawn(async move { (index, supervise(stage, sub, progress, deadline).await) });
        }

        let mut reports = Vec::new();
        let mut first_error: Option<PipelineError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(output))) => reports.push((index, output)),
                Ok((_, Err(err))) => {
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(internal_error(format!(
                        "embedded analysis task failed to join: {join_err}"
                    )));
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        reports.sort_by_key(|(index, _)| *index);
        let any_ambiguous = reports.iter().any(|(_, output)| !output.conclusive);
        Ok((reports, any_ambiguous))
    }
}

/// Bounded supervision around one stage call: deadline, panic/join fault
/// containment, and recoverable-fault degradation into a finding.
async fn supervise(
    stage: Arc<dyn AnalysisStage>,
    document: Arc<Document>,
    progress: Arc<ProgressStream>,
    deadline: Duration,
) -> Result<StageOutput, PipelineError> {
    let technique = stage.technique();
    let _ = progress.append(
        Step::Stage,
        EventStatus::InProgress,
        format!("running {technique} analysis"),
    );

    let handle = tokio::spawn({
        let stage = Arc::clone(&stage);
        let document = Arc::clone(&document);
        let progress = Arc::clone(&progress);
        async move { stage.run(document, progress).await }
    });
    let abort = handle.abort_handle();

    match timeout(deadline, handle).await {
        Err(_) => {
            abort.abort();
            tracing::warn!(target: "pipeline", technique, "stage_timed_out");
            Ok(degraded_output(
                technique,
                "analysis did not converge within its deadline",
            ))
        }
        Ok(Err(join_err)) => {
            tracing::error!(target: "pipeline", technique, error = %join_err, "stage_aborted");
            Ok(degraded_output(technique, "analysis aborted unexpectedly"))
        }
        Ok(Ok(Err(fault))) => match fault.kind {
            StageFaultKind::Recoverable => {
                tracing::warn!(target: "pipeline", technique, error = %fault, "stage_degraded");
                Ok(degraded_output(technique, fault.message))
            }
            StageFaultKind::Fatal => {
                tracing::error!(target: "pipeline", technique, error = %fault, "stage_fatal");
                Err(fatal_stage(format!("{} ({technique})", fault.message)))
            }
        },
        Ok(Ok(Ok(output))) => Ok(output),
    }
}

fn degraded_output(technique: &str, message: impl Into<String>) -> StageOutput {
    StageOutput {
        findings: vec![Finding::new(
            technique,
            Severity::Warning,
            format!("technique degraded: {}", message.into()),
        )],
        conclusive: false,
        integrity_breach: false,
        sub_documents: Vec::new(),
    }
}
