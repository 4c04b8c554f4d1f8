//! Task lifecycle driver.
//!
//! `submit` registers the task and spawns its analysis under a watchdog
//! deadline; the caller observes everything else through the progress
//! stream and the final report. Every exit path, success or failure, emits
//! exactly one terminal progress event.

use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::{
    classify,
    config::OrchestratorConfig,
    document::Document,
    pipeline::{
        error::PipelineErrorKind,
        runner::PipelineRunner,
        types::PipelineOutcome,
    },
    progress::{EventStatus, ProgressEventStream, Step},
    reasoning::{
        bridge::ReasoningBridge,
        ports::ReasoningPort,
        types::{ReasoningOutcome, ReasoningRequest},
    },
    registry::{
        error::RegistryError,
        registry::TaskRegistry,
        types::{FailureKind, TaskFailure, TaskId, TaskSnapshot, TaskStatus},
    },
    storage::ReportStore,
    verdict::{aggregator::VerdictAggregator, types::Report},
};

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<TaskRegistry>,
    runner: Arc<PipelineRunner>,
    bridge: Arc<ReasoningBridge>,
    aggregator: VerdictAggregator,
    reports: Arc<dyn ReportStore>,
    janitor: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        reasoning_port: Arc<dyn ReasoningPort>,
        reports: Arc<dyn ReportStore>,
    ) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let orchestrator = Arc::new(Self {
            registry: Arc::new(TaskRegistry::new(config.progress.clone())),
            runner: Arc::new(PipelineRunner::new(config.pipeline.clone())),
            bridge: Arc::new(ReasoningBridge::new(
                reasoning_port,
                config.reasoning.clone(),
            )),
            aggregator: VerdictAggregator::new(config.verdict.clone()),
            reports,
            janitor: CancellationToken::new(),
            config,
        });
        orchestrator.spawn_janitor();
        Ok(orchestrator)
    }

    /// Register a document for analysis. Returns immediately; the analysis
    /// runs in the background under the watchdog deadline.
    pub fn submit(
        self: &Arc<Self>,
        reference: impl Into<String>,
        declared_mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> TaskId {
        let (task_id, progress) = self.registry.create();
        let document = Arc::new(Document::new(reference, declared_mime, bytes));
        let _ = progress.append(
            Step::Init,
            EventStatus::InProgress,
            format!("analysis task accepted for {}", document.reference),
        );

        let orchestrator = Arc::clone(self);
        let spawned_task_id = task_id.clone();
        let watchdog = Duration::from_millis(self.config.watchdog_ceiling_ms);
        tokio::spawn(async move {
            let drive = orchestrator.drive(&spawned_task_id, document);
            match timeout(watchdog, drive).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        target: "orchestrator",
                        task_id = %spawned_task_id,
                        ceiling_ms = watchdog.as_millis() as u64,
                        "task_watchdog_fired"
                    );
                    orchestrator.fail_task(
                        &spawned_task_id,
                        TaskFailure::new(FailureKind::ProcessingTimeout, "processing timeout"),
                    );
                }
            }
        });

        task_id
    }

    /// Subscribe to a task's progress events from `from_sequence` onward.
    /// Replays from the authoritative log, so a late joiner sees every event.
    pub fn subscribe(
        &self,
        task_id: &str,
        from_sequence: u64,
    ) -> Result<ProgressEventStream, RegistryError> {
        let progress = self.registry.progress(task_id)?;
        Ok(progress.subscribe(from_sequence).into_stream())
    }

    pub fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, RegistryError> {
        self.registry.snapshot(task_id)
    }

    pub fn fetch_report(&self, task_id: &str) -> Result<Option<Arc<Report>>, RegistryError> {
        self.registry.report(task_id)
    }

    /// The caller confirms it has the terminal result; the task and its
    /// stored report are released immediately instead of waiting for TTL.
    pub async fn confirm_delivered(&self, task_id: &str) -> Result<(), RegistryError> {
        self.registry.remove(task_id)?;
        if let Err(err) = self.reports.purge(task_id).await {
            tracing::warn!(target: "orchestrator", task_id, error = %err, "report_purge_failed");
        }
        tracing::info!(target: "orchestrator", task_id, "task_delivery_confirmed");
        Ok(())
    }

    /// Stop the background janitor. Tasks already in flight keep running.
    pub fn shutdown(&self) {
        self.janitor.cancel();
    }

    #[tracing::instrument(
        name = "task_drive",
        target = "orchestrator",
        skip(self, document),
        fields(task_id = %task_id, document = %document.reference)
    )]
    async fn drive(&self, task_id: &str, document: Arc<Document>) {
        if let Err(failure) = self.drive_inner(task_id, Arc::clone(&document)).await {
            self.fail_task(task_id, failure);
        }
    }

    async fn drive_inner(
        &self,
        task_id: &str,
        document: Arc<Document>,
    ) -> Result<(), TaskFailure> {
        let progress = self
            .registry
            .progress(task_id)
            .map_err(|err| TaskFailure::new(FailureKind::Internal, err.to_string()))?;

        // PENDING -> CLASSIFYING
        self.transition(task_id, TaskStatus::Classifying)?;
        let _ = progress.append(
            Step::Classification,
            EventStatus::InProgress,
            "classifying document",
        );
        let kind = classify::classify(&document.bytes, &document.declared_mime)
            .map_err(|err| TaskFailure::new(FailureKind::UnsupportedDocument, err.message))?;
        self.registry
            .set_pipeline_kind(task_id, kind)
            .map_err(|err| TaskFailure::new(FailureKind::Internal, err.to_string()))?;
        let _ = progress.append(
            Step::PipelineSelected,
            EventStatus::InProgress,
            format!("selected {} pipeline", kind.as_str()),
        );

        // CLASSIFYING -> RUNNING_PIPELINE
        self.transition(task_id, TaskStatus::RunningPipeline)?;
        let outcome = self
            .runner
            .run(kind, Arc::clone(&document), Arc::clone(&progress))
            .await
            .map_err(|err| match err.kind {
                PipelineErrorKind::FatalStage => {
                    TaskFailure::new(FailureKind::CorruptDocument, err.message)
                }
                PipelineErrorKind::Internal => {
                    TaskFailure::new(FailureKind::Internal, err.message)
                }
            })?;

        // Optionally RUNNING_PIPELINE -> AWAITING_REASONING
        let reasoning = if !outcome.conclusive || self.bridge.always_consults(kind) {
            self.transition(task_id, TaskStatus::AwaitingReasoning)?;
            let request = ReasoningRequest {
                task_id: task_id.to_string(),
                document_reference: document.reference.clone(),
                pipeline_kind: kind,
                findings_summary: findings_summary(&outcome),
            };
            self.bridge.consult(&request, &progress).await
        } else {
            ReasoningOutcome::Skipped
        };

        // -> FINALIZING -> COMPLETE
        self.transition(task_id, TaskStatus::Finalizing)?;
        let _ = progress.append(
            Step::Finalizing,
            EventStatus::InProgress,
            "merging findings into final report",
        );
        let report = Arc::new(self.aggregator.merge(task_id, outcome, reasoning));
        if let Err(err) = self.reports.put(Arc::clone(&report)).await {
            return Err(TaskFailure::new(FailureKind::Internal, err.to_string()));
        }
        self.registry
            .attach_report(task_id, Arc::clone(&report))
            .map_err(|err| TaskFailure::new(FailureKind::Internal, err.to_string()))?;

        let _ = progress.append_terminal(
            EventStatus::Complete,
            format!(
                "analysis complete: {} (trust score {})",
                report.verdict.as_str(),
                report.trust_score
            ),
            json!({ "report": &*report }),
        );
        Ok(())
    }

    fn transition(&self, task_id: &str, next: TaskStatus) -> Result<(), TaskFailure> {
        self.registry
            .transition(task_id, next)
            .map_err(|err| TaskFailure::new(FailureKind::Internal, err.to_string()))
    }

    /// Force the task to ERROR and emit its terminal event. Idempotent: the
    /// progress stream rejects appends after close, so a watchdog firing
    /// against an already-terminal task is a no-op.
    fn fail_task(&self, task_id: &str, failure: TaskFailure) {
        match self.registry.mark_failed(task_id, failure.clone()) {
            Ok(()) => {}
            Err(err) => {
                tracing::debug!(target: "orchestrator", task_id, error = %err, "fail_task_skipped");
                return;
            }
        }
        if let Ok(progress) = self.registry.progress(task_id) {
            let _ = progress.append_terminal(
                EventStatus::Error,
                failure.reason.clone(),
                json!({ "error_kind": failure.kind.as_str() }),
            );
        }
    }

    fn spawn_janitor(self: &Arc<Self>) {
        let orchestrator = Arc::clone(self);
        let token = self.janitor.clone();
        let ttl = Duration::from_millis(self.config.task_ttl_ms);
        let interval = Duration::from_millis(self.config.janitor_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                for task_id in orchestrator.registry.expired(ttl) {
                    if let Err(err) = orchestrator.registry.remove(&task_id) {
                        tracing::debug!(target: "orchestrator", task_id, error = %err, "janitor_remove_raced");
                        continue;
                    }
                    if let Err(err) = orchestrator.reports.purge(&task_id).await {
                        tracing::warn!(target: "orchestrator", task_id, error = %err, "janitor_purge_failed");
                    }
                    tracing::info!(target: "orchestrator", task_id, "task_expired");
                }
            }
        });
    }
}

/// Compact digest of the deterministic result for the reasoning request; raw
/// document bytes never leave the pipeline.
fn findings_summary(outcome: &PipelineOutcome) -> serde_json::Value {
    json!({
        "local_score": outcome.local_score,
        "conclusive": outcome.conclusive,
        "integrity_breach": outcome.integrity_breach,
        "embedded_analyzed": outcome.embedded_analyzed,
        "stages": outcome
            .stages
            .iter()
            .map(|stage| {
                json!({
                    "technique": stage.technique,
                    "findings": stage
                        .findings
                        .iter()
                        .map(|finding| {
                            json!({
                                "severity": finding.severity,
                                "message": finding.message,
                            })
                        })
                        .collect::<Vec<_>>(),
                })
            })
            .collect::<Vec<_>>(),
    })
}
