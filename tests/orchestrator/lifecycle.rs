use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use attest::{
    FailureKind, InMemoryReportStore, Orchestrator, OrchestratorConfig, TaskStatus,
    progress::{EventStatus, ProgressEvent},
    reasoning::{
        ReasoningPort, ReasoningRequest,
        error::{ReasoningError, rejected},
    },
    registry::RegistryErrorKind,
};
use futures_util::StreamExt;
use serde_json::Value;

struct RefusingPort;

#[async_trait]
impl ReasoningPort for RefusingPort {
    async fn assess(&self, _request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        Err(rejected("assessor returned status 403"))
    }
}

struct SilentPort;

#[async_trait]
impl ReasoningPort for SilentPort {
    async fn assess(&self, _request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        futures_util::future::pending().await
    }
}

fn orchestrator_with(config: OrchestratorConfig, port: Arc<dyn ReasoningPort>) -> Arc<Orchestrator> {
    Orchestrator::new(config, port, Arc::new(InMemoryReportStore::new()))
        .expect("config must validate")
}

fn hybrid_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n/Producer (TrustyPress 3.1)\n/Image /DCTDecode\nstream\n".to_vec();
    bytes.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    bytes.extend_from_slice(&[0x20; 96]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes.extend_from_slice(b"\nendstream\nxref\n%%EOF\n");
    bytes
}

async fn drain(orchestrator: &Arc<Orchestrator>, task_id: &str) -> Vec<Arc<ProgressEvent>> {
    let mut stream = orchestrator
        .subscribe(task_id, 0)
        .expect("task must be known");
    let mut events = Vec::new();
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = stream.next().await {
            events.push(event);
        }
    });
    deadline.await.expect("task must reach a terminal event");
    events
}

#[tokio::test]
async fn given_unsupported_bytes_when_submitted_then_task_errors_with_reason() {
    let orchestrator = orchestrator_with(OrchestratorConfig::default(), Arc::new(RefusingPort));
    let task_id = orchestrator.submit("note.txt", "text/plain", b"just some text".to_vec());

    let events = drain(&orchestrator, &task_id).await;
    let terminal = events.last().expect("terminal event expected");
    assert_eq!(terminal.status, EventStatus::Error);
    assert_eq!(
        terminal.data.as_ref().and_then(|data| data["error_kind"].as_str()),
        Some("unsupported_document")
    );

    let snapshot = orchestrator.snapshot(&task_id).expect("task still resident");
    assert_eq!(snapshot.status, TaskStatus::Error);
    assert_eq!(snapshot.failure.expect("failure recorded").kind, FailureKind::UnsupportedDocument);
    assert!(orchestrator.fetch_report(&task_id).expect("task known").is_none());

    orchestrator.shutdown();
}

#[tokio::test]
async fn given_empty_document_when_submitted_then_task_errors() {
    let orchestrator = orchestrator_with(OrchestratorConfig::default(), Arc::new(RefusingPort));
    let task_id = orchestrator.submit("empty.pdf", "application/pdf", Vec::new());

    let events = drain(&orchestrator, &task_id).await;
    assert_eq!(events.last().expect("terminal").status, EventStatus::Error);

    orchestrator.shutdown();
}

#[tokio::test]
async fn given_hung_reasoning_when_watchdog_fires_then_task_times_out() {
    let mut config = OrchestratorConfig::default();
    config.watchdog_ceiling_ms = 100;
    config.reasoning.timeout_ms = 60_000;
    let orchestrator = orchestrator_with(config, Arc::new(SilentPort));

    // Hybrid pipelines always consult reasoning, so the silent assessor
    // stalls the task until the watchdog intervenes.
    let task_id = orchestrator.submit("report.pdf", "application/pdf", hybrid_pdf());

    let events = drain(&orchestrator, &task_id).await;
    let terminal = events.last().expect("terminal event expected");
    assert_eq!(terminal.status, EventStatus::Error);
    assert_eq!(terminal.message, "processing timeout");
    assert_eq!(
        terminal.data.as_ref().and_then(|data| data["error_kind"].as_str()),
        Some("processing_timeout")
    );
    assert_eq!(
        orchestrator
            .snapshot(&task_id)
            .expect("task still resident")
            .failure
            .expect("failure recorded")
            .kind,
        FailureKind::ProcessingTimeout
    );

    orchestrator.shutdown();
}

#[tokio::test]
async fn given_confirmed_delivery_when_queried_again_then_task_is_gone() {
    let orchestrator = orchestrator_with(OrchestratorConfig::default(), Arc::new(RefusingPort));
    let task_id = orchestrator.submit(
        "invoice.pdf",
        "application/pdf",
        b"%PDF-1.7\n/Producer (TrustyPress 3.1)\nxref\ntrailer\n%%EOF\n".to_vec(),
    );

    let events = drain(&orchestrator, &task_id).await;
    assert_eq!(events.last().expect("terminal").status, EventStatus::Complete);
    assert!(orchestrator.fetch_report(&task_id).expect("task known").is_some());

    orchestrator
        .confirm_delivered(&task_id)
        .await
        .expect("first confirmation must succeed");

    let err = orchestrator.snapshot(&task_id).expect_err("task must be purged");
    assert_eq!(err.kind, RegistryErrorKind::UnknownTask);
    let err = orchestrator
        .confirm_delivered(&task_id)
        .await
        .expect_err("second confirmation must fail");
    assert_eq!(err.kind, RegistryErrorKind::UnknownTask);

    orchestrator.shutdown();
}

#[tokio::test]
async fn given_expired_terminal_task_when_janitor_runs_then_task_is_purged() {
    let mut config = OrchestratorConfig::default();
    config.task_ttl_ms = 1;
    config.janitor_interval_ms = 20;
    let orchestrator = orchestrator_with(config, Arc::new(RefusingPort));

    let task_id = orchestrator.submit("note.txt", "text/plain", b"plain text".to_vec());
    let _ = drain(&orchestrator, &task_id).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if orchestrator.snapshot(&task_id).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("janitor must purge the expired task");

    orchestrator.shutdown();
}

#[tokio::test]
async fn given_unknown_task_when_subscribed_then_unknown_task_error() {
    let orchestrator = orchestrator_with(OrchestratorConfig::default(), Arc::new(RefusingPort));
    let err = orchestrator
        .subscribe("01900000-0000-7000-8000-000000000000", 0)
        .err()
        .expect("unknown task must be rejected");
    assert_eq!(err.kind, RegistryErrorKind::UnknownTask);

    orchestrator.shutdown();
}
