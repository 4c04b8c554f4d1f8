use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use attest::{
    classify::PipelineKind,
    config::ReasoningConfig,
    progress::{ProgressStream, Step},
    reasoning::{
        ReasoningBridge, ReasoningOutcome, ReasoningPort, ReasoningRequest,
        error::{ReasoningError, rejected, transient},
    },
};
use serde_json::{Value, json};

struct CountingPort {
    calls: AtomicUsize,
    response: Result<Value, ReasoningError>,
}

impl CountingPort {
    fn new(response: Result<Value, ReasoningError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response,
        })
    }
}

#[async_trait]
impl ReasoningPort for CountingPort {
    async fn assess(&self, _request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

fn request() -> ReasoningRequest {
    ReasoningRequest {
        task_id: "0190-task".to_string(),
        document_reference: "statement.pdf".to_string(),
        pipeline_kind: PipelineKind::VisualOnly,
        findings_summary: json!({"local_score": 60, "stages": []}),
    }
}

#[tokio::test]
async fn given_rejected_request_when_consulted_then_no_retry_and_degraded() {
    let port = CountingPort::new(Err(rejected("assessor returned status 422")));
    let bridge = ReasoningBridge::new(port.clone(), ReasoningConfig::default());
    let progress = Arc::new(ProgressStream::new(16, 256));

    let outcome = bridge.consult(&request(), &progress).await;

    assert_eq!(port.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome, ReasoningOutcome::Degraded { .. }));
}

#[tokio::test]
async fn given_transient_fault_when_consulted_then_retry_is_visible_in_progress() {
    let port = CountingPort::new(Err(transient("connection reset by peer")));
    let bridge = ReasoningBridge::new(port.clone(), ReasoningConfig::default());
    let progress = Arc::new(ProgressStream::new(16, 256));

    let outcome = bridge.consult(&request(), &progress).await;
    assert_eq!(port.calls.load(Ordering::SeqCst), 2);
    assert!(matches!(outcome, ReasoningOutcome::Degraded { .. }));

    // Drain the closed-free log through a subscription snapshot.
    let _ = progress.append_terminal(
        attest::progress::EventStatus::Error,
        "done",
        Value::Null,
    );
    let mut subscription = progress.subscribe(0);
    let mut messages = Vec::new();
    while let Some(event) = subscription.next_event().await {
        messages.push((event.step, event.message.clone()));
    }
    assert!(
        messages
            .iter()
            .any(|(step, message)| *step == Step::Reasoning && message.contains("retrying once")),
        "retry must be announced on the progress stream: {messages:?}"
    );
}

#[tokio::test]
async fn given_usable_answer_when_consulted_then_verdict_is_normalized() {
    let port = CountingPort::new(Ok(json!({
        "authenticity_score": 35,
        "flagged_issues": ["re-rendered text region", 9],
        "reasoning": "fonts differ between fields",
        "bounding_boxes": [{"box_2d": [10, 10, 400, 700], "label": "total"}],
    })));
    let bridge = ReasoningBridge::new(port, ReasoningConfig::default());
    let progress = Arc::new(ProgressStream::new(16, 256));

    let outcome = bridge.consult(&request(), &progress).await;
    let verdict = outcome.verdict().expect("verdict expected");
    assert_eq!(verdict.authenticity_score, 35);
    assert_eq!(verdict.flagged_issues, vec!["re-rendered text region".to_string()]);
    assert_eq!(verdict.bounding_boxes.len(), 1);
}

#[test]
fn given_request_when_serialized_then_wire_shape_is_stable() {
    let value = serde_json::to_value(request()).unwrap();
    assert_eq!(value["task_id"], "0190-task");
    assert_eq!(value["pipeline_kind"], "visual_only");
    assert_eq!(value["findings_summary"]["local_score"], 60);
}

#[test]
fn given_always_consult_config_then_hybrid_is_included_by_default() {
    let bridge = ReasoningBridge::new(
        CountingPort::new(Err(rejected("unused"))),
        ReasoningConfig::default(),
    );
    assert!(bridge.always_consults(PipelineKind::HybridWithEmbeddedImages));
    assert!(!bridge.always_consults(PipelineKind::StructuralOnly));
}
