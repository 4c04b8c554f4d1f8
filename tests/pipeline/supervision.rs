use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use attest::{
    classify::PipelineKind,
    config::PipelineConfig,
    document::Document,
    pipeline::{
        AnalysisStage, PipelineErrorKind, PipelineRunner, Severity, StageFault, StageOutput,
        error::{fatal, recoverable},
        types::Finding,
    },
    progress::ProgressStream,
};

struct ScriptedStage {
    technique: &'static str,
    weight: u8,
    result: Result<StageOutput, StageFault>,
    called: AtomicBool,
}

impl ScriptedStage {
    fn new(technique: &'static str, weight: u8, result: Result<StageOutput, StageFault>) -> Arc<Self> {
        Arc::new(Self {
            technique,
            weight,
            result,
            called: AtomicBool::new(false),
        })
    }

    fn clean(technique: &'static str, weight: u8) -> Arc<Self> {
        Self::new(
            technique,
            weight,
            Ok(StageOutput {
                findings: Vec::new(),
                conclusive: true,
                integrity_breach: false,
                sub_documents: Vec::new(),
            }),
        )
    }
}

#[async_trait]
impl AnalysisStage for ScriptedStage {
    fn technique(&self) -> &'static str {
        self.technique
    }

    fn penalty_weight(&self) -> u8 {
        self.weight
    }

    async fn run(
        &self,
        _document: Arc<Document>,
        _progress: Arc<ProgressStream>,
    ) -> Result<StageOutput, StageFault> {
        self.called.store(true, Ordering::SeqCst);
        self.result.clone()
    }
}

struct HangingStage;

#[async_trait]
impl AnalysisStage for HangingStage {
    fn technique(&self) -> &'static str {
        "compression-artifact"
    }

    fn penalty_weight(&self) -> u8 {
        20
    }

    async fn run(
        &self,
        _document: Arc<Document>,
        _progress: Arc<ProgressStream>,
    ) -> Result<StageOutput, StageFault> {
        futures_util::future::pending().await
    }
}

fn runner_with(
    structural: Arc<dyn AnalysisStage>,
    visual: Arc<dyn AnalysisStage>,
    crypto: Arc<dyn AnalysisStage>,
) -> PipelineRunner {
    let config = PipelineConfig {
        stage_timeout_ms: 50,
        ..PipelineConfig::default()
    };
    PipelineRunner::with_stages(config, structural, visual, crypto)
}

fn document() -> Arc<Document> {
    Arc::new(Document::new("upload.pdf", "application/pdf", b"%PDF-1.7".to_vec()))
}

fn progress() -> Arc<ProgressStream> {
    Arc::new(ProgressStream::new(16, 256))
}

#[tokio::test]
async fn given_hanging_stage_when_run_then_degrades_into_finding() {
    let runner = runner_with(
        ScriptedStage::clean("structural", 15),
        Arc::new(HangingStage),
        ScriptedStage::clean("signature", 40),
    );

    let outcome = runner
        .run(PipelineKind::VisualOnly, document(), progress())
        .await
        .unwrap();

    assert!(!outcome.conclusive);
    let degraded: Vec<_> = outcome
        .stages
        .iter()
        .flat_map(|stage| stage.findings.iter())
        .filter(|finding| finding.message.starts_with("technique degraded"))
        .collect();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].severity, Severity::Warning);
}

#[tokio::test]
async fn given_recoverable_fault_when_run_then_pipeline_continues() {
    let crypto = ScriptedStage::new(
        "signature",
        40,
        Err(recoverable("signature", "signature backend unavailable")),
    );
    let structural = ScriptedStage::clean("structural", 15);
    let runner = runner_with(
        Arc::clone(&structural) as Arc<dyn AnalysisStage>,
        ScriptedStage::clean("compression-artifact", 20),
        crypto,
    );

    let outcome = runner
        .run(PipelineKind::CryptoThenStructural, document(), progress())
        .await
        .unwrap();

    assert!(structural.called.load(Ordering::SeqCst), "later stage must still run");
    assert_eq!(outcome.stages.len(), 2);
    assert!(!outcome.conclusive);
}

#[tokio::test]
async fn given_fatal_fault_when_run_then_pipeline_errors() {
    let structural = ScriptedStage::new(
        "structural",
        15,
        Err(fatal("structural", "document is unreadable")),
    );
    let runner = runner_with(
        structural,
        ScriptedStage::clean("compression-artifact", 20),
        ScriptedStage::clean("signature", 40),
    );

    let err = runner
        .run(PipelineKind::StructuralOnly, document(), progress())
        .await
        .unwrap_err();
    assert_eq!(err.kind, PipelineErrorKind::FatalStage);
    assert!(err.message.contains("unreadable"));
}

#[tokio::test]
async fn given_integrity_breach_when_run_then_later_stages_are_skipped() {
    let crypto = ScriptedStage::new(
        "signature",
        40,
        Ok(StageOutput {
            findings: vec![Finding::new(
                "signature",
                Severity::Critical,
                "signature broken: document altered after signing",
            )],
            conclusive: true,
            integrity_breach: true,
            sub_documents: Vec::new(),
        }),
    );
    let structural = ScriptedStage::clean("structural", 15);
    let runner = runner_with(
        Arc::clone(&structural) as Arc<dyn AnalysisStage>,
        ScriptedStage::clean("compression-artifact", 20),
        crypto,
    );

    let outcome = runner
        .run(PipelineKind::CryptoThenStructural, document(), progress())
        .await
        .unwrap();

    assert!(!structural.called.load(Ordering::SeqCst), "breach must short-circuit");
    assert_eq!(outcome.stages.len(), 1);
    assert!(outcome.integrity_breach);
    assert!(outcome.conclusive);
    assert_eq!(outcome.local_score, 60);
}

#[tokio::test]
async fn given_repeated_topic_findings_when_scored_then_penalty_applies_once() {
    let visual = ScriptedStage::new(
        "compression-artifact",
        20,
        Ok(StageOutput {
            findings: vec![
                Finding::new(
                    "compression-artifact",
                    Severity::Warning,
                    "compression-artifact histogram shows 70 empty bins (double quantization)",
                ),
                Finding::new(
                    "compression-artifact",
                    Severity::Warning,
                    "4 quantization tables present (recompression likely)",
                ),
            ],
            conclusive: true,
            integrity_breach: false,
            sub_documents: Vec::new(),
        }),
    );
    let runner = runner_with(
        ScriptedStage::clean("structural", 15),
        visual,
        ScriptedStage::clean("signature", 40),
    );

    let outcome = runner
        .run(PipelineKind::VisualOnly, document(), progress())
        .await
        .unwrap();

    assert_eq!(outcome.flagged_findings().count(), 2);
    assert_eq!(outcome.local_score, 80, "one suspicion topic must charge one penalty");
    assert!(outcome.conclusive);
}

#[tokio::test]
async fn given_ambiguous_score_when_run_then_outcome_is_inconclusive() {
    let structural = ScriptedStage::new(
        "structural",
        35,
        Ok(StageOutput {
            findings: vec![Finding::new(
                "structural",
                Severity::Warning,
                "multiple end-markers detected (3 incremental updates)",
            )],
            conclusive: true,
            integrity_breach: false,
            sub_documents: Vec::new(),
        }),
    );
    let runner = runner_with(
        structural,
        ScriptedStage::clean("compression-artifact", 20),
        ScriptedStage::clean("signature", 40),
    );

    let outcome = runner
        .run(PipelineKind::StructuralOnly, document(), progress())
        .await
        .unwrap();

    assert_eq!(outcome.local_score, 65);
    assert!(!outcome.conclusive, "scores inside the ambiguous band need reasoning");
}
