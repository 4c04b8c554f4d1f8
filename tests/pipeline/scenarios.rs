use std::sync::Arc;

use attest::{
    classify::{PipelineKind, classify},
    config::PipelineConfig,
    document::Document,
    pipeline::{PipelineRunner, Severity},
    progress::ProgressStream,
};

fn runner() -> PipelineRunner {
    PipelineRunner::new(PipelineConfig::default())
}

fn progress() -> Arc<ProgressStream> {
    Arc::new(ProgressStream::new(16, 256))
}

/// Benign PDF saved twice: one incremental update, nothing else wrong.
fn resaved_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n/Producer (TrustyPress 3.1)\nxref\n0 3\ntrailer\n%%EOF\n".to_vec();
    bytes.extend_from_slice(b"4 0 obj << /Length 5 >> endobj\nxref\n%%EOF\n");
    bytes
}

/// Signed PDF with bytes appended past the signed range.
fn altered_signed_pdf() -> Vec<u8> {
    let mut bytes =
        b"%PDF-1.7\n/Type /Sig /ByteRange [0 100 150 50] /Contents <deadbeef>\n".to_vec();
    bytes.resize(200, b' ');
    bytes.extend_from_slice(b"sneaky appended content\n%%EOF\n");
    bytes
}

/// PDF carrying one small embedded JPEG stream.
fn pdf_with_embedded_jpeg() -> Vec<u8> {
    let mut bytes =
        b"%PDF-1.7\n/Producer (TrustyPress 3.1)\n/Image /DCTDecode\nstream\n".to_vec();
    bytes.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    bytes.extend_from_slice(&[0x20; 96]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes.extend_from_slice(b"\nendstream\nxref\n%%EOF\n");
    bytes
}

#[tokio::test]
async fn given_resaved_pdf_when_analyzed_then_single_end_marker_flag_and_score_85() {
    let bytes = resaved_pdf();
    let kind = classify(&bytes, "application/pdf").unwrap();
    assert_eq!(kind, PipelineKind::StructuralOnly);

    let document = Arc::new(Document::new("invoice.pdf", "application/pdf", bytes));
    let outcome = runner().run(kind, document, progress()).await.unwrap();

    let flagged: Vec<_> = outcome.flagged_findings().collect();
    assert_eq!(flagged.len(), 1, "flags: {flagged:?}");
    assert!(flagged[0].message.starts_with("multiple end-markers detected"));
    assert_eq!(outcome.local_score, 85);
    assert!(outcome.conclusive);
    assert!(!outcome.integrity_breach);
}

#[tokio::test]
async fn given_altered_signed_pdf_when_analyzed_then_breach_short_circuits() {
    let bytes = altered_signed_pdf();
    let kind = classify(&bytes, "application/pdf").unwrap();
    assert_eq!(kind, PipelineKind::CryptoThenStructural);

    let document = Arc::new(Document::new("contract.pdf", "application/pdf", bytes));
    let outcome = runner().run(kind, document, progress()).await.unwrap();

    assert!(outcome.integrity_breach);
    assert!(outcome.conclusive);
    assert_eq!(outcome.stages.len(), 1, "structural must be skipped after the breach");
    let critical: Vec<_> = outcome
        .flagged_findings()
        .filter(|finding| finding.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert!(critical[0].message.contains("altered after signing"));
}

#[tokio::test]
async fn given_embedded_jpeg_when_analyzed_then_sub_document_is_visited() {
    let bytes = pdf_with_embedded_jpeg();
    let kind = classify(&bytes, "application/pdf").unwrap();
    assert_eq!(kind, PipelineKind::HybridWithEmbeddedImages);

    let document = Arc::new(Document::new("report.pdf", "application/pdf", bytes));
    let outcome = runner().run(kind, document, progress()).await.unwrap();

    assert_eq!(outcome.embedded_analyzed, 1);
    assert!(
        outcome
            .stages
            .iter()
            .any(|stage| stage.technique == "compression-artifact"),
        "embedded image must go through visual analysis"
    );
}

#[tokio::test]
async fn given_depth_limit_reached_when_analyzed_then_embedded_content_is_flagged_unvisited() {
    let bytes = pdf_with_embedded_jpeg();
    let mut document = Document::new("report.pdf", "application/pdf", bytes);
    document.depth = PipelineConfig::default().max_embedded_depth;

    let outcome = runner()
        .run(
            PipelineKind::HybridWithEmbeddedImages,
            Arc::new(document),
            progress(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.embedded_analyzed, 0);
    assert!(
        outcome
            .flagged_findings()
            .any(|finding| finding.message.contains("recursion limit")),
        "unvisited embedded content must be called out"
    );
}
