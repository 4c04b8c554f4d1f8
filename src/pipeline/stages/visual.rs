//! Compression-artifact statistics for raster images.
//!
//! Byte-level proxies for double-quantization detection: comb artifacts in
//! the value histogram and anomalous JPEG marker segments (repeated
//! quantization tables, nested image streams).

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    document::{Document, DocumentFormat, count_occurrences, sniff},
    pipeline::{
        error::{StageFault, fatal},
        ports::AnalysisStage,
        types::{Finding, Severity, StageOutput},
    },
    progress::{EventStatus, ProgressStream, Step},
};

const TECHNIQUE: &str = "compression-artifact";

/// Histogram analysis below this sample size is statistically meaningless.
const MIN_HISTOGRAM_SAMPLE: usize = 4096;
/// Empty-bin counts at or above this are a strong recompression signal.
const GAP_SUSPICIOUS: usize = 64;
/// Empty-bin counts in `[GAP_AMBIGUOUS, GAP_SUSPICIOUS)` are too weak to
/// settle locally and mark the result ambiguous.
const GAP_AMBIGUOUS: usize = 24;

#[derive(Default)]
pub struct VisualStage;

impl VisualStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisStage for VisualStage {
    fn technique(&self) -> &'static str {
        TECHNIQUE
    }

    fn penalty_weight(&self) -> u8 {
        20
    }

    async fn run(
        &self,
        document: Arc<Document>,
        progress: Arc<ProgressStream>,
    ) -> Result<StageOutput, StageFault> {
        let bytes = document.bytes.as_slice();
        if bytes.is_empty() {
            return Err(fatal(TECHNIQUE, "image is empty"));
        }

        let _ = progress.append(
            Step::Stage,
            EventStatus::InProgress,
            format!("analyzing compression artifacts ({})", document.reference),
        );

        let mut findings = Vec::new();
        let mut conclusive = true;

        if bytes.len() >= MIN_HISTOGRAM_SAMPLE {
            let gaps = histogram_gaps(bytes);
            if gaps >= GAP_SUSPICIOUS {
                findings.push(Finding::new(
                    TECHNIQUE,
                    Severity::Warning,
                    format!("compression-artifact histogram shows {gaps} empty bins (double quantization)"),
                ));
            } else if gaps >= GAP_AMBIGUOUS {
                findings.push(Finding::new(
                    TECHNIQUE,
                    Severity::Warning,
                    format!("weak compression-artifact signal ({gaps} empty histogram bins)"),
                ));
                conclusive = false;
            }
        }

        if sniff(bytes, &document.declared_mime).format == DocumentFormat::Jpeg {
            let quant_tables = count_occurrences(bytes, &[0xFF, 0xDB]);
            if quant_tables > 2 {
                findings.push(Finding::new(
                    TECHNIQUE,
                    Severity::Warning,
                    format!("{quant_tables} quantization tables present (recompression likely)"),
                ));
            }
            let image_starts = count_occurrences(bytes, &[0xFF, 0xD8, 0xFF]);
            if image_starts > 1 {
                findings.push(Finding::new(
                    TECHNIQUE,
                    Severity::Warning,
                    format!("nested image stream detected ({image_starts} start-of-image markers)"),
                ));
            }
        }

        if findings.is_empty() {
            findings.push(Finding::new(
                TECHNIQUE,
                Severity::Info,
                "no compression anomalies detected",
            ));
        }

        Ok(StageOutput {
            findings,
            conclusive,
            integrity_breach: false,
            sub_documents: Vec::new(),
        })
    }
}

/// Count empty histogram bins over the inner value range. Bins 0 and 255
/// are excluded; both are legitimately absent or dominant in many images.
fn histogram_gaps(bytes: &[u8]) -> usize {
    let mut histogram = [0usize; 256];
    for byte in bytes {
        histogram[*byte as usize] += 1;
    }
    histogram[1..255].iter().filter(|count| **count == 0).count()
}
