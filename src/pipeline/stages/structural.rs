//! Structural forensics for page-description documents.
//!
//! Works on raw bytes: end-of-document marker counting (incremental
//! updates), cross-reference sections, producer metadata, active-content
//! markers, and extraction of embedded JPEG streams for recursive visual
//! analysis.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    document::{Document, contains, count_occurrences, find_from},
    pipeline::{
        error::{StageFault, fatal},
        ports::AnalysisStage,
        types::{Finding, Severity, StageOutput},
    },
    progress::{EventStatus, ProgressStream, Step},
};

const TECHNIQUE: &str = "structural";

/// Producer strings commonly left behind by editing tools.
const SUSPECT_PRODUCERS: &[&[u8]] = &[b"phantom", b"gpl output"];

pub struct StructuralStage {
    max_embedded: usize,
}

impl StructuralStage {
    pub fn new(max_embedded: usize) -> Self {
        Self { max_embedded }
    }
}

impl Default for StructuralStage {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl AnalysisStage for StructuralStage {
    fn technique(&self) -> &'static str {
        TECHNIQUE
    }

    fn penalty_weight(&self) -> u8 {
        15
    }

    async fn run(
        &self,
        document: Arc<Document>,
        progress: Arc<ProgressStream>,
    ) -> Result<StageOutput, StageFault> {
        let bytes = document.bytes.as_slice();
        if bytes.is_empty() {
            return Err(fatal(TECHNIQUE, "document is empty"));
        }

        let mut findings = Vec::new();
        let mut sub_documents = Vec::new();

        let eof_markers = count_occurrences(bytes, b"%%EOF");
        match eof_markers {
            0 => findings.push(Finding::new(
                TECHNIQUE,
                Severity::Critical,
                "no end-of-document marker found (malformed document)",
            )),
            1 => {}
            n => findings.push(Finding::new(
                TECHNIQUE,
                Severity::Warning,
                format!(
                    "multiple end-markers detected ({} incremental updates)",
                    n - 1
                ),
            )),
        }

        let xref_sections = count_occurrences(bytes, b"xref");
        if xref_sections > 1 && eof_markers <= 1 {
            findings.push(Finding::new(
                TECHNIQUE,
                Severity::Info,
                format!("{xref_sections} cross-reference sections present"),
            ));
        }

        if contains(bytes, b"/Producer") {
            if SUSPECT_PRODUCERS
                .iter()
                .any(|needle| contains_ascii_case_insensitive(bytes, needle))
            {
                findings.push(Finding::new(
                    TECHNIQUE,
                    Severity::Warning,
                    "suspicious producer metadata detected",
                ));
            }
        } else {
            findings.push(Finding::new(
                TECHNIQUE,
                Severity::Info,
                "no producer metadata present",
            ));
        }

        if contains(bytes, b"/JavaScript") || contains(bytes, b"/JS ") {
            findings.push(Finding::new(
                TECHNIQUE,
                Severity::Warning,
                "embedded JavaScript present",
            ));
        }
        if contains(bytes, b"/EmbeddedFiles") {
            findings.push(Finding::new(
                TECHNIQUE,
                Severity::Warning,
                "embedded file attachments present",
            ));
        }

        for (index, stream_bytes) in extract_jpeg_streams(bytes, self.max_embedded)
            .into_iter()
            .enumerate()
        {
            let sub = document.embedded(index, "image/jpeg", stream_bytes);
            let _ = progress.append(
                Step::EmbeddedAnalysis,
                EventStatus::InProgress,
                format!("extracted embedded image {} ({})", index + 1, sub.reference),
            );
            sub_documents.push(sub);
        }

        Ok(StageOutput {
            findings,
            conclusive: true,
            integrity_breach: false,
            sub_documents,
        })
    }
}

fn contains_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Scan for embedded JPEG streams (SOI .. EOI), capped at `limit`.
fn extract_jpeg_streams(bytes: &[u8], limit: usize) -> Vec<Vec<u8>> {
    const SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
    const EOI: &[u8] = &[0xFF, 0xD9];
    const MIN_STREAM_LEN: usize = 64;

    let mut streams = Vec::new();
    let mut offset = 0;
    while streams.len() < limit && offset + SOI.len() < bytes.len() {
        let Some(start) = find_from(bytes, SOI, offset) else {
            break;
        };
        let Some(end_rel) = find_from(bytes, EOI, start + SOI.len()) else {
            break;
        };
        let end = end_rel + EOI.len();
        if end - start >= MIN_STREAM_LEN {
            streams.push(bytes[start..end].to_vec());
        }
        offset = end;
    }
    streams
}
