//! Cryptographic signature-structure verification.
//!
//! Parses the `/ByteRange` structure and checks that the signed ranges
//! cover the document. Data appended beyond the signed range means the
//! document was altered after signing — a deterministic integrity breach
//! that no probabilistic verdict can override.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{
    document::{Document, find_from},
    pipeline::{
        error::{StageFault, fatal},
        ports::AnalysisStage,
        types::{Finding, Severity, StageOutput},
    },
    progress::{EventStatus, ProgressStream, Step},
};

const TECHNIQUE: &str = "signature";

#[derive(Default)]
pub struct CryptoStage;

impl CryptoStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisStage for CryptoStage {
    fn technique(&self) -> &'static str {
        TECHNIQUE
    }

    fn penalty_weight(&self) -> u8 {
        40
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

        let _ = progress.append(
            Step::Stage,
            EventStatus::InProgress,
            "verifying signature byte ranges",
        );

        let mut findings = Vec::new();
        let mut integrity_breach = false;

        match locate_byte_range(bytes) {
            None => findings.push(Finding::new(
                TECHNIQUE,
                Severity::Warning,
                "no signature byte-range structure present",
            )),
            Some(range) => {
                let len = bytes.len() as u64;
                let first_end = range[0].saturating_add(range[1]);
                let second_start = range[2];
                let second_end = range[2].saturating_add(range[3]);

                if first_end > len || second_start > len || second_end > len || first_end > second_start
                {
                    findings.push(Finding::new(
                        TECHNIQUE,
                        Severity::Warning,
                        "malformed signature byte range",
                    ));
                } else if second_end < len {
                    let trailing = len - second_end;
                    integrity_breach = true;
                    findings.push(
                        Finding::new(
                            TECHNIQUE,
                            Severity::Critical,
                            format!(
                                "signature broken: document altered after signing ({trailing} bytes beyond signed range)"
                            ),
                        )
                        .with_evidence(signed_span_digest(bytes, &range)),
                    );
                } else {
                    findings.push(
                        Finding::new(
                            TECHNIQUE,
                            Severity::Info,
                            "signature byte range covers the full document",
                        )
                        .with_evidence(signed_span_digest(bytes, &range)),
                    );
                }
            }
        }

        Ok(StageOutput {
            findings,
            conclusive: true,
            integrity_breach,
            sub_documents: Vec::new(),
        })
    }
}

/// Find and parse the first `/ByteRange [a b c d]` structure.
fn locate_byte_range(bytes: &[u8]) -> Option<[u64; 4]> {
    let needle = b"/ByteRange";
    let start = find_from(bytes, needle, 0)?;
    parse_byte_range(&bytes[start + needle.len()..])
}

fn parse_byte_range(tail: &[u8]) -> Option<[u64; 4]> {
    let open = tail.iter().position(|b| *b == b'[')?;
    let close = tail[open..].iter().position(|b| *b == b']')? + open;
    let body = std::str::from_utf8(&tail[open + 1..close]).ok()?;

    let mut values = [0u64; 4];
    let mut count = 0;
    for token in body.split_ascii_whitespace() {
        if count == 4 {
            return None;
        }
        values[count] = token.parse().ok()?;
        count += 1;
    }
    (count == 4).then_some(values)
}

/// Digest of the signed spans, used as a stable evidence reference.
fn signed_span_digest(bytes: &[u8], range: &[u64; 4]) -> String {
    let mut hasher = Sha256::new();
    for pair in range.chunks(2) {
        let start = (pair[0] as usize).min(bytes.len());
        let end = (pair[0].saturating_add(pair[1]) as usize).min(bytes.len());
        hasher.update(&bytes[start..end]);
    }
    let hex = format!("{:x}", hasher.finalize());
    format!("sha256:{}", &hex[..24])
}
