//! Pipeline selection.
//!
//! A pure decision table over sniffed structural signals. Evaluated in
//! order, first match wins: cryptographic verification is the cheapest and
//! most conclusive check, so signature-bearing documents route there first
//! and can short-circuit the expensive visual stages entirely.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{StructuralSignals, sniff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    StructuralOnly,
    VisualOnly,
    CryptoThenStructural,
    HybridWithEmbeddedImages,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::StructuralOnly => "structural_only",
            PipelineKind::VisualOnly => "visual_only",
            PipelineKind::CryptoThenStructural => "crypto_then_structural",
            PipelineKind::HybridWithEmbeddedImages => "hybrid_with_embedded_images",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationError {
    pub message: String,
}

impl ClassificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ClassificationError {}

/// Select the pipeline for a document. Identical bytes and declared mime
/// always yield the same kind.
pub fn classify(bytes: &[u8], declared_mime: &str) -> Result<PipelineKind, ClassificationError> {
    classify_signals(&sniff(bytes, declared_mime))
}

/// Decision table over already-sniffed signals.
pub fn classify_signals(signals: &StructuralSignals) -> Result<PipelineKind, ClassificationError> {
    if signals.has_signature_structure {
        return Ok(PipelineKind::CryptoThenStructural);
    }
    if signals.format.is_raster() {
        return Ok(PipelineKind::VisualOnly);
    }
    if signals.declared_structured {
        if signals.has_embedded_raster {
            return Ok(PipelineKind::HybridWithEmbeddedImages);
        }
        return Ok(PipelineKind::StructuralOnly);
    }
    // The declared mime only decides when the bytes are inconclusive; a
    // sniffed format above always outranks it.
    if signals.declared_raster {
        return Ok(PipelineKind::VisualOnly);
    }
    Err(ClassificationError::new("unsupported document type"))
}
