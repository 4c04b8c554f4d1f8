//! In-memory document handle and byte-level structural sniffing.
//!
//! The classifier and every analysis stage work from the same sniffed
//! signals so that classification stays idempotent for identical input.

use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Document {
    /// Stable reference for progress events, reasoning requests, and
    /// evidence artifacts. Embedded sub-documents extend the parent
    /// reference with their extraction index.
    pub reference: String,
    pub declared_mime: String,
    pub bytes: Arc<Vec<u8>>,
    /// Extraction depth; 0 for the submitted document.
    pub depth: u8,
}

impl Document {
    pub fn new(reference: impl Into<String>, declared_mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            reference: reference.into(),
            declared_mime: declared_mime.into(),
            bytes: Arc::new(bytes),
            depth: 0,
        }
    }

    /// Derive a sub-document handle for content extracted out of this one.
    pub fn embedded(&self, index: usize, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            reference: format!("{}/embedded/{}", self.reference, index),
            declared_mime: mime.into(),
            bytes: Arc::new(bytes),
            depth: self.depth.saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    Bmp,
    Webp,
    Unknown,
}

impl DocumentFormat {
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            DocumentFormat::Jpeg
                | DocumentFormat::Png
                | DocumentFormat::Tiff
                | DocumentFormat::Bmp
                | DocumentFormat::Webp
        )
    }
}

/// Signals derived purely from the input bytes and the declared mime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralSignals {
    pub format: DocumentFormat,
    pub declared_raster: bool,
    pub declared_structured: bool,
    /// A cryptographic-signature structure is present (`/ByteRange`).
    pub has_signature_structure: bool,
    /// The document embeds raster assets (image XObjects / JPEG streams).
    pub has_embedded_raster: bool,
}

pub fn sniff(bytes: &[u8], declared_mime: &str) -> StructuralSignals {
    let format = sniff_format(bytes);
    let mime = declared_mime.trim().to_ascii_lowercase();

    let structured = format == DocumentFormat::Pdf || mime == "application/pdf";

    StructuralSignals {
        format,
        declared_raster: mime.starts_with("image/"),
        declared_structured: structured,
        has_signature_structure: structured && contains(bytes, b"/ByteRange"),
        has_embedded_raster: structured
            && (contains(bytes, b"/Image") || contains(bytes, b"/DCTDecode")),
    }
}

fn sniff_format(bytes: &[u8]) -> DocumentFormat {
    if bytes.starts_with(b"%PDF-") {
        return DocumentFormat::Pdf;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return DocumentFormat::Jpeg;
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return DocumentFormat::Png;
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return DocumentFormat::Tiff;
    }
    if bytes.starts_with(b"BM") {
        return DocumentFormat::Bmp;
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return DocumentFormat::Webp;
    }
    DocumentFormat::Unknown
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    count_occurrences(haystack, needle) > 0
}

pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// First index of `needle` at or after `from`, if any.
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
