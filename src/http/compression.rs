//! Gzip response encoding.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Encoding negotiated by the compression stage and applied at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
}

impl ContentEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "gzip",
        }
    }
}

const COMPRESSIBLE: &[&str] = &[
    "text/",
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xhtml+xml",
    "image/svg+xml",
];

/// Does an `Accept-Encoding` value admit gzip? Honors `q=0`.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|item| {
        let mut parts = item.split(';').map(str::trim);
        let coding = parts.next().unwrap_or_default();
        if !(coding.eq_ignore_ascii_case("gzip") || coding == "*") {
            return false;
        }
        !parts.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .map(|q| q == 0.0)
                .unwrap_or(false)
        })
    })
}

pub fn is_compressible(content_type: &str) -> bool {
    let media = content_type.trim().to_ascii_lowercase();
    COMPRESSIBLE.iter().any(|prefix| media.starts_with(prefix))
}

/// Gzip magic bytes.
pub fn is_gzipped(data: &[u8]) -> bool {
    data.starts_with(&[0x1f, 0x8b])
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
    min_size: usize,
}

impl GzipCompressor {
    pub fn new(level: u32, min_size: usize) -> Self {
        Self {
            level: level.min(9),
            min_size,
        }
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish()
    }

    /// Compressed bytes, or `None` when compressing would not pay off.
    pub fn compress_if_beneficial(&self, data: &[u8], content_type: &str) -> Option<Vec<u8>> {
        if data.len() < self.min_size || !is_compressible(content_type) || is_gzipped(data) {
            return None;
        }
        match self.compress(data) {
            Ok(compressed) if compressed.len() < data.len() => Some(compressed),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Gzip encoding failed, sending identity body");
                None
            }
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(6, 1024)
    }
}
