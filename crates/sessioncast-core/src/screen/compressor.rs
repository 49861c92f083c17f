use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use super::ScreenFrame;

pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 512;

/// Opportunistic gzip for outbound frames.
///
/// Compression must never make a frame worse: content at or under the
/// threshold, any encoder failure, and any result that does not strictly
/// shrink all fall back to a raw frame.
#[derive(Debug, Clone)]
pub struct FrameCompressor {
    threshold: usize,
}

impl Default for FrameCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCompressor {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_COMPRESSION_THRESHOLD)
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Strictly greater than the threshold; content of exactly the
    /// threshold size stays raw.
    pub fn should_compress(&self, text: &str) -> bool {
        text.len() > self.threshold
    }

    /// Gzip `text`, or `None` when it is empty or the encoder fails.
    pub fn compress(&self, text: &str) -> Option<Vec<u8>> {
        if text.is_empty() {
            return None;
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        if let Err(err) = encoder.write_all(text.as_bytes()) {
            warn!(%err, "gzip write failed");
            return None;
        }
        match encoder.finish() {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(%err, "gzip finish failed");
                None
            }
        }
    }

    /// Inverse of [`compress`](Self::compress); `None` on malformed data.
    pub fn decompress(&self, data: &[u8]) -> Option<String> {
        if data.is_empty() {
            return None;
        }
        let mut text = String::new();
        match GzDecoder::new(data).read_to_string(&mut text) {
            Ok(_) => Some(text),
            Err(err) => {
                warn!(%err, "gunzip failed");
                None
            }
        }
    }

    /// Build the frame for `text`, compressed when that strictly pays off.
    pub fn compress_frame(&self, session: &str, text: &str) -> ScreenFrame {
        if !self.should_compress(text) {
            return ScreenFrame::raw(session, text);
        }
        match self.compress(text) {
            Some(bytes) if bytes.len() < text.len() => ScreenFrame::gzip(session, text, bytes),
            _ => ScreenFrame::raw(session, text),
        }
    }
}
