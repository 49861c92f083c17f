//! Screen frames and the machinery that produces them.

pub mod capture;
pub mod compressor;

pub use capture::{CaptureSettings, FrameSink, ScreenCapture};
pub use compressor::FrameCompressor;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// One captured screen snapshot.
///
/// `raw_text` always starts with the clear-and-home prefix, so every
/// frame repaints the whole viewer; nothing upstream needs frame history.
/// `is_compressed` holds only when the gzip bytes are strictly smaller
/// than the UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenFrame {
    pub session: String,
    pub raw_text: String,
    pub compressed: Option<Vec<u8>>,
    pub is_compressed: bool,
    /// Milliseconds since the Unix epoch, stamped at capture.
    pub timestamp: u64,
    pub cols: u16,
    pub rows: u16,
}

impl ScreenFrame {
    pub fn raw(session: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            raw_text: raw_text.into(),
            compressed: None,
            is_compressed: false,
            timestamp: crate::now_ms(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn gzip(
        session: impl Into<String>,
        raw_text: impl Into<String>,
        compressed: Vec<u8>,
    ) -> Self {
        Self {
            session: session.into(),
            raw_text: raw_text.into(),
            compressed: Some(compressed),
            is_compressed: true,
            timestamp: crate::now_ms(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn with_dimensions(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// The payload as it goes on the wire: base64 of the gzip bytes when
    /// compressed, base64 of the UTF-8 text otherwise.
    pub fn base64_payload(&self) -> String {
        match &self.compressed {
            Some(bytes) if self.is_compressed => BASE64_STANDARD.encode(bytes),
            _ => BASE64_STANDARD.encode(self.raw_text.as_bytes()),
        }
    }
}
