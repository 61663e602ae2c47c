//! Media frames and encoding helpers for capture layers.
//!
//! The connection manager sends already-encoded bytes. Capture code that
//! holds raw pixels can use [`FrameEncoder`] to produce them, and
//! [`FrameSequencer`] to number video frames.
//!
//! # Example
//!
//! ```ignore
//! use framecast::{FrameEncoder, FrameFormat, FrameSequencer, MediaFrame};
//!
//! let encoder = FrameEncoder::new(FrameFormat::jpeg(80));
//! let sequencer = FrameSequencer::new();
//!
//! let bytes = encoder.encode_rgb8(640, 480, &pixels)?;
//! manager.send_frame(MediaFrame::video(bytes, sequencer.next()))?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::OutboundEvent;

// ============================================================================
// Constants
// ============================================================================

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Bytes per RGB8 pixel.
const RGB8_CHANNELS: u64 = 3;

// ============================================================================
// FrameKind / MediaFrame
// ============================================================================

/// How a frame is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Single still, answered with a recognition result.
    Image,
    /// Part of a recorded video.
    Video {
        /// Caller-assigned sequence number.
        sequence: u32,
    },
}

/// Encoded frame bytes plus how to send them.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Encoded image bytes; opaque to this crate.
    pub bytes: Vec<u8>,
    /// Image or video frame.
    pub kind: FrameKind,
}

impl fmt::Debug for MediaFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFrame")
            .field("bytes", &self.bytes.len())
            .field("kind", &self.kind)
            .finish()
    }
}

impl MediaFrame {
    /// Creates a still image frame.
    #[inline]
    #[must_use]
    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            kind: FrameKind::Image,
        }
    }

    /// Creates a video frame.
    #[inline]
    #[must_use]
    pub fn video(bytes: Vec<u8>, sequence: u32) -> Self {
        Self {
            bytes,
            kind: FrameKind::Video { sequence },
        }
    }

    /// Returns the encoded size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the frame carries no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Converts into the outbound event that carries it.
    #[must_use]
    pub fn into_event(self) -> OutboundEvent {
        match self.kind {
            FrameKind::Image => OutboundEvent::receive_image(self.bytes),
            FrameKind::Video { sequence } => {
                OutboundEvent::receive_video_stream(self.bytes, sequence)
            }
        }
    }
}

// ============================================================================
// FrameFormat
// ============================================================================

/// Output format for [`FrameEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Lossless, larger.
    Png,
    /// Lossy with quality (1-100).
    Jpeg(u8),
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::Jpeg(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameFormat {
    /// Creates JPEG format with quality clamped to 1-100.
    #[inline]
    #[must_use]
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg(quality.clamp(1, 100))
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg(_) => "image/jpeg",
        }
    }
}

// ============================================================================
// FrameEncoder
// ============================================================================

/// Encodes raw RGB8 pixel buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEncoder {
    format: FrameFormat,
}

impl FrameEncoder {
    /// Creates an encoder for `format`.
    #[inline]
    #[must_use]
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }

    /// Returns the output format.
    #[inline]
    #[must_use]
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Encodes a tightly packed RGB8 buffer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFrame`] if `pixels` is not `width * height * 3` bytes
    ///   or a dimension is zero
    /// - [`Error::Image`] if the codec fails
    pub fn encode_rgb8(&self, width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_frame(format!(
                "zero dimension {width}x{height}"
            )));
        }

        let expected = u64::from(width) * u64::from(height) * RGB8_CHANNELS;
        if pixels.len() as u64 != expected {
            return Err(Error::invalid_frame(format!(
                "{width}x{height} RGB8 needs {expected} bytes, got {}",
                pixels.len()
            )));
        }

        let mut output = Vec::new();
        match self.format {
            FrameFormat::Png => {
                PngEncoder::new(&mut output).write_image(
                    pixels,
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            FrameFormat::Jpeg(quality) => {
                JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100)).write_image(
                    pixels,
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            }
        }

        trace!(width, height, bytes = output.len(), format = self.format.mime_type(), "Frame encoded");
        Ok(output)
    }

    /// Builds a [`MediaFrame`] for a still image.
    ///
    /// # Errors
    ///
    /// See [`FrameEncoder::encode_rgb8`].
    pub fn image(&self, width: u32, height: u32, pixels: &[u8]) -> Result<MediaFrame> {
        self.encode_rgb8(width, height, pixels).map(MediaFrame::image)
    }

    /// Builds a [`MediaFrame`] for a video frame.
    ///
    /// # Errors
    ///
    /// See [`FrameEncoder::encode_rgb8`].
    pub fn video(
        &self,
        width: u32,
        height: u32,
        pixels: &[u8],
        sequence: u32,
    ) -> Result<MediaFrame> {
        self.encode_rgb8(width, height, pixels)
            .map(|bytes| MediaFrame::video(bytes, sequence))
    }
}

// ============================================================================
// FrameSequencer
// ============================================================================

/// Monotonic video frame counter.
///
/// Starts at zero and wraps on overflow.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    next: AtomicU32,
}

impl FrameSequencer {
    /// Creates a counter starting at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number.
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns how many numbers were handed out since the last reset.
    #[inline]
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    /// Restarts at zero, for a new recording.
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================
