//! Capture results and their three shapes.

use serde_json::Value;

use crate::protocol::frame::ImageFormat;

/// One captured image: dimensions, format, per-capture metadata, and the
/// raw buffer bytes. The buffer is empty for opaque/private surfaces, and
/// `metadata` is absent when the surface's physical camera produced no
/// metadata for that capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub metadata: Option<Value>,
    pub data: Vec<u8>,
}

/// The shape of a completed capture, mirroring what was asked for:
///
/// - one surface, one capture  → [`CaptureOutput::Single`]
/// - one surface, a burst      → [`CaptureOutput::Burst`] in capture order
/// - several surfaces          → [`CaptureOutput::Surfaces`], one inner
///   sequence per surface in request order, each in capture order
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutput {
    Single(CaptureResult),
    Burst(Vec<CaptureResult>),
    Surfaces(Vec<Vec<CaptureResult>>),
}

impl CaptureOutput {
    /// The single result, when the capture was one surface × one request.
    pub fn into_single(self) -> Option<CaptureResult> {
        match self {
            CaptureOutput::Single(result) => Some(result),
            _ => None,
        }
    }

    /// The burst sequence, when the capture was one surface × M requests.
    pub fn into_burst(self) -> Option<Vec<CaptureResult>> {
        match self {
            CaptureOutput::Burst(results) => Some(results),
            _ => None,
        }
    }

    /// The per-surface sequences, for multi-surface captures.
    pub fn into_surfaces(self) -> Option<Vec<Vec<CaptureResult>>> {
        match self {
            CaptureOutput::Surfaces(results) => Some(results),
            _ => None,
        }
    }

    /// Total number of results across all shapes.
    pub fn len(&self) -> usize {
        match self {
            CaptureOutput::Single(_) => 1,
            CaptureOutput::Burst(results) => results.len(),
            CaptureOutput::Surfaces(surfaces) => surfaces.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
