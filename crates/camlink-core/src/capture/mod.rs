//! Capture pipeline: output surfaces, stream demultiplexing, results.
//!
//! A capture command names N output surfaces and a burst of M capture
//! requests. The device answers with N×M image frames plus M metadata
//! frames, and frames from different streams may interleave in any order on
//! the wire. This module validates the requested streams up front, routes
//! each inbound frame to its stream, and reassembles the caller's requested
//! result shape once everything has arrived.

pub mod demux;
pub mod result;
pub mod surface;

pub use demux::{Accepted, BufferCollector, SizeCatalog, StreamPlan, ValidationError};
pub use result::{CaptureOutput, CaptureResult};
pub use surface::{longest_exposure_ns, CaptureRequest, OutputSurface};
