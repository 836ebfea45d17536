//! # camlink-core
//!
//! Shared library for camlink containing the device wire protocol, the
//! capture-stream demultiplexer, and the 3A convergence state machine.
//!
//! camlink drives a remote image-capture service: a host-side controller
//! sends capture and configuration commands over a forwarded TCP connection
//! and receives responses that mix control metadata with raw binary image
//! payloads. This crate is the pure foundation for that controller.
//! It has zero dependencies on OS process APIs or network sockets; all I/O
//! is expressed against `std::io::Read`/`Write` so the host crate (and the
//! tests) can plug in any byte stream.
//!
//! Module map:
//!
//! - **`protocol`** – How bytes travel over the wire. Outbound commands are
//!   single newline-terminated JSON objects; inbound frames are JSON
//!   envelopes optionally followed by a declared-length binary trailer.
//!   Inbound tag strings are decoded exactly once into the closed
//!   [`FrameTag`] enum before any other code branches on them.
//!
//! - **`capture`** – The stream demultiplexer. A burst of M capture
//!   requests against N output surfaces produces N×M image buffers plus M
//!   metadata frames, interleaved across streams in arbitrary order; this
//!   module regroups them into the caller's requested shape.
//!
//! - **`threea`** – The convergence poller for auto-exposure, auto-focus,
//!   and auto-white-balance, plus the autoframing variant.

pub mod capture;
pub mod protocol;
pub mod threea;

// Re-export the most-used types at the crate root so callers can write
// `camlink_core::Command` instead of `camlink_core::protocol::command::Command`.
pub use capture::demux::{BufferCollector, SizeCatalog, StreamPlan, ValidationError};
pub use capture::result::{CaptureOutput, CaptureResult};
pub use capture::surface::{CaptureRequest, OutputSurface};
pub use protocol::codec::{read_frame, write_command, ProtocolError};
pub use protocol::command::Command;
pub use protocol::frame::{FrameTag, ImageFormat, ResponseFrame};
pub use threea::{
    AutoframingPoller, ConvergencePoller, ConvergenceError, PollStep, ThreeAResult,
    ThreeATriggers,
};
