//! # camlink-host
//!
//! Host-side session engine for remote image-capture devices.
//!
//! A device exposes its control service on a fixed remote TCP port; the
//! host reaches it through a forwarded local port. This crate owns
//! everything on the host side of that connection:
//!
//! - **`infrastructure`** – the port arbiter (exclusive allocation of one
//!   forwarded port per device across concurrent host processes), the
//!   forwarding-tool seam, and the blocking TCP control channel.
//! - **`application`** – the [`Session`] engine: one device, one opened
//!   camera, one in-flight command at a time. Capture bursts, 3A
//!   convergence, recordings, and capability queries all go through it.
//! - **`domain`** – host configuration and the camera-properties wrapper
//!   that answers capability lookups.
//!
//! Sessions are strictly single-owner and synchronous: every operation
//! takes `&mut self`, blocks until its response frames have arrived, and
//! leaves the socket quiet. Concurrency across devices comes from running
//! one session per device, not from sharing one.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::convergence::{ThreeAConfig, WeightedRegion};
pub use application::queries::RecordingOptions;
pub use application::session::{Session, SessionError, SessionErrorKind, Timeouts};
pub use domain::config::{ConfigError, HostConfig};
pub use domain::properties::CameraProperties;
pub use infrastructure::channel::{ControlChannel, TcpChannel};
pub use infrastructure::forwarder::{AdbForwarder, ForwardError, ForwardRule, PortForwarder};
pub use infrastructure::port_arbiter::{AllocationError, ArbiterSettings, PortArbiter};
