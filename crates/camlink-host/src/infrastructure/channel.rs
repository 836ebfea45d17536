//! Blocking TCP control channel.
//!
//! One channel carries the whole session: outbound command lines and
//! inbound frames with their binary trailers, interleaved on a single
//! stream. The engine talks to the [`ControlChannel`] trait so tests can
//! substitute a scripted channel; [`TcpChannel`] is the production
//! implementation over `std::net::TcpStream` with a per-call read timeout.

use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use camlink_core::protocol::codec::{read_frame, write_command, ProtocolError};
use camlink_core::{Command, ResponseFrame};

/// Transport seam for the session engine.
pub trait ControlChannel {
    /// Writes one command line.
    fn send(&mut self, cmd: &Command) -> Result<(), ProtocolError>;

    /// Reads one complete frame, blocking up to the current read timeout.
    fn receive(&mut self) -> Result<ResponseFrame, ProtocolError>;

    /// Replaces the read timeout for subsequent receives.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ProtocolError>;
}

/// [`ControlChannel`] over a blocking TCP stream.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Connects to the forwarded control endpoint on localhost.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] when the TCP connection cannot be
    /// established or the initial timeout cannot be applied.
    pub fn connect(port: u16, read_timeout: Duration) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(("127.0.0.1", port))?;
        stream.set_read_timeout(Some(read_timeout))?;
        debug!(port, "control channel connected");
        Ok(Self { stream })
    }
}

impl ControlChannel for TcpChannel {
    fn send(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        write_command(&mut self.stream, cmd)
    }

    fn receive(&mut self) -> Result<ResponseFrame, ProtocolError> {
        read_frame(&mut self.stream)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }
}
