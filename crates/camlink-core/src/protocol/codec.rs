//! Line codec for the device control stream.
//!
//! Wire format, outbound:
//! ```text
//! {"cmdName":"doCapture", ...}\n
//! ```
//! Wire format, inbound:
//! ```text
//! {"tag":"yuvImage","bufValueSize":460800}\n<460800 raw bytes>
//! ```
//!
//! The reader consumes bytes until a newline, decodes the line as the JSON
//! envelope, and — when the envelope declares `bufValueSize` — keeps reading
//! until exactly that many additional bytes have been consumed. A single
//! `read()` may return fewer bytes than requested; that is normal and the
//! trailer loop continues until the declared size is met. A read that
//! returns zero bytes means the peer closed the stream: the frame is
//! unrecoverable and the session that owns the stream must be discarded.

use std::io::{self, Read, Write};

use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use super::command::Command;
use super::frame::{FrameTag, ResponseFrame};

/// Hard cap on a single frame line, to bound memory on a corrupt stream.
const MAX_LINE_BYTES: usize = 1 << 20;

/// Errors raised while encoding commands or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the stream before a complete frame was read. Fatal:
    /// the session owning the channel is unusable.
    #[error("channel closed by device mid-frame")]
    ChannelClosed,

    /// The read timed out before a complete frame arrived. Fatal for the
    /// session: a command is now half-consumed on the wire.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// An I/O error occurred on the underlying stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// The envelope line was not valid JSON, or violated the frame schema.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A frame arrived with a tag outside the set the caller accepts.
    #[error("unexpected tag: expected {expected}, got {got}")]
    UnexpectedTag { expected: String, got: String },

    /// The frame lacked a field the caller requires (`strValue`/`objValue`).
    #[error("frame {tag} is missing its {field} field")]
    MissingField { tag: String, field: &'static str },
}

/// Serde view of the inbound envelope line.
#[derive(Debug, Deserialize)]
struct Envelope {
    tag: String,
    #[serde(rename = "strValue")]
    str_value: Option<String>,
    #[serde(rename = "objValue")]
    obj_value: Option<serde_json::Value>,
    #[serde(rename = "bufValueSize")]
    buf_value_size: Option<usize>,
}

/// Writes one command as a newline-terminated JSON line.
///
/// # Errors
///
/// Returns [`ProtocolError::Io`] if the write fails.
pub fn write_command<W: Write>(writer: &mut W, cmd: &Command) -> Result<(), ProtocolError> {
    let mut line = serde_json::to_vec(&cmd.to_json())
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    trace!(command = cmd.name(), bytes = line.len(), "command sent");
    Ok(())
}

/// Reads one complete frame: envelope line plus declared binary trailer.
///
/// Frames with no `bufValueSize` yield `payload: None` and never block
/// waiting for trailer bytes.
///
/// # Errors
///
/// - [`ProtocolError::ChannelClosed`] when the stream ends mid-frame.
/// - [`ProtocolError::Timeout`] when the underlying read times out.
/// - [`ProtocolError::MalformedFrame`] when the line is not a valid
///   envelope.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<ResponseFrame, ProtocolError> {
    let line = read_line(reader)?;
    let envelope: Envelope = serde_json::from_slice(&line)
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    let payload = match envelope.buf_value_size {
        None => None,
        Some(n) => {
            let mut buf = vec![0u8; n];
            read_exact(reader, &mut buf)?;
            Some(buf)
        }
    };

    let tag = FrameTag::parse(&envelope.tag);
    trace!(%tag, payload = payload.as_ref().map_or(0, Vec::len), "frame received");
    Ok(ResponseFrame {
        tag,
        str_value: envelope.str_value,
        obj_value: envelope.obj_value,
        payload,
    })
}

/// Reads bytes until a `\n`, returning the line without the terminator.
fn read_line<R: Read>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut line = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).map_err(map_io)?;
        if n == 0 {
            return Err(ProtocolError::ChannelClosed);
        }
        if byte[0] == b'\n' {
            return Ok(line);
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE_BYTES {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame line exceeds {MAX_LINE_BYTES} bytes without a newline"
            )));
        }
    }
}

/// Fills `buf` handling partial reads; EOF mid-trailer is a closed channel.
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).map_err(map_io)?;
        if n == 0 {
            return Err(ProtocolError::ChannelClosed);
        }
        filled += n;
    }
    Ok(())
}

fn map_io(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProtocolError::Timeout,
        _ => ProtocolError::Io(e),
    }
}
