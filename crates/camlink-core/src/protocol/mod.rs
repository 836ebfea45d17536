//! Wire protocol for the device control connection.
//!
//! Both directions share one TCP stream. Outbound traffic is a sequence of
//! commands, each a single `\n`-terminated UTF-8 JSON object with a required
//! `cmdName` field. Inbound traffic is a sequence of frames: a
//! `\n`-terminated JSON envelope with a `tag` field and either a `strValue`
//! or an `objValue`; when the envelope carries a `bufValueSize` field, a raw
//! binary payload of exactly that many bytes follows immediately after the
//! newline. Interleaving text and binary on one stream avoids a second
//! connection while keeping line parsing cheap.

pub mod codec;
pub mod command;
pub mod frame;

pub use codec::{read_frame, write_command, ProtocolError};
pub use command::Command;
pub use frame::{FrameTag, ImageFormat, ResponseFrame};
