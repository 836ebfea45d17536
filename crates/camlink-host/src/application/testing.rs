//! Scripted channel double for engine unit tests.
//!
//! Plays back a fixed sequence of replies and records everything the
//! engine did: commands sent and read timeouts applied. Shared handles let
//! tests inspect the log after the session has been dropped.

use std::collections::VecDeque;
use std::rc::Rc;
use std::cell::RefCell;
use std::time::Duration;

use camlink_core::protocol::codec::ProtocolError;
use camlink_core::{Command, ResponseFrame};

use crate::infrastructure::channel::ControlChannel;

/// One scripted reply to a `receive` call.
#[derive(Debug, Clone)]
pub enum Reply {
    Frame(ResponseFrame),
    /// The peer closed the stream.
    Closed,
    /// The read timed out.
    TimedOut,
}

#[derive(Debug, Default)]
struct LogInner {
    sent: Vec<Command>,
    timeouts_set: Vec<Duration>,
}

/// Shared view of what the channel observed.
#[derive(Debug, Clone, Default)]
pub struct ChannelLog(Rc<RefCell<LogInner>>);

impl ChannelLog {
    pub fn sent(&self) -> Vec<Command> {
        self.0.borrow().sent.clone()
    }

    pub fn timeouts_set(&self) -> Vec<Duration> {
        self.0.borrow().timeouts_set.clone()
    }
}

/// [`ControlChannel`] that replays a scripted reply queue.
#[derive(Debug)]
pub struct ScriptedChannel {
    replies: VecDeque<Reply>,
    log: ChannelLog,
}

impl ScriptedChannel {
    pub fn new(replies: Vec<Reply>) -> (Self, ChannelLog) {
        let log = ChannelLog::default();
        (
            Self {
                replies: replies.into(),
                log: log.clone(),
            },
            log,
        )
    }
}

impl ControlChannel for ScriptedChannel {
    fn send(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        self.log.0.borrow_mut().sent.push(cmd.clone());
        Ok(())
    }

    fn receive(&mut self) -> Result<ResponseFrame, ProtocolError> {
        match self.replies.pop_front() {
            Some(Reply::Frame(frame)) => Ok(frame),
            Some(Reply::Closed) | None => Err(ProtocolError::ChannelClosed),
            Some(Reply::TimedOut) => Err(ProtocolError::Timeout),
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        self.log.0.borrow_mut().timeouts_set.push(timeout);
        Ok(())
    }
}
