//! Convergence polling state machines.
//!
//! Triggering 3A (auto-exposure, auto-focus, auto-white-balance) starts an
//! iterative exchange: the device streams partial-result frames while its
//! algorithms run, signals `3aConverged` when they settle, and `3aDone`
//! when the routine ends. `3aDone` terminates polling even when
//! `3aConverged` was never observed; only the post-exit validation in
//! [`ConvergencePoller::finish`] catches that case, and only when results
//! were requested. Autoframing follows the same shape over its own tag
//! pair and always requires convergence.

use thiserror::Error;

use crate::protocol::codec::ProtocolError;
use crate::protocol::frame::{FrameTag, ResponseFrame};

/// Which algorithms were triggered and what the caller expects back.
///
/// AWB partial results are recorded whenever they arrive, whether or not
/// AWB was requested; `mono_camera` waives the AWB validation entirely.
#[derive(Debug, Clone, Copy)]
pub struct ThreeATriggers {
    pub do_ae: bool,
    pub do_awb: bool,
    pub do_af: bool,
    pub mono_camera: bool,
    pub want_results: bool,
}

impl Default for ThreeATriggers {
    fn default() -> Self {
        Self {
            do_ae: true,
            do_awb: true,
            do_af: true,
            mono_camera: false,
            want_results: false,
        }
    }
}

/// Accumulated 3A outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreeAResult {
    /// AE sensitivity (ISO).
    pub ae_sensitivity: Option<i64>,
    /// AE exposure time in nanoseconds.
    pub ae_exposure_ns: Option<i64>,
    /// AWB per-channel gains (4 values).
    pub awb_gains: Option<Vec<f64>>,
    /// AWB color transform (9 values, row major).
    pub awb_transform: Option<Vec<f64>>,
    /// AF focus distance.
    pub af_distance: Option<f64>,
    /// Whether a converged signal was observed before done.
    pub converged: bool,
}

/// Errors raised when a convergence routine ends in an unusable state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvergenceError {
    #[error("{algorithm} was requested but produced no result")]
    MissingResult { algorithm: &'static str },

    #[error("3a did not converge before the device reported done")]
    NotConverged,

    #[error("autoframing did not converge")]
    AutoframingNotConverged,
}

/// What [`ConvergencePoller::observe`] decided about a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Keep receiving frames.
    Continue,
    /// The terminal done signal arrived; stop polling.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    Running,
    Converged,
    Done,
}

// ── 3A poller ─────────────────────────────────────────────────────────────────

/// State machine for one `do3A` exchange.
#[derive(Debug)]
pub struct ConvergencePoller {
    triggers: ThreeATriggers,
    state: PollState,
    result: ThreeAResult,
}

impl ConvergencePoller {
    pub fn new(triggers: ThreeATriggers) -> Self {
        Self {
            triggers,
            state: PollState::Running,
            result: ThreeAResult::default(),
        }
    }

    /// Folds one inbound frame into the state machine.
    ///
    /// Partial-result frames update fields without a state change;
    /// `3aConverged` marks convergence but polling continues; `3aDone`
    /// finishes. Any other tag is a protocol error.
    pub fn observe(&mut self, frame: &ResponseFrame) -> Result<PollStep, ProtocolError> {
        match frame.tag {
            FrameTag::AeResult => {
                if self.triggers.do_ae {
                    let values = parse_numbers(frame, 2)?;
                    self.result.ae_sensitivity = Some(values[0] as i64);
                    self.result.ae_exposure_ns = Some(values[1] as i64);
                }
                Ok(PollStep::Continue)
            }
            FrameTag::AfResult => {
                if self.triggers.do_af {
                    let values = parse_numbers(frame, 1)?;
                    self.result.af_distance = Some(values[0]);
                }
                Ok(PollStep::Continue)
            }
            FrameTag::AwbResult => {
                let values = parse_numbers(frame, 13)?;
                self.result.awb_gains = Some(values[..4].to_vec());
                self.result.awb_transform = Some(values[4..].to_vec());
                Ok(PollStep::Continue)
            }
            FrameTag::Converged => {
                self.state = PollState::Converged;
                self.result.converged = true;
                Ok(PollStep::Continue)
            }
            FrameTag::Done => {
                self.state = PollState::Done;
                Ok(PollStep::Finished)
            }
            ref other => Err(ProtocolError::UnexpectedTag {
                expected: "3a result frame".to_string(),
                got: other.to_string(),
            }),
        }
    }

    /// Validates the terminal state against the trigger flags.
    ///
    /// Convergence alone is enough when results were not requested. When
    /// they were — or when convergence was never reached — every triggered
    /// algorithm must have produced a result and `3aConverged` must have
    /// been observed.
    pub fn finish(self) -> Result<ThreeAResult, ConvergenceError> {
        debug_assert_eq!(self.state, PollState::Done, "finish before done frame");

        if self.result.converged && !self.triggers.want_results {
            return Ok(self.result);
        }
        if self.triggers.do_ae && self.result.ae_sensitivity.is_none() {
            return Err(ConvergenceError::MissingResult {
                algorithm: "auto-exposure",
            });
        }
        if !self.triggers.mono_camera && self.triggers.do_awb && self.result.awb_gains.is_none() {
            return Err(ConvergenceError::MissingResult {
                algorithm: "auto-white-balance",
            });
        }
        if self.triggers.do_af && self.result.af_distance.is_none() {
            return Err(ConvergenceError::MissingResult {
                algorithm: "auto-focus",
            });
        }
        if !self.result.converged {
            return Err(ConvergenceError::NotConverged);
        }
        Ok(self.result)
    }
}

/// Parses a whitespace-separated `strValue` into at least `min` floats.
fn parse_numbers(frame: &ResponseFrame, min: usize) -> Result<Vec<f64>, ProtocolError> {
    let text = frame.str_value()?;
    let values = text
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            ProtocolError::MalformedFrame(format!("{} value {text:?}: {e}", frame.tag))
        })?;
    if values.len() < min {
        return Err(ProtocolError::MalformedFrame(format!(
            "{} carried {} values, need {min}",
            frame.tag,
            values.len()
        )));
    }
    Ok(values)
}

// ── Autoframing poller ────────────────────────────────────────────────────────

/// State machine for one `doAutoframing` exchange.
#[derive(Debug, Default)]
pub struct AutoframingPoller {
    converged: bool,
}

impl AutoframingPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, frame: &ResponseFrame) -> Result<PollStep, ProtocolError> {
        match frame.tag {
            FrameTag::AutoframingConverged => {
                self.converged = true;
                Ok(PollStep::Continue)
            }
            FrameTag::AutoframingDone => Ok(PollStep::Finished),
            ref other => Err(ProtocolError::UnexpectedTag {
                expected: "autoframing frame".to_string(),
                got: other.to_string(),
            }),
        }
    }

    pub fn finish(self) -> Result<(), ConvergenceError> {
        if self.converged {
            Ok(())
        } else {
            Err(ConvergenceError::AutoframingNotConverged)
        }
    }
}
