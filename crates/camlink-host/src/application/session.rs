//! The blocking session engine.
//!
//! A [`Session`] is bound to one device and one opened camera, and
//! exclusively owns the control channel. It is strictly single-owner:
//! every operation takes `&mut self`, sends exactly one command, and
//! consumes every response frame belonging to it before returning. There
//! is no pipelining and no internal locking; using one session from two
//! call sites concurrently is ruled out by the borrow checker.
//!
//! Timeout discipline: the channel carries a baseline read timeout.
//! Operations that are legitimately slow — long exposures, recordings,
//! performance measurements, warm-up bursts — widen it for the duration of
//! the call, and the baseline is restored whether the call succeeds or
//! fails. An expired timeout means a response is now half-consumed on the
//! wire, so it is fatal: the session refuses further use of the channel
//! for cleanup and must be discarded.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use camlink_core::protocol::codec::ProtocolError;
use camlink_core::{Command, ConvergenceError, FrameTag, ResponseFrame, ValidationError};

use crate::domain::config::{HostConfig, TimeoutConfig};
use crate::domain::properties::CameraProperties;
use crate::infrastructure::channel::{ControlChannel, TcpChannel};
use crate::infrastructure::forwarder::PortForwarder;
use crate::infrastructure::port_arbiter::{AllocationError, ArbiterSettings, PortArbiter};

// ── Timeouts ──────────────────────────────────────────────────────────────────

/// Resolved socket timeouts for one session.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Baseline for every receive.
    pub base: Duration,
    /// Extra slack for slow queries and warm-up bursts.
    pub extra: Duration,
    /// Budget for performance-measurement operations.
    pub perf: Duration,
}

impl Timeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            base: Duration::from_secs(config.base_secs),
            extra: Duration::from_secs(config.extra_secs),
            perf: Duration::from_secs(config.perf_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A failed session operation, carrying the device, camera, and command it
/// belongs to.
#[derive(Debug, Error)]
#[error("command {command} on device {device_id} camera {camera_id} failed: {kind}")]
pub struct SessionError {
    pub device_id: String,
    pub camera_id: String,
    pub command: String,
    #[source]
    pub kind: SessionErrorKind,
}

/// What went wrong, by protocol layer.
#[derive(Debug, Error)]
pub enum SessionErrorKind {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    /// The request was rejected host-side before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One device, one opened camera, one in-flight command at a time.
pub struct Session<C: ControlChannel> {
    device_id: String,
    camera_id: String,
    hidden_physical_id: Option<String>,
    channel: C,
    timeouts: Timeouts,
    props: Option<CameraProperties>,
    opened: bool,
    /// Set after a transport failure; the channel state is unknown and the
    /// session must be discarded, not reused.
    fatal: bool,
}

impl Session<TcpChannel> {
    /// Arbitrates a forwarded port, connects, and opens the camera.
    pub fn connect(
        device_id: impl Into<String>,
        camera_id: impl Into<String>,
        config: &HostConfig,
        forwarder: &dyn PortForwarder,
    ) -> Result<Self, SessionError> {
        let device_id = device_id.into();
        let camera_id = camera_id.into();
        let timeouts = Timeouts::from_config(&config.timeouts);

        let connect_err = |command: &str, kind: SessionErrorKind| SessionError {
            device_id: device_id.clone(),
            camera_id: camera_id.clone(),
            command: command.to_string(),
            kind,
        };

        let arbiter = PortArbiter::new(ArbiterSettings::from_config(&config.connect));
        let port = arbiter
            .allocate(forwarder, &device_id)
            .map_err(|e| connect_err("allocatePort", e.into()))?;
        let channel = TcpChannel::connect(port, timeouts.base)
            .map_err(|e| connect_err("connect", e.into()))?;

        let mut session = Session::with_channel(channel, device_id, camera_id, timeouts);
        session.open_camera()?;
        Ok(session)
    }
}

impl<C: ControlChannel> Session<C> {
    /// Builds a session over an already-connected channel. The camera is
    /// not opened; call [`Session::open_camera`]. Intended for transports
    /// that were forwarded out of band, and for tests.
    pub fn with_channel(
        channel: C,
        device_id: impl Into<String>,
        camera_id: impl Into<String>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            camera_id: camera_id.into(),
            hidden_physical_id: None,
            channel,
            timeouts,
            props: None,
            opened: false,
            fatal: false,
        }
    }

    /// Targets a hidden physical sub-camera of the opened logical camera:
    /// capture surfaces and 3A commands are routed to it.
    pub fn with_hidden_physical_camera(mut self, physical_id: impl Into<String>) -> Self {
        self.hidden_physical_id = Some(physical_id.into());
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn hidden_physical_id(&self) -> Option<&str> {
        self.hidden_physical_id.as_deref()
    }

    pub(crate) fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens the session's camera.
    pub fn open_camera(&mut self) -> Result<(), SessionError> {
        let cmd = Command::new("open").arg("cameraId", self.camera_id.clone());
        self.execute(cmd, FrameTag::CameraOpened)?;
        self.opened = true;
        info!(device = %self.device_id, camera = %self.camera_id, "camera opened");
        Ok(())
    }

    /// Closes the session's camera. The session stays usable: a subsequent
    /// [`Session::open_camera`] starts a fresh camera lifecycle.
    pub fn close_camera(&mut self) -> Result<(), SessionError> {
        self.execute(Command::new("close"), FrameTag::CameraClosed)?;
        self.opened = false;
        debug!(device = %self.device_id, camera = %self.camera_id, "camera closed");
        Ok(())
    }

    // ── Command/response core ─────────────────────────────────────────────────

    /// Sends one command and receives its response frame. Any tag other
    /// than `expected` is a protocol error.
    pub fn execute(
        &mut self,
        cmd: Command,
        expected: FrameTag,
    ) -> Result<ResponseFrame, SessionError> {
        let command = cmd.name().to_string();
        self.send_command(&cmd)?;
        let frame = self.receive_frame(&command)?;
        if frame.tag != expected {
            let kind = ProtocolError::UnexpectedTag {
                expected: expected.to_string(),
                got: frame.tag.to_string(),
            };
            return Err(self.fail(&command, kind));
        }
        Ok(frame)
    }

    pub(crate) fn send_command(&mut self, cmd: &Command) -> Result<(), SessionError> {
        let command = cmd.name().to_string();
        debug!(command = %command, "sending command");
        match self.channel.send(cmd) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(&command, e)),
        }
    }

    pub(crate) fn receive_frame(&mut self, command: &str) -> Result<ResponseFrame, SessionError> {
        match self.channel.receive() {
            Ok(frame) => Ok(frame),
            Err(e) => Err(self.fail(command, e)),
        }
    }

    /// Runs `f` with the read timeout widened to `timeout`, restoring the
    /// baseline afterwards whether `f` succeeded or not.
    pub(crate) fn with_widened_timeout<T>(
        &mut self,
        command: &str,
        timeout: Duration,
        f: impl FnOnce(&mut Self) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if let Err(e) = self.channel.set_read_timeout(timeout) {
            return Err(self.fail(command, e));
        }
        let result = f(self);
        let restored = self.channel.set_read_timeout(self.timeouts.base);
        match (result, restored) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(self.fail(command, e)),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Wraps a failure with this session's identifiers, and poisons the
    /// session on transport failures.
    pub(crate) fn fail(
        &mut self,
        command: &str,
        kind: impl Into<SessionErrorKind>,
    ) -> SessionError {
        let kind = kind.into();
        if matches!(
            kind,
            SessionErrorKind::Protocol(
                ProtocolError::ChannelClosed | ProtocolError::Timeout | ProtocolError::Io(_)
            )
        ) {
            self.fatal = true;
        }
        SessionError {
            device_id: self.device_id.clone(),
            camera_id: self.camera_id.clone(),
            command: command.to_string(),
            kind,
        }
    }

    // ── Properties ────────────────────────────────────────────────────────────

    /// Fetches the opened camera's properties and caches them on the
    /// session. The cache is per-session state; two sessions never share it.
    pub fn camera_properties(&mut self) -> Result<CameraProperties, SessionError> {
        let frame = self.execute(
            Command::new("getCameraProperties"),
            FrameTag::CameraProperties,
        )?;
        let props = extract_properties(&frame)
            .map_err(|kind| self.fail("getCameraProperties", kind))?;
        self.props = Some(props.clone());
        Ok(props)
    }

    /// Fetches the properties of an arbitrary camera by id, without
    /// touching the session cache.
    pub fn camera_properties_by_id(
        &mut self,
        camera_id: &str,
    ) -> Result<CameraProperties, SessionError> {
        let cmd = Command::new("getCameraPropertiesById").arg("cameraId", camera_id);
        let frame = self.execute(cmd, FrameTag::CameraProperties)?;
        extract_properties(&frame).map_err(|kind| self.fail("getCameraPropertiesById", kind))
    }

    /// The cached properties, fetching them on first use.
    pub(crate) fn ensure_properties(&mut self) -> Result<CameraProperties, SessionError> {
        match &self.props {
            Some(props) => Ok(props.clone()),
            None => self.camera_properties(),
        }
    }

    /// Rejects a zoom ratio outside the device's supported range.
    pub(crate) fn validate_zoom(
        &mut self,
        command: &str,
        zoom_ratio: Option<f64>,
    ) -> Result<(), SessionError> {
        let Some(ratio) = zoom_ratio else {
            return Ok(());
        };
        let props = self.ensure_properties()?;
        if props.zoom_ratio_within_range(ratio) {
            Ok(())
        } else {
            Err(self.fail(
                command,
                SessionErrorKind::InvalidRequest(format!("zoom ratio {ratio} out of range")),
            ))
        }
    }

    /// All camera ids on the device.
    pub fn camera_ids(&mut self) -> Result<Vec<String>, SessionError> {
        let widened = self.timeouts.base + self.timeouts.extra;
        let frame = self.with_widened_timeout("getCameraIds", widened, |session| {
            session.execute(Command::new("getCameraIds"), FrameTag::CameraIds)
        })?;
        let ids = frame
            .obj_value()
            .ok()
            .and_then(|obj| obj.get("cameraIdArray"))
            .and_then(serde_json::Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            });
        ids.ok_or_else(|| {
            let kind = ProtocolError::MalformedFrame("cameraIds without cameraIdArray".into());
            self.fail("getCameraIds", kind)
        })
    }

    /// Physical sub-cameras of `camera_id` that are currently unavailable.
    /// The payload is passed through opaquely.
    pub fn unavailable_physical_cameras(
        &mut self,
        camera_id: &str,
    ) -> Result<serde_json::Value, SessionError> {
        let cmd = Command::new("doGetUnavailablePhysicalCameras").arg("cameraId", camera_id);
        let widened = self.timeouts.base + self.timeouts.extra;
        let frame = self
            .with_widened_timeout("doGetUnavailablePhysicalCameras", widened, |session| {
                session.execute(cmd, FrameTag::UnavailablePhysicalCameras)
            })?;
        match frame.obj_value() {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(self.fail("doGetUnavailablePhysicalCameras", e)),
        }
    }
}

fn extract_properties(frame: &ResponseFrame) -> Result<CameraProperties, SessionErrorKind> {
    let obj = frame.obj_value()?;
    let value = obj.get("cameraProperties").cloned().ok_or_else(|| {
        ProtocolError::MalformedFrame("cameraProperties frame without cameraProperties".into())
    })?;
    Ok(CameraProperties::from_value(value))
}

impl<C: ControlChannel> Drop for Session<C> {
    /// Best-effort camera close on exit. Skipped after a transport failure:
    /// the channel state is unknown and a close would block on a dead peer.
    fn drop(&mut self) {
        if self.opened && !self.fatal {
            if let Err(e) = self.close_camera() {
                warn!(error = %e, "camera close on session drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{ChannelLog, Reply, ScriptedChannel};
    use serde_json::json;

    fn frame(tag: &str) -> ResponseFrame {
        ResponseFrame {
            tag: FrameTag::parse(tag),
            str_value: None,
            obj_value: None,
            payload: None,
        }
    }

    fn session_with(replies: Vec<Reply>) -> (Session<ScriptedChannel>, ChannelLog) {
        let (channel, log) = ScriptedChannel::new(replies);
        let session = Session::with_channel(channel, "device-1", "0", Timeouts::default());
        (session, log)
    }

    #[test]
    fn test_execute_returns_matching_frame() {
        let (mut session, log) = session_with(vec![Reply::Frame(frame("cameraOpened"))]);

        session.open_camera().expect("open");

        let sent = log.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), "open");
        assert_eq!(sent[0].field("cameraId"), Some(&json!("0")));
    }

    #[test]
    fn test_execute_rejects_unexpected_tag_with_context() {
        let (mut session, _log) = session_with(vec![Reply::Frame(frame("cameraClosed"))]);

        let err = session.open_camera().unwrap_err();

        assert_eq!(err.command, "open");
        assert_eq!(err.device_id, "device-1");
        assert!(matches!(
            err.kind,
            SessionErrorKind::Protocol(ProtocolError::UnexpectedTag { .. })
        ));
    }

    #[test]
    fn test_widened_timeout_is_restored_after_success() {
        let (mut session, log) = session_with(vec![Reply::Frame(frame("cameraIds"))]);
        // cameraIds without objValue fails late, after the frame arrived;
        // the restore must still have happened.
        let _ = session.camera_ids();

        let timeouts = log.timeouts_set();
        assert_eq!(timeouts.len(), 2);
        assert_eq!(timeouts[0], Duration::from_secs(25), "base + extra");
        assert_eq!(timeouts[1], Duration::from_secs(20), "baseline restored");
    }

    #[test]
    fn test_widened_timeout_is_restored_after_failure() {
        let (mut session, log) = session_with(vec![Reply::Frame(frame("cameraOpened"))]);

        let err = session.camera_ids().unwrap_err();
        assert!(matches!(err.kind, SessionErrorKind::Protocol(_)));

        let timeouts = log.timeouts_set();
        assert_eq!(*timeouts.last().unwrap(), Duration::from_secs(20));
    }

    #[test]
    fn test_transport_failure_poisons_the_session() {
        let (mut session, log) = session_with(vec![Reply::Closed]);
        session.opened = true; // pretend the camera was opened earlier

        let err = session.execute(Command::new("close"), FrameTag::CameraClosed).unwrap_err();
        assert!(matches!(
            err.kind,
            SessionErrorKind::Protocol(ProtocolError::ChannelClosed)
        ));

        drop(session);
        // Only the failed close was ever sent: drop must not attempt
        // another close over the dead channel.
        assert_eq!(log.sent().len(), 1);
    }

    #[test]
    fn test_drop_closes_an_open_camera() {
        let (mut session, log) = session_with(vec![
            Reply::Frame(frame("cameraOpened")),
            Reply::Frame(frame("cameraClosed")),
        ]);
        session.open_camera().expect("open");

        drop(session);

        let sent = log.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].name(), "close");
    }

    #[test]
    fn test_camera_properties_are_cached_per_session() {
        let props_frame = ResponseFrame {
            tag: FrameTag::CameraProperties,
            str_value: None,
            obj_value: Some(json!({"cameraProperties": {"android.control.zoomRatioRange": [1.0, 4.0]}})),
            payload: None,
        };
        let (mut session, log) = session_with(vec![Reply::Frame(props_frame)]);

        session.ensure_properties().expect("fetch");
        session.ensure_properties().expect("cached");

        // One getCameraProperties on the wire, not two.
        assert_eq!(log.sent().len(), 1);
    }

    #[test]
    fn test_zoom_validation_rejects_out_of_range() {
        let props_frame = ResponseFrame {
            tag: FrameTag::CameraProperties,
            str_value: None,
            obj_value: Some(json!({"cameraProperties": {"android.control.zoomRatioRange": [1.0, 4.0]}})),
            payload: None,
        };
        let (mut session, _log) = session_with(vec![Reply::Frame(props_frame)]);

        assert!(session.validate_zoom("do3A", Some(2.0)).is_ok());
        let err = session.validate_zoom("do3A", Some(9.0)).unwrap_err();
        assert!(matches!(err.kind, SessionErrorKind::InvalidRequest(_)));
    }
}
