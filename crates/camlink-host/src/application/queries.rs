//! Recordings, performance measurements, and capability queries.

use std::time::Duration;

use serde_json::Value;

use camlink_core::protocol::codec::ProtocolError;
use camlink_core::{Command, FrameTag, OutputSurface};

use crate::application::session::{Session, SessionError};
use crate::infrastructure::channel::ControlChannel;

/// Optional knobs shared by the recording operations.
#[derive(Debug, Clone, Default)]
pub struct RecordingOptions {
    /// Video stabilization mode: 0 off, 1 on, 2 preview.
    pub video_stabilization_mode: i64,
    /// Record with the 10-bit HLG profile instead of SDR.
    pub hlg10: bool,
    /// Zoom ratio, validated against the device range before sending.
    pub zoom_ratio: Option<f64>,
    /// AE target FPS range, as (min, max).
    pub ae_target_fps: Option<(i64, i64)>,
}

impl<C: ControlChannel> Session<C> {
    // ── Recordings ────────────────────────────────────────────────────────────

    /// Records video at a camcorder-profile quality level for `duration`
    /// and returns the recording object (on-device output path, quality,
    /// size, frame rate).
    pub fn do_basic_recording(
        &mut self,
        profile_id: i64,
        quality: &str,
        duration: Duration,
        options: &RecordingOptions,
    ) -> Result<Value, SessionError> {
        let command = "doBasicRecording";
        self.validate_zoom(command, options.zoom_ratio)?;

        let cmd = Command::new(command)
            .arg("cameraId", self.camera_id().to_string())
            .arg("profileId", profile_id)
            .arg("quality", quality)
            .arg("recordingDuration", duration.as_secs())
            .arg("videoStabilizationMode", options.video_stabilization_mode)
            .arg("hlg10Enabled", options.hlg10)
            .arg_opt("zoomRatio", options.zoom_ratio)
            .arg_opt("aeTargetFpsMin", options.ae_target_fps.map(|(min, _)| min))
            .arg_opt("aeTargetFpsMax", options.ae_target_fps.map(|(_, max)| max));

        self.recording_exchange(command, cmd, duration)
    }

    /// Records the preview stream at `video_size` (e.g. `"1920x1080"`) for
    /// `duration` and returns the recording object.
    pub fn do_preview_recording(
        &mut self,
        video_size: &str,
        duration: Duration,
        stabilize: bool,
        options: &RecordingOptions,
    ) -> Result<Value, SessionError> {
        let command = "doPreviewRecording";
        self.validate_zoom(command, options.zoom_ratio)?;

        let cmd = Command::new(command)
            .arg("cameraId", self.camera_id().to_string())
            .arg("videoSize", video_size)
            .arg("recordingDuration", duration.as_secs())
            .arg("stabilize", stabilize)
            .arg_opt("zoomRatio", options.zoom_ratio)
            .arg_opt("aeTargetFpsMin", options.ae_target_fps.map(|(min, _)| min))
            .arg_opt("aeTargetFpsMax", options.ae_target_fps.map(|(_, max)| max));

        self.recording_exchange(command, cmd, duration)
    }

    /// A recording blocks for its full declared duration, so the timeout
    /// scales with it on top of the baseline and slack.
    fn recording_exchange(
        &mut self,
        command: &str,
        cmd: Command,
        duration: Duration,
    ) -> Result<Value, SessionError> {
        let timeout = self.timeouts().base + duration + self.timeouts().extra;
        let frame = self.with_widened_timeout(command, timeout, |session| {
            session.execute(cmd, FrameTag::RecordingResponse)
        })?;
        match frame.obj_value() {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(self.fail(command, e)),
        }
    }

    // ── Performance measurements ──────────────────────────────────────────────

    /// Camera launch latency in milliseconds, from open to first frame.
    pub fn measure_camera_launch_ms(&mut self) -> Result<f64, SessionError> {
        let cmd = Command::new("measureCameraLaunchMs")
            .arg("cameraId", self.camera_id().to_string());
        self.perf_measurement("measureCameraLaunchMs", cmd, FrameTag::CameraLaunchMs)
    }

    /// 1080p JPEG capture latency in milliseconds.
    pub fn measure_1080p_jpeg_capture_ms(&mut self) -> Result<f64, SessionError> {
        let cmd = Command::new("measureCamera1080pJpegCaptureMs")
            .arg("cameraId", self.camera_id().to_string());
        self.perf_measurement(
            "measureCamera1080pJpegCaptureMs",
            cmd,
            FrameTag::Camera1080pJpegCaptureMs,
        )
    }

    fn perf_measurement(
        &mut self,
        command: &str,
        cmd: Command,
        expected: FrameTag,
    ) -> Result<f64, SessionError> {
        let timeout = self.timeouts().perf;
        let frame = self.with_widened_timeout(command, timeout, |session| {
            session.execute(cmd, expected)
        })?;
        self.parse_float(command, &frame)
    }

    // ── Capability queries ────────────────────────────────────────────────────

    /// All supported preview sizes, e.g. `["640x480", "1920x1080"]`.
    pub fn supported_preview_sizes(
        &mut self,
        camera_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        let cmd = Command::new("getSupportedPreviewSizes").arg("cameraId", camera_id);
        let widened = self.timeouts().base + self.timeouts().extra;
        let frame = self.with_widened_timeout("getSupportedPreviewSizes", widened, |session| {
            session.execute(cmd, FrameTag::SupportedPreviewSizes)
        })?;
        self.parse_semicolon_list("getSupportedPreviewSizes", &frame)
    }

    /// All supported video qualities with their profile ids,
    /// e.g. `["480:4", "1080:6", "HIGH:1"]`.
    pub fn supported_video_qualities(
        &mut self,
        camera_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        let cmd = Command::new("getSupportedVideoQualities").arg("cameraId", camera_id);
        let frame = self.execute(cmd, FrameTag::SupportedVideoQualities)?;
        self.parse_semicolon_list("getSupportedVideoQualities", &frame)
    }

    /// Whether the device supports configuring this surface combination.
    pub fn is_stream_combination_supported(
        &mut self,
        surfaces: &[OutputSurface],
    ) -> Result<bool, SessionError> {
        let cmd = Command::new("isStreamCombinationSupported").arg(
            "outputSurfaces",
            Value::Array(surfaces.iter().map(OutputSurface::to_json).collect()),
        );
        let frame = self.execute(cmd, FrameTag::StreamCombinationSupport)?;
        match frame.str_value() {
            Ok(value) => Ok(value == "supportedCombination"),
            Err(e) => Err(self.fail("isStreamCombinationSupported", e)),
        }
    }

    /// Whether the opened camera is the primary camera for its facing.
    pub fn is_primary_camera(&mut self) -> Result<bool, SessionError> {
        let cmd = Command::new("isPrimaryCamera").arg("cameraId", self.camera_id().to_string());
        self.bool_query("isPrimaryCamera", cmd, FrameTag::PrimaryCamera)
    }

    /// Whether the device declares a performance class.
    pub fn is_performance_class(&mut self) -> Result<bool, SessionError> {
        let cmd = Command::new("isPerformanceClass");
        self.bool_query("isPerformanceClass", cmd, FrameTag::PerformanceClass)
    }

    /// Whether the device supports the camera privacy toggle.
    pub fn is_camera_privacy_mode_supported(&mut self) -> Result<bool, SessionError> {
        let cmd = Command::new("isCameraPrivacyModeSupported");
        self.bool_query(
            "isCameraPrivacyModeSupported",
            cmd,
            FrameTag::CameraPrivacyModeSupport,
        )
    }

    // ── Shared parsing ────────────────────────────────────────────────────────

    fn bool_query(
        &mut self,
        command: &str,
        cmd: Command,
        expected: FrameTag,
    ) -> Result<bool, SessionError> {
        let frame = self.execute(cmd, expected)?;
        match frame.str_value() {
            Ok(value) => Ok(value == "true"),
            Err(e) => Err(self.fail(command, e)),
        }
    }

    fn parse_float(&mut self, command: &str, frame: &camlink_core::ResponseFrame) -> Result<f64, SessionError> {
        let text = match frame.str_value() {
            Ok(text) => text,
            Err(e) => return Err(self.fail(command, e)),
        };
        text.parse::<f64>().map_err(|e| {
            let kind = ProtocolError::MalformedFrame(format!("{command} value {text:?}: {e}"));
            self.fail(command, kind)
        })
    }

    fn parse_semicolon_list(
        &mut self,
        command: &str,
        frame: &camlink_core::ResponseFrame,
    ) -> Result<Vec<String>, SessionError> {
        let text = match frame.str_value() {
            Ok(text) => text,
            Err(e) => return Err(self.fail(command, e)),
        };
        let entries: Vec<String> = text
            .split(';')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        if entries.is_empty() {
            let kind = ProtocolError::MalformedFrame(format!("{command} returned an empty list"));
            return Err(self.fail(command, kind));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::{SessionErrorKind, Timeouts};
    use crate::application::testing::{ChannelLog, Reply, ScriptedChannel};
    use camlink_core::ResponseFrame;
    use serde_json::json;

    fn str_frame(tag: &str, value: &str) -> Reply {
        Reply::Frame(ResponseFrame {
            tag: FrameTag::parse(tag),
            str_value: Some(value.to_string()),
            obj_value: None,
            payload: None,
        })
    }

    fn session_with(replies: Vec<Reply>) -> (Session<ScriptedChannel>, ChannelLog) {
        let (channel, log) = ScriptedChannel::new(replies);
        let session = Session::with_channel(channel, "device-1", "0", Timeouts::default());
        (session, log)
    }

    #[test]
    fn test_bool_queries_compare_str_value() {
        let (mut session, _log) = session_with(vec![str_frame("primaryCamera", "true")]);
        assert!(session.is_primary_camera().expect("query"));

        let (mut session, _log) = session_with(vec![str_frame("performanceClass", "false")]);
        assert!(!session.is_performance_class().expect("query"));
    }

    #[test]
    fn test_supported_preview_sizes_splits_semicolons() {
        let (mut session, _log) = session_with(vec![str_frame(
            "supportedPreviewSizes",
            "640x480;1280x720;1920x1080",
        )]);
        assert_eq!(
            session.supported_preview_sizes("0").expect("query"),
            vec!["640x480", "1280x720", "1920x1080"]
        );
    }

    #[test]
    fn test_supported_video_qualities_drops_trailing_separator() {
        let (mut session, _log) =
            session_with(vec![str_frame("supportedVideoQualities", "HIGH:1;480:4;")]);
        assert_eq!(
            session.supported_video_qualities("0").expect("query"),
            vec!["HIGH:1", "480:4"]
        );
    }

    #[test]
    fn test_empty_size_list_is_a_protocol_error() {
        let (mut session, _log) = session_with(vec![str_frame("supportedPreviewSizes", "")]);
        let err = session.supported_preview_sizes("0").unwrap_err();
        assert!(matches!(err.kind, SessionErrorKind::Protocol(_)));
    }

    #[test]
    fn test_perf_measurement_uses_perf_timeout_and_parses_float() {
        let (mut session, log) = session_with(vec![str_frame("cameraLaunchMs", "245.5")]);

        let latency = session.measure_camera_launch_ms().expect("measure");

        assert_eq!(latency, 245.5);
        let timeouts = log.timeouts_set();
        assert_eq!(timeouts[0], Duration::from_secs(40), "perf budget");
        assert_eq!(timeouts[1], Duration::from_secs(20), "baseline restored");
    }

    #[test]
    fn test_recording_timeout_scales_with_duration() {
        let recording = Reply::Frame(ResponseFrame {
            tag: FrameTag::RecordingResponse,
            str_value: None,
            obj_value: Some(json!({
                "recordedOutputPath": "/sdcard/VID_001.mp4",
                "quality": "CIF",
                "videoSize": "352x288",
            })),
            payload: None,
        });
        let (mut session, log) = session_with(vec![recording]);

        let object = session
            .do_basic_recording(
                3,
                "CIF",
                Duration::from_secs(10),
                &RecordingOptions::default(),
            )
            .expect("recording");

        assert_eq!(object["quality"], "CIF");
        assert_eq!(
            log.timeouts_set()[0],
            Duration::from_secs(20 + 10 + 5),
            "base + duration + extra"
        );

        let sent = log.sent();
        assert_eq!(sent[0].field("recordingDuration").unwrap(), 10);
        assert_eq!(sent[0].field("hlg10Enabled").unwrap(), false);
    }

    #[test]
    fn test_preview_recording_sends_size_and_stabilization() {
        let recording = Reply::Frame(ResponseFrame {
            tag: FrameTag::RecordingResponse,
            str_value: None,
            obj_value: Some(json!({"quality": "preview", "videoSize": "1920x1080"})),
            payload: None,
        });
        let (mut session, log) = session_with(vec![recording]);

        session
            .do_preview_recording(
                "1920x1080",
                Duration::from_secs(4),
                true,
                &RecordingOptions {
                    ae_target_fps: Some((30, 30)),
                    ..RecordingOptions::default()
                },
            )
            .expect("recording");

        let sent = log.sent();
        assert_eq!(sent[0].field("videoSize").unwrap(), "1920x1080");
        assert_eq!(sent[0].field("stabilize").unwrap(), true);
        assert_eq!(sent[0].field("aeTargetFpsMin").unwrap(), 30);
    }

    #[test]
    fn test_stream_combination_support_matches_magic_string() {
        let (mut session, _log) = session_with(vec![str_frame(
            "streamCombinationSupport",
            "supportedCombination",
        )]);
        let surfaces = [OutputSurface::new(camlink_core::ImageFormat::Yuv).with_size(640, 480)];
        assert!(session
            .is_stream_combination_supported(&surfaces)
            .expect("query"));

        let (mut session, _log) = session_with(vec![str_frame(
            "streamCombinationSupport",
            "unsupportedCombination",
        )]);
        assert!(!session
            .is_stream_combination_supported(&surfaces)
            .expect("query"));
    }
}
