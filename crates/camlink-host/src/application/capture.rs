//! Burst capture through the stream demultiplexer.

use serde_json::Value;
use tracing::debug;

use camlink_core::capture::surface::longest_exposure_ns;
use camlink_core::protocol::codec::ProtocolError;
use camlink_core::{
    BufferCollector, CaptureOutput, CaptureRequest, Command, FrameTag, ImageFormat,
    OutputSurface, SizeCatalog, StreamPlan, ValidationError,
};

use crate::application::session::{Session, SessionError, SessionErrorKind};
use crate::infrastructure::channel::ControlChannel;

/// Catalog used when no surface needs size resolution; it never answers.
struct NoSizes;

impl SizeCatalog for NoSizes {
    fn max_output_size(&self, _format: ImageFormat) -> Option<(u32, u32)> {
        None
    }
}

fn requests_json(requests: &[CaptureRequest]) -> Value {
    Value::Array(
        requests
            .iter()
            .map(|req| Value::Object(req.clone()))
            .collect(),
    )
}

impl<C: ControlChannel> Session<C> {
    /// Issues a capture burst and reads back every image and metadata
    /// frame belonging to it.
    ///
    /// One request against one surface returns a scalar result; a burst
    /// against one surface returns the captures in order; multiple
    /// surfaces return one sequence per surface in request order. Surfaces
    /// default to a single full-resolution YUV target when none are given.
    pub fn do_capture(
        &mut self,
        requests: &[CaptureRequest],
        surfaces: &[OutputSurface],
    ) -> Result<CaptureOutput, SessionError> {
        self.do_capture_with(requests, surfaces, &[], None)
    }

    /// [`Session::do_capture`] with warm-up repeat requests and/or an
    /// intermediate reprocessing format.
    ///
    /// Repeat requests run on the device before the burst to settle the
    /// pipeline; they return no data but widen the timeout. A reprocess
    /// format captures an intermediate buffer of that format and
    /// reprocesses it into the requested surfaces; it cannot be combined
    /// with repeat requests.
    pub fn do_capture_with(
        &mut self,
        requests: &[CaptureRequest],
        surfaces: &[OutputSurface],
        repeat_requests: &[CaptureRequest],
        reprocess_format: Option<ImageFormat>,
    ) -> Result<CaptureOutput, SessionError> {
        let command = if reprocess_format.is_some() {
            "doReprocessCapture"
        } else {
            "doCapture"
        };

        if reprocess_format.is_some() && !repeat_requests.is_empty() {
            return Err(self.fail(
                command,
                SessionErrorKind::InvalidRequest(
                    "repeating requests cannot be combined with reprocessing".into(),
                ),
            ));
        }

        // Effective surfaces: apply the default target and route every
        // unrouted surface to the hidden sub-camera when one is set.
        let mut effective: Vec<OutputSurface> = if surfaces.is_empty() {
            let props = self.ensure_properties()?;
            let (width, height) = props.max_output_size(ImageFormat::Yuv).ok_or_else(|| {
                SessionError {
                    device_id: self.device_id().to_string(),
                    camera_id: self.camera_id().to_string(),
                    command: command.to_string(),
                    kind: ValidationError::NoAvailableSize(ImageFormat::Yuv).into(),
                }
            })?;
            vec![OutputSurface::new(ImageFormat::Yuv).with_size(width, height)]
        } else {
            surfaces.to_vec()
        };
        if let Some(hidden) = self.hidden_physical_id().map(str::to_string) {
            for surface in &mut effective {
                if surface.physical_camera.is_none() {
                    surface.physical_camera = Some(hidden.clone());
                }
            }
        }

        // Sizeless YUV surfaces resolve against the camera's capabilities;
        // everything else needs no catalog.
        let needs_catalog = effective
            .iter()
            .any(|s| s.format == ImageFormat::Yuv && (s.width.is_none() || s.height.is_none()));
        let props = if needs_catalog {
            Some(self.ensure_properties()?)
        } else {
            None
        };

        let primary = self.camera_id().to_string();
        let plan_result = match &props {
            Some(catalog) => StreamPlan::build(&effective, requests.len(), &primary, catalog),
            None => StreamPlan::build(&effective, requests.len(), &primary, &NoSizes),
        };
        // Stream collisions are rejected here, before anything is sent.
        let plan = plan_result.map_err(|e| self.fail(command, e))?;

        let cmd = Command::new(command)
            .arg("repeatRequests", requests_json(repeat_requests))
            .arg("captureRequests", requests_json(requests))
            .arg(
                "outputSurfaces",
                Value::Array(effective.iter().map(OutputSurface::to_json).collect()),
            )
            .arg_opt(
                "reprocessFormat",
                reprocess_format.map(ImageFormat::wire_name),
            );

        // Timeout scales with the longest declared exposure in the burst,
        // plus warm-up slack.
        let mut timeout =
            self.timeouts().base + std::time::Duration::from_nanos(longest_exposure_ns(requests));
        if !repeat_requests.is_empty() {
            timeout += self.timeouts().extra;
        }

        debug!(
            command,
            captures = requests.len(),
            surfaces = effective.len(),
            "issuing capture burst"
        );

        let mut collector = BufferCollector::new(plan, primary);
        self.with_widened_timeout(command, timeout, |session| {
            session.send_command(&cmd)?;
            while !collector.is_complete() {
                let frame = session.receive_frame(command)?;
                match frame.tag {
                    FrameTag::Image { .. } | FrameTag::CaptureResults => {
                        collector
                            .accept(frame)
                            .map_err(|e| session.fail(command, e))?;
                    }
                    ref other => {
                        let kind = ProtocolError::UnexpectedTag {
                            expected: "image or captureResults frame".to_string(),
                            got: other.to_string(),
                        };
                        return Err(session.fail(command, kind));
                    }
                }
            }
            Ok(())
        })?;

        collector.assemble().map_err(|e| self.fail(command, e))
    }
}
