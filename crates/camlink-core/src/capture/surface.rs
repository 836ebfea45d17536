//! Output-surface and capture-request descriptors.

use serde_json::{json, Map, Value};

use crate::protocol::frame::ImageFormat;

/// One capture request: an opaque mapping of control fields
/// (`android.sensor.exposureTime`, `android.sensor.sensitivity`, …). The
/// engine forwards requests verbatim; only the declared exposure time is
/// inspected, for timeout scaling.
pub type CaptureRequest = Map<String, Value>;

/// Control field declaring the exposure time of a request, in nanoseconds.
pub const EXPOSURE_TIME_FIELD: &str = "android.sensor.exposureTime";

/// The longest declared exposure time across a burst, in nanoseconds.
/// Requests without a declared exposure contribute zero.
pub fn longest_exposure_ns(requests: &[CaptureRequest]) -> u64 {
    requests
        .iter()
        .filter_map(|req| req.get(EXPOSURE_TIME_FIELD))
        .filter_map(Value::as_u64)
        .max()
        .unwrap_or(0)
}

/// One requested image destination: format, optional explicit size,
/// optional physical sub-camera, optional statistics grid (rawStats only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSurface {
    pub format: ImageFormat,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub physical_camera: Option<String>,
    pub grid_width: Option<u32>,
    pub grid_height: Option<u32>,
}

impl OutputSurface {
    /// A surface of the given format with no explicit size; YUV surfaces
    /// without a size resolve to the largest available resolution.
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            width: None,
            height: None,
            physical_camera: None,
            grid_width: None,
            grid_height: None,
        }
    }

    /// Sets an explicit width × height.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Targets a physical sub-camera of a logical multi-camera device.
    pub fn on_physical_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.physical_camera = Some(camera_id.into());
        self
    }

    /// Sets the statistics grid cell size (rawStats surfaces).
    pub fn with_stats_grid(mut self, grid_width: u32, grid_height: u32) -> Self {
        self.grid_width = Some(grid_width);
        self.grid_height = Some(grid_height);
        self
    }

    /// The camera this surface belongs to: its physical sub-camera id, or
    /// the session's primary camera when none is set.
    pub fn camera_id<'a>(&'a self, primary: &'a str) -> &'a str {
        self.physical_camera.as_deref().unwrap_or(primary)
    }

    /// Renders the `outputSurfaces` wire descriptor.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("format".into(), json!(self.format.wire_name()));
        if let Some(w) = self.width {
            obj.insert("width".into(), json!(w));
        }
        if let Some(h) = self.height {
            obj.insert("height".into(), json!(h));
        }
        if let Some(id) = &self.physical_camera {
            obj.insert("physicalCamera".into(), json!(id));
        }
        if let Some(gw) = self.grid_width {
            obj.insert("gridWidth".into(), json!(gw));
        }
        if let Some(gh) = self.grid_height {
            obj.insert("gridHeight".into(), json!(gh));
        }
        Value::Object(obj)
    }
}
