//! Camera capability lookups.
//!
//! The device reports its capabilities as one opaque JSON object. The
//! engine never interprets most of it — it flows back to callers untouched —
//! but a handful of lookups are needed host-side: available output sizes
//! (to resolve sizeless YUV surfaces), the sensitivity range, the
//! active-array geometry, and the zoom-ratio range.

use serde_json::Value;

use camlink_core::{ImageFormat, SizeCatalog};

/// Stream-configuration format codes as the device reports them.
mod hal_format {
    pub const PRIVATE: i64 = 0x22;
    pub const YUV_420_888: i64 = 0x23;
    pub const RAW_SENSOR: i64 = 0x20;
    pub const RAW10: i64 = 0x25;
    pub const RAW12: i64 = 0x26;
    pub const JPEG: i64 = 0x100;
    pub const JPEG_R: i64 = 0x1005;
    pub const Y8: i64 = 0x2020_3859;
}

fn hal_code(format: ImageFormat) -> i64 {
    match format {
        ImageFormat::Yuv => hal_format::YUV_420_888,
        ImageFormat::Jpeg => hal_format::JPEG,
        ImageFormat::JpegR => hal_format::JPEG_R,
        // rawStats and dng are derived host-side from the raw stream.
        ImageFormat::Raw | ImageFormat::RawStats | ImageFormat::Dng => hal_format::RAW_SENSOR,
        ImageFormat::Raw10 => hal_format::RAW10,
        ImageFormat::Raw12 => hal_format::RAW12,
        ImageFormat::Y8 => hal_format::Y8,
        ImageFormat::Priv => hal_format::PRIVATE,
    }
}

/// The active pixel-array rectangle of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveArray {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ActiveArray {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Wrapper over the opaque camera-properties object.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraProperties {
    raw: Value,
}

impl CameraProperties {
    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    /// The full properties object, untouched.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// All available output sizes for `format`, largest area first.
    pub fn available_output_sizes(&self, format: ImageFormat) -> Vec<(u32, u32)> {
        let code = hal_code(format);
        let mut sizes: Vec<(u32, u32)> = self
            .raw
            .get("android.scaler.availableStreamConfigurations")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        entry.get("format").and_then(Value::as_i64) == Some(code)
                            && entry.get("input").and_then(Value::as_bool) != Some(true)
                    })
                    .filter_map(|entry| {
                        let width = entry.get("width").and_then(Value::as_u64)?;
                        let height = entry.get("height").and_then(Value::as_u64)?;
                        Some((width as u32, height as u32))
                    })
                    .collect()
            })
            .unwrap_or_default();
        sizes.sort_by_key(|&(w, h)| std::cmp::Reverse(w as u64 * h as u64));
        sizes
    }

    /// Supported sensitivity (ISO) range, as (min, max).
    pub fn sensitivity_range(&self) -> Option<(i64, i64)> {
        let range = self
            .raw
            .get("android.sensor.info.sensitivityRange")?
            .as_array()?;
        Some((range.first()?.as_i64()?, range.get(1)?.as_i64()?))
    }

    /// Active pixel-array geometry.
    pub fn active_array_size(&self) -> Option<ActiveArray> {
        let rect = self.raw.get("android.sensor.info.activeArraySize")?;
        Some(ActiveArray {
            left: rect.get("left")?.as_u64()? as u32,
            top: rect.get("top")?.as_u64()? as u32,
            right: rect.get("right")?.as_u64()? as u32,
            bottom: rect.get("bottom")?.as_u64()? as u32,
        })
    }

    /// Supported zoom-ratio range, as (min, max).
    pub fn zoom_ratio_range(&self) -> Option<(f64, f64)> {
        let range = self.raw.get("android.control.zoomRatioRange")?.as_array()?;
        Some((range.first()?.as_f64()?, range.get(1)?.as_f64()?))
    }

    /// Whether `zoom_ratio` sits inside the device's supported range.
    /// Devices that report no range accept only the default zoom.
    pub fn zoom_ratio_within_range(&self, zoom_ratio: f64) -> bool {
        match self.zoom_ratio_range() {
            Some((lo, hi)) => zoom_ratio >= lo && zoom_ratio <= hi,
            None => false,
        }
    }
}

impl SizeCatalog for CameraProperties {
    fn max_output_size(&self, format: ImageFormat) -> Option<(u32, u32)> {
        self.available_output_sizes(format).into_iter().next()
    }
}
