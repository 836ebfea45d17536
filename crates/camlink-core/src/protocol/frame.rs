//! Inbound frame types.
//!
//! Every inbound line carries a `tag` string naming the frame kind. Image
//! frames use `<format>Image` tags, optionally suffixed with a
//! physical-camera id when a logical multi-camera device returns output for
//! one of its sub-devices (`yuvImage6`, `jpegImage2`). Tags are decoded
//! exactly once, at this boundary, into the closed [`FrameTag`] enum — the
//! suffix is split into a structured `(format, camera id)` pair here so no
//! downstream code re-parses tag strings.

use std::fmt;

use serde_json::Value;

use super::codec::ProtocolError;

// ── Image formats ─────────────────────────────────────────────────────────────

/// All image formats a capture can request.
///
/// `Priv` is the opaque/private format: its frames are announced on the wire
/// and count toward a capture's completion, but carry no payload the host
/// can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Yuv,
    Jpeg,
    JpegR,
    Raw,
    Raw10,
    Raw12,
    RawStats,
    Dng,
    Y8,
    Priv,
}

/// Every format, in the order used for tag prefix matching.
pub const ALL_FORMATS: [ImageFormat; 10] = [
    ImageFormat::Yuv,
    ImageFormat::Jpeg,
    ImageFormat::JpegR,
    ImageFormat::Raw,
    ImageFormat::Raw10,
    ImageFormat::Raw12,
    ImageFormat::RawStats,
    ImageFormat::Dng,
    ImageFormat::Y8,
    ImageFormat::Priv,
];

impl ImageFormat {
    /// The name used in `outputSurfaces` descriptors.
    pub fn wire_name(self) -> &'static str {
        match self {
            ImageFormat::Yuv => "yuv",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::JpegR => "jpeg_r",
            ImageFormat::Raw => "raw",
            ImageFormat::Raw10 => "raw10",
            ImageFormat::Raw12 => "raw12",
            ImageFormat::RawStats => "rawStats",
            ImageFormat::Dng => "dng",
            ImageFormat::Y8 => "y8",
            ImageFormat::Priv => "priv",
        }
    }

    /// The tag prefix used for image frames of this format.
    pub fn image_tag(self) -> &'static str {
        match self {
            ImageFormat::Yuv => "yuvImage",
            ImageFormat::Jpeg => "jpegImage",
            ImageFormat::JpegR => "jpeg_rImage",
            ImageFormat::Raw => "rawImage",
            ImageFormat::Raw10 => "raw10Image",
            ImageFormat::Raw12 => "raw12Image",
            ImageFormat::RawStats => "rawStatsImage",
            ImageFormat::Dng => "dngImage",
            ImageFormat::Y8 => "y8Image",
            ImageFormat::Priv => "privImage",
        }
    }

    /// Parses a surface-descriptor format name. `"jpg"` is accepted as an
    /// alias for `"jpeg"`.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        if name == "jpg" {
            return Some(ImageFormat::Jpeg);
        }
        ALL_FORMATS.into_iter().find(|f| f.wire_name() == name)
    }

    /// Whether image frames of this format carry a binary payload.
    pub fn carries_payload(self) -> bool {
        !matches!(self, ImageFormat::Priv)
    }

    /// Whether this format is derived from the raw sensor readout. At most
    /// one raw-family format may appear in a single capture command.
    pub fn is_raw_family(self) -> bool {
        matches!(
            self,
            ImageFormat::Raw
                | ImageFormat::Raw10
                | ImageFormat::Raw12
                | ImageFormat::RawStats
                | ImageFormat::Dng
        )
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── Frame tags ────────────────────────────────────────────────────────────────

/// Closed decode of every inbound `tag` string.
///
/// Unknown tags survive as [`FrameTag::Unknown`] carrying the raw string so
/// the engine can name them in its protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTag {
    CameraOpened,
    CameraClosed,
    CameraProperties,
    CameraIds,
    UnavailablePhysicalCameras,
    CaptureResults,
    /// An image frame: format plus the physical-camera id parsed from the
    /// tag suffix, `None` when the frame belongs to the primary camera.
    Image {
        format: ImageFormat,
        physical_camera: Option<String>,
    },
    AeResult,
    AfResult,
    AwbResult,
    Converged,
    Done,
    AutoframingConverged,
    AutoframingDone,
    RecordingResponse,
    SupportedPreviewSizes,
    SupportedVideoQualities,
    StreamCombinationSupport,
    PrimaryCamera,
    PerformanceClass,
    CameraPrivacyModeSupport,
    CameraLaunchMs,
    Camera1080pJpegCaptureMs,
    Unknown(String),
}

impl FrameTag {
    /// Decodes a raw tag string.
    pub fn parse(tag: &str) -> FrameTag {
        for format in ALL_FORMATS {
            if let Some(rest) = tag.strip_prefix(format.image_tag()) {
                let physical_camera = if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                };
                return FrameTag::Image {
                    format,
                    physical_camera,
                };
            }
        }
        match tag {
            "cameraOpened" => FrameTag::CameraOpened,
            "cameraClosed" => FrameTag::CameraClosed,
            "cameraProperties" => FrameTag::CameraProperties,
            "cameraIds" => FrameTag::CameraIds,
            "unavailablePhysicalCameras" => FrameTag::UnavailablePhysicalCameras,
            "captureResults" => FrameTag::CaptureResults,
            "aeResult" => FrameTag::AeResult,
            "afResult" => FrameTag::AfResult,
            "awbResult" => FrameTag::AwbResult,
            "3aConverged" => FrameTag::Converged,
            "3aDone" => FrameTag::Done,
            "autoframingConverged" => FrameTag::AutoframingConverged,
            "autoframingDone" => FrameTag::AutoframingDone,
            "recordingResponse" => FrameTag::RecordingResponse,
            "supportedPreviewSizes" => FrameTag::SupportedPreviewSizes,
            "supportedVideoQualities" => FrameTag::SupportedVideoQualities,
            "streamCombinationSupport" => FrameTag::StreamCombinationSupport,
            "primaryCamera" => FrameTag::PrimaryCamera,
            "performanceClass" => FrameTag::PerformanceClass,
            "cameraPrivacyModeSupport" => FrameTag::CameraPrivacyModeSupport,
            "cameraLaunchMs" => FrameTag::CameraLaunchMs,
            "camera1080pJpegCaptureMs" => FrameTag::Camera1080pJpegCaptureMs,
            other => FrameTag::Unknown(other.to_string()),
        }
    }

    /// True for image frames of any format.
    pub fn is_image(&self) -> bool {
        matches!(self, FrameTag::Image { .. })
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameTag::CameraOpened => f.write_str("cameraOpened"),
            FrameTag::CameraClosed => f.write_str("cameraClosed"),
            FrameTag::CameraProperties => f.write_str("cameraProperties"),
            FrameTag::CameraIds => f.write_str("cameraIds"),
            FrameTag::UnavailablePhysicalCameras => f.write_str("unavailablePhysicalCameras"),
            FrameTag::CaptureResults => f.write_str("captureResults"),
            FrameTag::Image {
                format,
                physical_camera,
            } => match physical_camera {
                Some(id) => write!(f, "{}{id}", format.image_tag()),
                None => f.write_str(format.image_tag()),
            },
            FrameTag::AeResult => f.write_str("aeResult"),
            FrameTag::AfResult => f.write_str("afResult"),
            FrameTag::AwbResult => f.write_str("awbResult"),
            FrameTag::Converged => f.write_str("3aConverged"),
            FrameTag::Done => f.write_str("3aDone"),
            FrameTag::AutoframingConverged => f.write_str("autoframingConverged"),
            FrameTag::AutoframingDone => f.write_str("autoframingDone"),
            FrameTag::RecordingResponse => f.write_str("recordingResponse"),
            FrameTag::SupportedPreviewSizes => f.write_str("supportedPreviewSizes"),
            FrameTag::SupportedVideoQualities => f.write_str("supportedVideoQualities"),
            FrameTag::StreamCombinationSupport => f.write_str("streamCombinationSupport"),
            FrameTag::PrimaryCamera => f.write_str("primaryCamera"),
            FrameTag::PerformanceClass => f.write_str("performanceClass"),
            FrameTag::CameraPrivacyModeSupport => f.write_str("cameraPrivacyModeSupport"),
            FrameTag::CameraLaunchMs => f.write_str("cameraLaunchMs"),
            FrameTag::Camera1080pJpegCaptureMs => f.write_str("camera1080pJpegCaptureMs"),
            FrameTag::Unknown(raw) => f.write_str(raw),
        }
    }
}

// ── Response frames ───────────────────────────────────────────────────────────

/// One fully-received inbound frame: the decoded envelope plus the binary
/// trailer, when one was declared.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub tag: FrameTag,
    pub str_value: Option<String>,
    pub obj_value: Option<Value>,
    pub payload: Option<Vec<u8>>,
}

impl ResponseFrame {
    /// The `strValue` field, or a protocol error naming the tag.
    pub fn str_value(&self) -> Result<&str, ProtocolError> {
        self.str_value
            .as_deref()
            .ok_or_else(|| ProtocolError::MissingField {
                tag: self.tag.to_string(),
                field: "strValue",
            })
    }

    /// The `objValue` field, or a protocol error naming the tag.
    pub fn obj_value(&self) -> Result<&Value, ProtocolError> {
        self.obj_value
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingField {
                tag: self.tag.to_string(),
                field: "objValue",
            })
    }

    /// Length of the binary trailer, zero when none was declared.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}
