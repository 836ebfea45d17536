//! Stream demultiplexer for burst captures.
//!
//! The device returns the N×M image buffers of a capture interleaved across
//! streams: buffers from different surfaces arrive in any order, while
//! buffers within one stream arrive in capture order. Non-YUV frames name
//! their stream through the tag (format + optional physical-camera suffix).
//! YUV frames carry no stream identifier at all — the wire format's one
//! real gap — so YUV streams are told apart purely by buffer size. That is
//! why [`StreamPlan::build`] rejects two same-camera YUV surfaces that
//! would resolve to the same byte size before anything is sent, rather than
//! letting the collector misfile buffers later.
//!
//! The flow is: build a [`StreamPlan`] (validates the request, resolves
//! default YUV sizes through a [`SizeCatalog`]), feed every inbound image
//! and metadata frame to a [`BufferCollector`], and call
//! [`BufferCollector::assemble`] once [`BufferCollector::is_complete`].

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::capture::result::{CaptureOutput, CaptureResult};
use crate::capture::surface::OutputSurface;
use crate::protocol::frame::{FrameTag, ImageFormat, ResponseFrame};

/// YUV420 buffer size: 1.5 bytes per pixel.
fn yuv420_bytes(width: u32, height: u32) -> usize {
    (width as usize * height as usize * 3) / 2
}

/// Capability lookup the demultiplexer uses to resolve a YUV surface that
/// omits width/height. Implemented by the host over the opened camera's
/// properties.
pub trait SizeCatalog {
    /// Largest available output size for `format`, as (width, height).
    fn max_output_size(&self, format: ImageFormat) -> Option<(u32, u32)>;
}

/// Errors for invalid capture requests and inconsistent device responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one output surface is required")]
    NoSurfaces,

    #[error("capture burst must contain at least one request")]
    EmptyBurst,

    #[error("no available output size for format {0}")]
    NoAvailableSize(ImageFormat),

    /// Two YUV streams of one camera would produce identically-sized
    /// buffers, which the wire format cannot tell apart.
    #[error("two yuv streams for camera {camera} share buffer size {bytes} bytes")]
    YuvSizeCollision { camera: String, bytes: usize },

    #[error("format {format} requested more than once for camera {camera}")]
    DuplicateFormat { camera: String, format: ImageFormat },

    #[error("at most one raw-family format may be requested, got {count}")]
    MultipleRawFormats { count: usize },

    /// A buffer arrived for a stream the plan never declared.
    #[error("unexpected {format} buffer of {bytes} bytes for camera {camera}")]
    UnexpectedBuffer {
        camera: String,
        format: ImageFormat,
        bytes: usize,
    },

    #[error("malformed capture metadata: {0}")]
    MalformedMetadata(String),

    #[error(
        "capture incomplete: {buffers}/{expected_buffers} buffers, \
         {metadata}/{expected_metadata} metadata frames"
    )]
    IncompleteCapture {
        buffers: usize,
        expected_buffers: usize,
        metadata: usize,
        expected_metadata: usize,
    },

    /// The device reported a different size than the request asked for.
    #[error(
        "surface {surface} reported {reported_width}x{reported_height}, \
         requested {requested_width}x{requested_height}"
    )]
    SizeMismatch {
        surface: usize,
        requested_width: u32,
        requested_height: u32,
        reported_width: u32,
        reported_height: u32,
    },

    #[error("no buffer left for surface {surface} capture {capture}")]
    MissingBuffer { surface: usize, capture: usize },
}

// ── Stream plan ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PlannedSurface {
    format: ImageFormat,
    camera: String,
    /// Resolved size: explicit, or the catalog maximum for sizeless YUV.
    /// Non-YUV surfaces without an explicit size resolve from metadata.
    width: Option<u32>,
    height: Option<u32>,
    /// YUV420 byte size used as the stream key for YUV surfaces.
    yuv_bucket: Option<usize>,
}

/// A validated capture request: one entry per surface in request order,
/// with YUV size buckets resolved and collisions rejected.
#[derive(Debug, Clone)]
pub struct StreamPlan {
    surfaces: Vec<PlannedSurface>,
    burst_len: usize,
}

impl StreamPlan {
    /// Validates the request and resolves YUV stream keys.
    ///
    /// Rejections, all raised before any command is sent:
    /// - two YUV surfaces of one camera resolving to the same byte size
    /// - any non-YUV format requested twice for the same camera
    /// - more than one raw-family format in the whole request
    pub fn build(
        surfaces: &[OutputSurface],
        burst_len: usize,
        primary_camera: &str,
        catalog: &dyn SizeCatalog,
    ) -> Result<StreamPlan, ValidationError> {
        if surfaces.is_empty() {
            return Err(ValidationError::NoSurfaces);
        }
        if burst_len == 0 {
            return Err(ValidationError::EmptyBurst);
        }

        let mut planned = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            let camera = surface.camera_id(primary_camera).to_string();
            let (width, height, yuv_bucket) = match (surface.format, surface.width, surface.height)
            {
                (ImageFormat::Yuv, Some(w), Some(h)) => {
                    (Some(w), Some(h), Some(yuv420_bytes(w, h)))
                }
                (ImageFormat::Yuv, _, _) => {
                    let (w, h) = catalog
                        .max_output_size(ImageFormat::Yuv)
                        .ok_or(ValidationError::NoAvailableSize(ImageFormat::Yuv))?;
                    (Some(w), Some(h), Some(yuv420_bytes(w, h)))
                }
                (_, w, h) => (w, h, None),
            };
            planned.push(PlannedSurface {
                format: surface.format,
                camera,
                width,
                height,
                yuv_bucket,
            });
        }

        // Same-camera collision checks.
        for (i, a) in planned.iter().enumerate() {
            for b in planned.iter().skip(i + 1) {
                if a.camera != b.camera {
                    continue;
                }
                if let (Some(ba), Some(bb)) = (a.yuv_bucket, b.yuv_bucket) {
                    if ba == bb {
                        return Err(ValidationError::YuvSizeCollision {
                            camera: a.camera.clone(),
                            bytes: ba,
                        });
                    }
                } else if a.format != ImageFormat::Yuv && a.format == b.format {
                    return Err(ValidationError::DuplicateFormat {
                        camera: a.camera.clone(),
                        format: a.format,
                    });
                }
            }
        }

        let raw_count = planned.iter().filter(|s| s.format.is_raw_family()).count();
        if raw_count > 1 {
            return Err(ValidationError::MultipleRawFormats { count: raw_count });
        }

        Ok(StreamPlan {
            surfaces: planned,
            burst_len,
        })
    }

    /// Buffers the device must deliver: one per surface per capture
    /// (opaque surfaces announce theirs without a payload).
    pub fn expected_buffers(&self) -> usize {
        self.surfaces.len() * self.burst_len
    }

    pub fn burst_len(&self) -> usize {
        self.burst_len
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn knows_camera(&self, camera: &str) -> bool {
        self.surfaces.iter().any(|s| s.camera == camera)
    }

    fn has_stream(&self, camera: &str, format: ImageFormat) -> bool {
        self.surfaces
            .iter()
            .any(|s| s.camera == camera && s.format == format)
    }

    fn has_yuv_bucket(&self, camera: &str, bytes: usize) -> bool {
        self.surfaces
            .iter()
            .any(|s| s.camera == camera && s.yuv_bucket == Some(bytes))
    }
}

// ── Metadata frames ───────────────────────────────────────────────────────────

/// One decoded `captureResults` frame.
#[derive(Debug, Clone)]
pub struct CaptureMetadata {
    /// Primary-camera capture result.
    pub primary: Value,
    /// Per-physical-camera capture results.
    pub physical: HashMap<String, Value>,
    /// Declared (width, height) per surface, in request order.
    pub outputs: Vec<(u32, u32)>,
}

impl CaptureMetadata {
    fn parse(obj: &Value) -> Result<Self, ValidationError> {
        let primary = obj
            .get("captureResult")
            .cloned()
            .ok_or_else(|| ValidationError::MalformedMetadata("missing captureResult".into()))?;

        // physicalResults arrives either as a map keyed by camera id or as
        // a list of single-key maps; flatten both.
        let mut physical = HashMap::new();
        match obj.get("physicalResults") {
            Some(Value::Object(map)) => {
                for (id, md) in map {
                    physical.insert(id.clone(), md.clone());
                }
            }
            Some(Value::Array(entries)) => {
                for entry in entries {
                    if let Value::Object(map) = entry {
                        for (id, md) in map {
                            physical.insert(id.clone(), md.clone());
                        }
                    }
                }
            }
            None | Some(Value::Null) => {}
            Some(other) => {
                return Err(ValidationError::MalformedMetadata(format!(
                    "physicalResults has unexpected type: {other}"
                )));
            }
        }

        let outputs = obj
            .get("outputs")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::MalformedMetadata("missing outputs".into()))?
            .iter()
            .map(|out| {
                let width = out.get("width").and_then(Value::as_u64);
                let height = out.get("height").and_then(Value::as_u64);
                match (width, height) {
                    (Some(w), Some(h)) => Ok((w as u32, h as u32)),
                    _ => Err(ValidationError::MalformedMetadata(
                        "output entry missing width/height".into(),
                    )),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CaptureMetadata {
            primary,
            physical,
            outputs,
        })
    }
}

// ── Buffer collector ──────────────────────────────────────────────────────────

/// What [`BufferCollector::accept`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Counted toward the N×M buffer total.
    Buffer,
    /// A `captureResults` frame, counted toward the M metadata total.
    Metadata,
    /// An image frame for a camera outside the plan; dropped.
    Ignored,
}

/// Routes inbound frames to their streams and reassembles the result.
#[derive(Debug)]
pub struct BufferCollector {
    plan: StreamPlan,
    primary_camera: String,
    /// Non-YUV buffers keyed by (camera, format), in arrival order.
    bufs: HashMap<(String, ImageFormat), VecDeque<Vec<u8>>>,
    /// YUV buffers keyed by (camera, byte size), in arrival order.
    yuv_bufs: HashMap<(String, usize), VecDeque<Vec<u8>>>,
    metadata: Vec<CaptureMetadata>,
    buffers_seen: usize,
}

impl BufferCollector {
    pub fn new(plan: StreamPlan, primary_camera: impl Into<String>) -> Self {
        Self {
            plan,
            primary_camera: primary_camera.into(),
            bufs: HashMap::new(),
            yuv_bufs: HashMap::new(),
            metadata: Vec::new(),
            buffers_seen: 0,
        }
    }

    /// Routes one image or metadata frame. Frames for cameras outside the
    /// plan are ignored; buffers for undeclared streams are rejected.
    pub fn accept(&mut self, frame: ResponseFrame) -> Result<Accepted, ValidationError> {
        match frame.tag {
            FrameTag::Image {
                format,
                ref physical_camera,
            } => {
                let camera = physical_camera
                    .clone()
                    .unwrap_or_else(|| self.primary_camera.clone());
                if !self.plan.knows_camera(&camera) {
                    debug!(%camera, %format, "ignoring buffer for camera outside the plan");
                    return Ok(Accepted::Ignored);
                }
                self.accept_buffer(camera, format, frame.payload.unwrap_or_default())
            }
            FrameTag::CaptureResults => {
                let obj = frame.obj_value.as_ref().ok_or_else(|| {
                    ValidationError::MalformedMetadata("captureResults without objValue".into())
                })?;
                self.metadata.push(CaptureMetadata::parse(obj)?);
                Ok(Accepted::Metadata)
            }
            ref other => {
                debug!(tag = %other, "collector ignoring non-capture frame");
                Ok(Accepted::Ignored)
            }
        }
    }

    fn accept_buffer(
        &mut self,
        camera: String,
        format: ImageFormat,
        payload: Vec<u8>,
    ) -> Result<Accepted, ValidationError> {
        match format {
            // Opaque surfaces are announced but never materialized.
            ImageFormat::Priv => {
                self.buffers_seen += 1;
                Ok(Accepted::Buffer)
            }
            // YUV streams are keyed only by buffer size.
            ImageFormat::Yuv => {
                let bytes = payload.len();
                if !self.plan.has_yuv_bucket(&camera, bytes) {
                    return Err(ValidationError::UnexpectedBuffer {
                        camera,
                        format,
                        bytes,
                    });
                }
                self.yuv_bufs
                    .entry((camera, bytes))
                    .or_default()
                    .push_back(payload);
                self.buffers_seen += 1;
                Ok(Accepted::Buffer)
            }
            _ => {
                if !self.plan.has_stream(&camera, format) {
                    return Err(ValidationError::UnexpectedBuffer {
                        camera,
                        format,
                        bytes: payload.len(),
                    });
                }
                self.bufs
                    .entry((camera, format))
                    .or_default()
                    .push_back(payload);
                self.buffers_seen += 1;
                Ok(Accepted::Buffer)
            }
        }
    }

    /// True once N×M buffers and M metadata frames have arrived.
    pub fn is_complete(&self) -> bool {
        self.buffers_seen >= self.plan.expected_buffers()
            && self.metadata.len() >= self.plan.burst_len()
    }

    /// Reassembles results: for each surface in request order, for each
    /// capture in burst order, pop the next buffer from that surface's
    /// stream and pair it with that capture's metadata.
    pub fn assemble(mut self) -> Result<CaptureOutput, ValidationError> {
        if !self.is_complete() {
            return Err(ValidationError::IncompleteCapture {
                buffers: self.buffers_seen,
                expected_buffers: self.plan.expected_buffers(),
                metadata: self.metadata.len(),
                expected_metadata: self.plan.burst_len(),
            });
        }

        let burst_len = self.plan.burst_len();
        let surfaces = std::mem::take(&mut self.plan.surfaces);
        let mut per_surface = Vec::with_capacity(surfaces.len());

        for (j, surface) in surfaces.iter().enumerate() {
            let (width, height) = self.resolve_size(j, surface)?;
            let mut captures = Vec::with_capacity(burst_len);

            for i in 0..burst_len {
                let data = match surface.format {
                    ImageFormat::Priv => Vec::new(),
                    ImageFormat::Yuv => {
                        let bytes = yuv420_bytes(width, height);
                        self.yuv_bufs
                            .get_mut(&(surface.camera.clone(), bytes))
                            .and_then(VecDeque::pop_front)
                            .ok_or(ValidationError::MissingBuffer {
                                surface: j,
                                capture: i,
                            })?
                    }
                    format => self
                        .bufs
                        .get_mut(&(surface.camera.clone(), format))
                        .and_then(VecDeque::pop_front)
                        .ok_or(ValidationError::MissingBuffer {
                            surface: j,
                            capture: i,
                        })?,
                };

                let md = &self.metadata[i];
                let metadata = if surface.camera == self.primary_camera {
                    Some(md.primary.clone())
                } else {
                    // Absent when this capture's metadata map lacks the id.
                    md.physical.get(&surface.camera).cloned()
                };

                captures.push(CaptureResult {
                    width,
                    height,
                    format: surface.format,
                    metadata,
                    data,
                });
            }
            per_surface.push(captures);
        }

        Ok(match (per_surface.len(), burst_len) {
            (1, 1) => CaptureOutput::Single(per_surface.remove(0).remove(0)),
            (1, _) => CaptureOutput::Burst(per_surface.remove(0)),
            _ => CaptureOutput::Surfaces(per_surface),
        })
    }

    /// Final size for surface `j`: the requested/resolved size when one
    /// exists, else the size the device declared in metadata. Every
    /// metadata frame must agree with a requested size exactly.
    fn resolve_size(&self, j: usize, surface: &PlannedSurface) -> Result<(u32, u32), ValidationError> {
        let reported = self
            .metadata
            .iter()
            .filter_map(|md| md.outputs.get(j).copied())
            .next();

        match (surface.width, surface.height) {
            (Some(w), Some(h)) => {
                for md in &self.metadata {
                    if let Some(&(rw, rh)) = md.outputs.get(j) {
                        if (rw, rh) != (w, h) {
                            return Err(ValidationError::SizeMismatch {
                                surface: j,
                                requested_width: w,
                                requested_height: h,
                                reported_width: rw,
                                reported_height: rh,
                            });
                        }
                    }
                }
                Ok((w, h))
            }
            _ => reported.ok_or_else(|| {
                ValidationError::MalformedMetadata(format!(
                    "no declared size for surface {j} and none was requested"
                ))
            }),
        }
    }
}
