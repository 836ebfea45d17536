//! Integration tests for the capture demultiplexer.
//!
//! These tests exercise the public plan → collect → assemble pipeline the
//! way the host engine drives it: frames arrive in wire order (arbitrary
//! across streams, ordered within one stream) and the assembled output must
//! pair every buffer with its capture's metadata, in request order.

use serde_json::json;

use camlink_core::capture::Accepted;
use camlink_core::protocol::frame::{FrameTag, ImageFormat, ResponseFrame};
use camlink_core::{BufferCollector, CaptureOutput, OutputSurface, SizeCatalog, StreamPlan};

/// Catalog reporting a fixed maximum size for every format.
struct Catalog(u32, u32);

impl SizeCatalog for Catalog {
    fn max_output_size(&self, _format: ImageFormat) -> Option<(u32, u32)> {
        Some((self.0, self.1))
    }
}

fn image(format: ImageFormat, physical: Option<&str>, payload: Vec<u8>) -> ResponseFrame {
    ResponseFrame {
        tag: FrameTag::Image {
            format,
            physical_camera: physical.map(str::to_string),
        },
        str_value: None,
        obj_value: None,
        payload: Some(payload),
    }
}

fn priv_image(physical: Option<&str>) -> ResponseFrame {
    ResponseFrame {
        tag: FrameTag::Image {
            format: ImageFormat::Priv,
            physical_camera: physical.map(str::to_string),
        },
        str_value: None,
        obj_value: None,
        payload: None,
    }
}

fn metadata(capture_index: usize, outputs: &[(u32, u32)]) -> ResponseFrame {
    metadata_with_physical(capture_index, outputs, &[])
}

fn metadata_with_physical(
    capture_index: usize,
    outputs: &[(u32, u32)],
    physical: &[(&str, serde_json::Value)],
) -> ResponseFrame {
    let outs: Vec<_> = outputs
        .iter()
        .map(|(w, h)| json!({"format": "yuv", "width": w, "height": h}))
        .collect();
    let physical_results: Vec<_> = physical
        .iter()
        .map(|(id, md)| json!({ *id: md }))
        .collect();
    ResponseFrame {
        tag: FrameTag::CaptureResults,
        str_value: None,
        obj_value: Some(json!({
            "captureResult": {"captureIndex": capture_index},
            "physicalResults": physical_results,
            "outputs": outs,
        })),
        payload: None,
    }
}

fn yuv_payload(w: u32, h: u32, fill: u8) -> Vec<u8> {
    vec![fill; (w as usize * h as usize * 3) / 2]
}

/// Runs `frames` through a fresh collector and assembles the output.
fn run(
    surfaces: &[OutputSurface],
    burst_len: usize,
    frames: Vec<ResponseFrame>,
) -> CaptureOutput {
    let plan = StreamPlan::build(surfaces, burst_len, "0", &Catalog(64, 48)).expect("plan");
    let mut collector = BufferCollector::new(plan, "0");
    for frame in frames {
        collector.accept(frame).expect("accept");
    }
    assert!(collector.is_complete(), "all frames fed, must be complete");
    collector.assemble().expect("assemble")
}

// ── Shapes ────────────────────────────────────────────────────────────────────

#[test]
fn test_one_surface_one_capture_returns_scalar() {
    let surfaces = [OutputSurface::new(ImageFormat::Yuv).with_size(8, 4)];
    let output = run(
        &surfaces,
        1,
        vec![
            image(ImageFormat::Yuv, None, yuv_payload(8, 4, 1)),
            metadata(0, &[(8, 4)]),
        ],
    );
    assert!(matches!(output, CaptureOutput::Single(_)));
}

#[test]
fn test_one_surface_burst_returns_flat_sequence_in_capture_order() {
    let surfaces = [OutputSurface::new(ImageFormat::Jpeg)];
    let output = run(
        &surfaces,
        3,
        vec![
            image(ImageFormat::Jpeg, None, vec![10]),
            metadata(0, &[(64, 48)]),
            image(ImageFormat::Jpeg, None, vec![11]),
            metadata(1, &[(64, 48)]),
            image(ImageFormat::Jpeg, None, vec![12]),
            metadata(2, &[(64, 48)]),
        ],
    );

    let burst = output.into_burst().expect("burst shape");
    assert_eq!(burst.len(), 3);
    // Per-stream arrival order is capture order.
    assert_eq!(burst[0].data, vec![10]);
    assert_eq!(burst[1].data, vec![11]);
    assert_eq!(burst[2].data, vec![12]);
    // Each capture pairs with its own metadata frame.
    assert_eq!(burst[1].metadata.as_ref().unwrap()["captureIndex"], 1);
}

#[test]
fn test_multi_surface_returns_per_surface_sequences_in_request_order() {
    let surfaces = [
        OutputSurface::new(ImageFormat::Raw),
        OutputSurface::new(ImageFormat::Yuv).with_size(8, 4),
    ];
    let output = run(
        &surfaces,
        1,
        vec![
            // YUV arrives first even though raw was requested first.
            image(ImageFormat::Yuv, None, yuv_payload(8, 4, 2)),
            image(ImageFormat::Raw, None, vec![0xAA; 16]),
            metadata(0, &[(64, 48), (8, 4)]),
        ],
    );

    let per_surface = output.into_surfaces().expect("surfaces shape");
    assert_eq!(per_surface.len(), 2);
    assert_eq!(per_surface[0][0].format, ImageFormat::Raw);
    assert_eq!(per_surface[1][0].format, ImageFormat::Yuv);
}

// ── Arrival-order tolerance ───────────────────────────────────────────────────

/// Two streams × two captures, delivered in several wire orders that all
/// respect per-stream ordering; every order must produce the same pairing.
#[test]
fn test_demux_is_stable_under_cross_stream_reordering() {
    let surfaces = [
        OutputSurface::new(ImageFormat::Yuv).with_size(8, 4),
        OutputSurface::new(ImageFormat::Yuv).with_size(16, 8),
    ];

    let small = |fill| image(ImageFormat::Yuv, None, yuv_payload(8, 4, fill));
    let large = |fill| image(ImageFormat::Yuv, None, yuv_payload(16, 8, fill));
    let md = |i| metadata(i, &[(8, 4), (16, 8)]);

    let orders: Vec<Vec<ResponseFrame>> = vec![
        // In-order.
        vec![small(1), large(3), md(0), small(2), large(4), md(1)],
        // All of stream A, then all of stream B, metadata last.
        vec![small(1), small(2), large(3), large(4), md(0), md(1)],
        // Metadata first.
        vec![md(0), md(1), large(3), small(1), large(4), small(2)],
    ];

    for frames in orders {
        let plan = StreamPlan::build(&surfaces, 2, "0", &Catalog(64, 48)).unwrap();
        let mut collector = BufferCollector::new(plan, "0");
        for frame in frames {
            collector.accept(frame).unwrap();
        }
        let per_surface = collector.assemble().unwrap().into_surfaces().unwrap();

        // Stream identity is recovered purely from the size bucket, and
        // capture order within each stream is preserved.
        assert_eq!(per_surface[0][0].data, yuv_payload(8, 4, 1));
        assert_eq!(per_surface[0][1].data, yuv_payload(8, 4, 2));
        assert_eq!(per_surface[1][0].data, yuv_payload(16, 8, 3));
        assert_eq!(per_surface[1][1].data, yuv_payload(16, 8, 4));
        assert_eq!(
            per_surface[0][1].metadata.as_ref().unwrap()["captureIndex"],
            1
        );
    }
}

#[test]
fn test_exact_buffer_count_for_n_surfaces_m_captures() {
    let surfaces = [
        OutputSurface::new(ImageFormat::Jpeg),
        OutputSurface::new(ImageFormat::Yuv).with_size(8, 4),
        OutputSurface::new(ImageFormat::Raw10),
    ];
    let mut frames = Vec::new();
    for i in 0..2 {
        frames.push(image(ImageFormat::Jpeg, None, vec![i]));
        frames.push(image(ImageFormat::Yuv, None, yuv_payload(8, 4, i)));
        frames.push(image(ImageFormat::Raw10, None, vec![i; 10]));
        frames.push(metadata(i as usize, &[(64, 48), (8, 4), (64, 48)]));
    }

    let output = run(&surfaces, 2, frames);
    assert_eq!(output.len(), 3 * 2);
}

// ── Opaque surfaces ───────────────────────────────────────────────────────────

#[test]
fn test_priv_surface_counts_without_materializing() {
    let surfaces = [
        OutputSurface::new(ImageFormat::Priv),
        OutputSurface::new(ImageFormat::Yuv).with_size(8, 4),
    ];
    let output = run(
        &surfaces,
        1,
        vec![
            priv_image(None),
            image(ImageFormat::Yuv, None, yuv_payload(8, 4, 7)),
            metadata(0, &[(64, 48), (8, 4)]),
        ],
    );

    let per_surface = output.into_surfaces().unwrap();
    assert!(per_surface[0][0].data.is_empty(), "opaque buffer stays empty");
    assert_eq!(per_surface[1][0].data, yuv_payload(8, 4, 7));
}

// ── Physical cameras ──────────────────────────────────────────────────────────

#[test]
fn test_physical_surface_pairs_with_physical_metadata() {
    let surfaces = [
        OutputSurface::new(ImageFormat::Yuv).with_size(8, 4),
        OutputSurface::new(ImageFormat::Yuv)
            .with_size(8, 4)
            .on_physical_camera("6"),
    ];
    let output = run(
        &surfaces,
        1,
        vec![
            image(ImageFormat::Yuv, None, yuv_payload(8, 4, 1)),
            image(ImageFormat::Yuv, Some("6"), yuv_payload(8, 4, 2)),
            metadata_with_physical(
                0,
                &[(8, 4), (8, 4)],
                &[("6", json!({"android.lens.focalLength": 4.2}))],
            ),
        ],
    );

    let per_surface = output.into_surfaces().unwrap();
    assert_eq!(
        per_surface[0][0].metadata.as_ref().unwrap()["captureIndex"],
        0
    );
    assert_eq!(
        per_surface[1][0].metadata.as_ref().unwrap()["android.lens.focalLength"],
        4.2
    );
}

#[test]
fn test_physical_surface_without_metadata_entry_yields_none() {
    let surfaces = [OutputSurface::new(ImageFormat::Jpeg).on_physical_camera("6")];
    let plan = StreamPlan::build(&surfaces, 1, "0", &Catalog(64, 48)).unwrap();
    let mut collector = BufferCollector::new(plan, "0");

    collector
        .accept(image(ImageFormat::Jpeg, Some("6"), vec![1, 2]))
        .unwrap();
    // Metadata map has no entry for camera "6".
    collector.accept(metadata(0, &[(64, 48)])).unwrap();

    let result = collector.assemble().unwrap().into_single().unwrap();
    assert!(result.metadata.is_none());
}

// ── Completion accounting ─────────────────────────────────────────────────────

#[test]
fn test_ignored_foreign_camera_frames_do_not_count() {
    let surfaces = [OutputSurface::new(ImageFormat::Yuv).with_size(8, 4)];
    let plan = StreamPlan::build(&surfaces, 1, "0", &Catalog(64, 48)).unwrap();
    let mut collector = BufferCollector::new(plan, "0");

    let accepted = collector
        .accept(image(ImageFormat::Yuv, Some("9"), yuv_payload(8, 4, 1)))
        .unwrap();
    assert_eq!(accepted, Accepted::Ignored);

    collector.accept(metadata(0, &[(8, 4)])).unwrap();
    assert!(!collector.is_complete());

    collector
        .accept(image(ImageFormat::Yuv, None, yuv_payload(8, 4, 2)))
        .unwrap();
    assert!(collector.is_complete());
}
