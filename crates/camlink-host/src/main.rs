//! camlink probe entry point.
//!
//! Headless utility for checking that a device's capture service is
//! reachable end to end: arbitrates a forwarded port, opens the camera, and
//! dumps a capability summary (camera ids, sensitivity range, active array,
//! zoom range, largest output sizes).
//!
//! ```text
//! camlink-probe <device-id> [camera-id]
//! ```
//!
//! Configuration is read from `camlink.toml` in the working directory when
//! present; the log filter is overridden by `RUST_LOG`.

use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use camlink_core::ImageFormat;
use camlink_host::{AdbForwarder, HostConfig, Session};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let device_id = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: camlink-probe <device-id> [camera-id]"))?;
    let camera_id = args.next().unwrap_or_else(|| "0".to_string());

    let config = HostConfig::load_or_default(Path::new("camlink.toml"))?;

    // Initialise structured logging. Filter is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.filter.clone())),
        )
        .init();

    info!(device = %device_id, camera = %camera_id, "camlink probe starting");

    let forwarder = AdbForwarder::new(config.connect.adb_path.clone());
    let mut session = Session::connect(&device_id, &camera_id, &config, &forwarder)?;

    let ids = session.camera_ids()?;
    println!("device {device_id}");
    println!("  cameras: {}", ids.join(", "));

    let props = session.camera_properties()?;
    if let Some((lo, hi)) = props.sensitivity_range() {
        println!("  sensitivity: {lo}..{hi}");
    }
    if let Some(array) = props.active_array_size() {
        println!("  active array: {}x{}", array.width(), array.height());
    }
    if let Some((lo, hi)) = props.zoom_ratio_range() {
        println!("  zoom ratio: {lo}..{hi}");
    }
    for format in [ImageFormat::Yuv, ImageFormat::Jpeg, ImageFormat::Raw] {
        if let Some(&(w, h)) = props.available_output_sizes(format).first() {
            println!("  max {format}: {w}x{h}");
        }
    }

    session.close_camera()?;
    info!("camlink probe finished");
    Ok(())
}
