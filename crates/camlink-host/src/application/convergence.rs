//! 3A and autoframing operations.

use serde_json::{json, Value};
use tracing::debug;

use camlink_core::{
    AutoframingPoller, Command, ConvergencePoller, PollStep, ThreeAResult, ThreeATriggers,
};

use crate::application::session::{Session, SessionError};
use crate::infrastructure::channel::ControlChannel;

/// One weighted metering region: a normalized rectangle plus a weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRegion {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub weight: i64,
}

impl WeightedRegion {
    /// The whole frame at weight 1; the default metering region.
    pub fn full_frame() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
            weight: 1,
        }
    }
}

/// Flattens regions into the wire form: `[x, y, w, h, wgt, x, y, …]`.
fn flatten_regions(regions: &[WeightedRegion]) -> Value {
    let mut flat = Vec::with_capacity(regions.len() * 5);
    for region in regions {
        flat.push(json!(region.x));
        flat.push(json!(region.y));
        flat.push(json!(region.w));
        flat.push(json!(region.h));
        flat.push(json!(region.weight));
    }
    Value::Array(flat)
}

/// Everything a 3A run can be asked to do.
#[derive(Debug, Clone)]
pub struct ThreeAConfig {
    pub regions_ae: Vec<WeightedRegion>,
    pub regions_awb: Vec<WeightedRegion>,
    pub regions_af: Vec<WeightedRegion>,
    /// Trigger AE and wait for it to converge.
    pub do_ae: bool,
    /// Wait for AWB to converge.
    pub do_awb: bool,
    /// Trigger AF and wait for it to converge.
    pub do_af: bool,
    /// Request AE lock after convergence.
    pub lock_ae: bool,
    /// Request AWB lock after convergence.
    pub lock_awb: bool,
    /// Return populated 3A results; failing to produce them is an error.
    pub get_results: bool,
    /// EV compensation applied while AE runs.
    pub ev_comp: i64,
    pub auto_flash: bool,
    /// Monochrome sensor: AWB results are not expected.
    pub mono_camera: bool,
    /// Zoom ratio, validated against the device range before sending.
    pub zoom_ratio: Option<f64>,
}

impl Default for ThreeAConfig {
    fn default() -> Self {
        Self {
            regions_ae: vec![WeightedRegion::full_frame()],
            regions_awb: vec![WeightedRegion::full_frame()],
            regions_af: vec![WeightedRegion::full_frame()],
            do_ae: true,
            do_awb: true,
            do_af: true,
            lock_ae: false,
            lock_awb: false,
            get_results: false,
            ev_comp: 0,
            auto_flash: false,
            mono_camera: false,
            zoom_ratio: None,
        }
    }
}

impl<C: ControlChannel> Session<C> {
    /// Runs the device's 3A routine and polls it to its terminal state.
    ///
    /// Partial results stream in while the algorithms run; the device
    /// signals convergence and then done. The returned result carries
    /// whatever was populated; when `get_results` is set, every triggered
    /// algorithm must have produced one and convergence must have been
    /// reached, else the call fails with a convergence error.
    pub fn do_3a(&mut self, config: &ThreeAConfig) -> Result<ThreeAResult, SessionError> {
        let command = "do3A";
        self.validate_zoom(command, config.zoom_ratio)?;

        let cmd = Command::new(command)
            .arg(
                "regions",
                json!({
                    "ae": flatten_regions(&config.regions_ae),
                    "awb": flatten_regions(&config.regions_awb),
                    "af": flatten_regions(&config.regions_af),
                }),
            )
            .arg("triggers", json!({"ae": config.do_ae, "af": config.do_af}))
            .arg_opt("aeLock", config.lock_ae.then_some(true))
            .arg_opt("awbLock", config.lock_awb.then_some(true))
            .arg_opt("evComp", (config.ev_comp != 0).then_some(config.ev_comp))
            .arg_opt("autoFlash", config.auto_flash.then_some(true))
            .arg_opt("physicalId", self.hidden_physical_id().map(str::to_string))
            .arg_opt("zoomRatio", config.zoom_ratio);

        let mut poller = ConvergencePoller::new(ThreeATriggers {
            do_ae: config.do_ae,
            do_awb: config.do_awb,
            do_af: config.do_af,
            mono_camera: config.mono_camera,
            want_results: config.get_results,
        });

        debug!(device = %self.device_id(), "running 3a");
        self.send_command(&cmd)?;
        loop {
            let frame = self.receive_frame(command)?;
            match poller.observe(&frame) {
                Ok(PollStep::Continue) => {}
                Ok(PollStep::Finished) => break,
                Err(e) => return Err(self.fail(command, e)),
            }
        }
        poller.finish().map_err(|e| self.fail(command, e))
    }

    /// Runs autoframing to its terminal state; convergence is required.
    pub fn do_autoframing(&mut self, zoom_ratio: Option<f64>) -> Result<(), SessionError> {
        let command = "doAutoframing";
        self.validate_zoom(command, zoom_ratio)?;

        let cmd = Command::new(command).arg_opt("zoomRatio", zoom_ratio);
        let mut poller = AutoframingPoller::new();

        self.send_command(&cmd)?;
        loop {
            let frame = self.receive_frame(command)?;
            match poller.observe(&frame) {
                Ok(PollStep::Continue) => {}
                Ok(PollStep::Finished) => break,
                Err(e) => return Err(self.fail(command, e)),
            }
        }
        poller.finish().map_err(|e| self.fail(command, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::{SessionErrorKind, Timeouts};
    use crate::application::testing::{ChannelLog, Reply, ScriptedChannel};
    use camlink_core::{ConvergenceError, FrameTag, ResponseFrame};

    fn frame(tag: &str, value: Option<&str>) -> Reply {
        Reply::Frame(ResponseFrame {
            tag: FrameTag::parse(tag),
            str_value: value.map(str::to_string),
            obj_value: None,
            payload: None,
        })
    }

    fn session_with(replies: Vec<Reply>) -> (Session<ScriptedChannel>, ChannelLog) {
        let (channel, log) = ScriptedChannel::new(replies);
        let session = Session::with_channel(channel, "device-1", "0", Timeouts::default());
        (session, log)
    }

    fn full_run() -> Vec<Reply> {
        vec![
            frame("aeResult", Some("100 20000000")),
            frame("awbResult", Some("1.5 1.0 1.0 1.9 1 0 0 0 1 0 0 0 1")),
            frame("afResult", Some("1.25")),
            frame("3aConverged", None),
            frame("3aDone", None),
        ]
    }

    #[test]
    fn test_do_3a_populates_results_and_flattens_regions() {
        let (mut session, log) = session_with(full_run());
        let config = ThreeAConfig {
            get_results: true,
            ..ThreeAConfig::default()
        };

        let result = session.do_3a(&config).expect("3a");

        assert!(result.converged);
        assert_eq!(result.ae_sensitivity, Some(100));
        assert_eq!(result.af_distance, Some(1.25));

        let sent = log.sent();
        assert_eq!(sent[0].name(), "do3A");
        let regions = sent[0].field("regions").unwrap();
        assert_eq!(regions["ae"].as_array().unwrap().len(), 5);
        assert_eq!(sent[0].field("triggers").unwrap()["ae"], true);
        // Unset options stay off the wire.
        assert!(sent[0].field("aeLock").is_none());
        assert!(sent[0].field("evComp").is_none());
    }

    #[test]
    fn test_do_3a_done_without_converged_is_convergence_error() {
        let (mut session, _log) = session_with(vec![
            frame("aeResult", Some("100 20000000")),
            frame("awbResult", Some("1 1 1 1 1 0 0 0 1 0 0 0 1")),
            frame("afResult", Some("0.5")),
            frame("3aDone", None),
        ]);
        let config = ThreeAConfig {
            get_results: true,
            ..ThreeAConfig::default()
        };

        let err = session.do_3a(&config).unwrap_err();
        assert!(matches!(
            err.kind,
            SessionErrorKind::Convergence(ConvergenceError::NotConverged)
        ));
    }

    #[test]
    fn test_do_3a_locks_appear_on_the_wire_when_set() {
        let (mut session, log) = session_with(full_run());
        let config = ThreeAConfig {
            lock_ae: true,
            lock_awb: true,
            ev_comp: 2,
            ..ThreeAConfig::default()
        };

        session.do_3a(&config).expect("3a");

        let sent = log.sent();
        assert_eq!(sent[0].field("aeLock").unwrap(), true);
        assert_eq!(sent[0].field("awbLock").unwrap(), true);
        assert_eq!(sent[0].field("evComp").unwrap(), 2);
    }

    #[test]
    fn test_do_autoframing_requires_convergence() {
        let (mut session, _log) = session_with(vec![frame("autoframingDone", None)]);
        let err = session.do_autoframing(None).unwrap_err();
        assert!(matches!(
            err.kind,
            SessionErrorKind::Convergence(ConvergenceError::AutoframingNotConverged)
        ));

        let (mut session, _log) = session_with(vec![
            frame("autoframingConverged", None),
            frame("autoframingDone", None),
        ]);
        assert!(session.do_autoframing(None).is_ok());
    }
}
