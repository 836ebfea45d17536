//! Seam over the platform port-forwarding tool.
//!
//! Devices expose their control service on a fixed remote port; the host
//! reaches it through a local port mapped by an external forwarding tool.
//! The arbiter only needs two operations — list the current rules and add
//! one — so they live behind the [`PortForwarder`] trait. The production
//! implementation shells out to `adb`; tests substitute an in-memory fake.

use std::process::Command as ProcessCommand;

use thiserror::Error;
use tracing::debug;

/// Errors from the forwarding tool.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The tool binary could not be executed at all.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but reported a failure.
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },
}

/// One active forwarding rule: `device_id`'s remote port is reachable at
/// `local_port` on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    pub device_id: String,
    pub local_port: u16,
    pub remote_port: u16,
}

/// The two operations the port arbiter needs from the forwarding tool.
pub trait PortForwarder {
    /// All currently-active forwarding rules, across all devices.
    fn list(&self) -> Result<Vec<ForwardRule>, ForwardError>;

    /// Adds a rule mapping `local_port` on the host to `remote_port` on
    /// `device_id`.
    fn add(&self, device_id: &str, local_port: u16, remote_port: u16) -> Result<(), ForwardError>;
}

// ── adb implementation ────────────────────────────────────────────────────────

/// [`PortForwarder`] backed by the `adb` command-line tool.
#[derive(Debug, Clone)]
pub struct AdbForwarder {
    adb_path: String,
}

impl AdbForwarder {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    fn spawn_err(&self, source: std::io::Error) -> ForwardError {
        ForwardError::Spawn {
            tool: self.adb_path.clone(),
            source,
        }
    }
}

impl PortForwarder for AdbForwarder {
    fn list(&self) -> Result<Vec<ForwardRule>, ForwardError> {
        let output = ProcessCommand::new(&self.adb_path)
            .args(["forward", "--list"])
            .output()
            .map_err(|e| self.spawn_err(e))?;
        if !output.status.success() {
            return Err(ForwardError::Tool {
                tool: self.adb_path.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().filter_map(parse_forward_line).collect())
    }

    fn add(&self, device_id: &str, local_port: u16, remote_port: u16) -> Result<(), ForwardError> {
        let output = ProcessCommand::new(&self.adb_path)
            .args([
                "-s",
                device_id,
                "forward",
                &format!("tcp:{local_port}"),
                &format!("tcp:{remote_port}"),
            ])
            .output()
            .map_err(|e| self.spawn_err(e))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || stderr.contains("error") {
            return Err(ForwardError::Tool {
                tool: self.adb_path.clone(),
                message: stderr.trim().to_string(),
            });
        }
        debug!(device_id, local_port, remote_port, "forwarding rule added");
        Ok(())
    }
}

/// Parses one `forward --list` line: `<device_id> tcp:<local> tcp:<remote>`.
/// Lines with other transports (or stray output) are skipped.
fn parse_forward_line(line: &str) -> Option<ForwardRule> {
    let mut parts = line.split_whitespace();
    let device_id = parts.next()?.to_string();
    let local_port = parts.next()?.strip_prefix("tcp:")?.parse().ok()?;
    let remote_port = parts.next()?.strip_prefix("tcp:")?.parse().ok()?;
    Some(ForwardRule {
        device_id,
        local_port,
        remote_port,
    })
}
