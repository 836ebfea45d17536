//! Exclusive allocation of forwarded ports across host processes.
//!
//! Several host processes may drive different devices at once, and they all
//! draw local ports from the same fixed pool. There is no daemon to ask, so
//! mutual exclusion rides on the OS: binding a well-known lock port
//! succeeds for exactly one process at a time. The winner inspects the
//! current forwarding table, picks a port, installs its rule, and releases
//! the lock by closing the socket. The lock port itself never carries data.

use std::net::TcpListener;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::config::ConnectConfig;
use crate::infrastructure::forwarder::{ForwardError, PortForwarder};

/// Errors raised while allocating a forwarded port.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The lock port never became bindable within the retry budget.
    #[error("could not acquire the port lock on {port} after {attempts} attempts")]
    LockUnavailable { port: u16, attempts: u32 },

    /// Every pool port is either taken by another device or rejected by the
    /// forwarding tool.
    #[error("no forwarding port available for device {device_id} in {start}..{end}")]
    Exhausted {
        device_id: String,
        start: u16,
        end: u16,
    },

    /// The forwarding tool failed while listing rules.
    #[error(transparent)]
    Forwarder(#[from] ForwardError),
}

/// Pool bounds and lock behavior for one arbiter.
#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// Cross-process mutex port; bound, never connected to.
    pub lock_port: u16,
    /// First port of the forwarding pool.
    pub port_start: u16,
    /// Pool size.
    pub port_count: u16,
    /// Remote control port every rule maps to.
    pub remote_port: u16,
    /// Bind attempts before giving up on the lock.
    pub lock_retries: u32,
    /// Fixed wait between bind attempts.
    pub lock_backoff: Duration,
}

impl ArbiterSettings {
    pub fn from_config(config: &ConnectConfig) -> Self {
        Self {
            lock_port: config.lock_port(),
            port_start: config.port_start,
            port_count: config.port_count,
            remote_port: config.remote_port,
            lock_retries: config.lock_retries,
            lock_backoff: Duration::from_millis(config.lock_backoff_ms),
        }
    }
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self::from_config(&ConnectConfig::default())
    }
}

/// Allocates one forwarded local port per device, exclusively.
#[derive(Debug, Clone)]
pub struct PortArbiter {
    settings: ArbiterSettings,
}

impl PortArbiter {
    pub fn new(settings: ArbiterSettings) -> Self {
        Self { settings }
    }

    /// Returns the local port forwarding to `device_id`'s control service.
    ///
    /// Holding the bind-based lock: reuses the device's existing rule when
    /// one is present, otherwise scans the pool, skipping ports assigned to
    /// other devices, and installs a rule on the first port the forwarding
    /// tool accepts. The lock is released on every exit path when the
    /// listener drops.
    pub fn allocate(
        &self,
        forwarder: &dyn PortForwarder,
        device_id: &str,
    ) -> Result<u16, AllocationError> {
        let _lock = self.acquire_lock()?;

        let rules = forwarder.list()?;
        let mut used_ports = Vec::new();
        for rule in &rules {
            if rule.device_id == device_id && rule.remote_port == self.settings.remote_port {
                debug!(device_id, port = rule.local_port, "reusing existing forwarding rule");
                return Ok(rule.local_port);
            }
            used_ports.push(rule.local_port);
        }

        let start = self.settings.port_start;
        let end = start + self.settings.port_count;
        for port in start..end {
            if used_ports.contains(&port) {
                continue;
            }
            match forwarder.add(device_id, port, self.settings.remote_port) {
                Ok(()) => {
                    info!(device_id, port, "allocated forwarding port");
                    return Ok(port);
                }
                Err(e) => {
                    // Another process may have raced us to this port between
                    // the list and the add; keep scanning.
                    debug!(device_id, port, error = %e, "candidate port rejected");
                }
            }
        }

        Err(AllocationError::Exhausted {
            device_id: device_id.to_string(),
            start,
            end,
        })
    }

    /// Binds the lock port, retrying with fixed backoff.
    fn acquire_lock(&self) -> Result<TcpListener, AllocationError> {
        let addr = ("127.0.0.1", self.settings.lock_port);
        for attempt in 0..self.settings.lock_retries {
            match TcpListener::bind(addr) {
                Ok(listener) => {
                    debug!(port = self.settings.lock_port, attempt, "port lock acquired");
                    return Ok(listener);
                }
                Err(_) => std::thread::sleep(self.settings.lock_backoff),
            }
        }
        Err(AllocationError::LockUnavailable {
            port: self.settings.lock_port,
            attempts: self.settings.lock_retries,
        })
    }
}
