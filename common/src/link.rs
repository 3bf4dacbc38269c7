use log::{debug, info, warn};

use crate::config::DeviceConfig;

/// What the network supervisor should do on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Idle,
    /// Ask the driver to associate again. Non-blocking.
    Reconnect,
    /// The driver has been down past the grace period; reboot.
    Restart,
}

/// Tracks station link health and paces recovery.
///
/// A link that never came up is retried forever. A link that dropped after
/// being up is retried too, and after `wifi_restart_grace_ms` of continuous
/// loss a restart is requested.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    reconnect_interval_ms: u64,
    restart_grace_ms: u64,
    down_since_ms: Option<u64>,
    last_attempt_ms: Option<u64>,
    ever_up: bool,
}

impl LinkMonitor {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            reconnect_interval_ms: config.wifi_reconnect_interval_ms,
            restart_grace_ms: config.wifi_restart_grace_ms,
            down_since_ms: None,
            last_attempt_ms: None,
            ever_up: false,
        }
    }

    pub fn poll(&mut self, connected: bool, now_ms: u64) -> LinkAction {
        if connected {
            if self.down_since_ms.take().is_some() {
                info!("wifi link restored");
            }
            self.last_attempt_ms = None;
            self.ever_up = true;
            return LinkAction::Idle;
        }

        let down_since = *self.down_since_ms.get_or_insert_with(|| {
            warn!("wifi link down");
            now_ms
        });

        if self.ever_up && now_ms.saturating_sub(down_since) >= self.restart_grace_ms {
            return LinkAction::Restart;
        }

        let due = self
            .last_attempt_ms
            .map(|last| now_ms.saturating_sub(last) >= self.reconnect_interval_ms)
            .unwrap_or(true);
        if !due {
            return LinkAction::Idle;
        }

        debug!("requesting wifi reconnect");
        self.last_attempt_ms = Some(now_ms);
        LinkAction::Reconnect
    }
}
