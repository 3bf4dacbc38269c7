use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub debounce_ms: u64,
    pub read_interval_ms: u64,
    pub tick_delay_ms: u64,
    pub wifi_connect_attempts: u32,
    pub wifi_retry_delay_ms: u64,
    /// Spacing of background reconnect requests while the link is down.
    pub wifi_reconnect_interval_ms: u64,
    /// A link that was up and stays down this long triggers a restart.
    pub wifi_restart_grace_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            read_interval_ms: 1_000,
            tick_delay_ms: 10,
            wifi_connect_attempts: 20,
            wifi_retry_delay_ms: 1_000,
            wifi_reconnect_interval_ms: 10_000,
            wifi_restart_grace_ms: 300_000,
            http_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub sync_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            sync_url: "http://192.168.1.100:8080/data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub operator_cooldown_ms: u64,
    pub online_timeout_ms: u64,
    pub history_capacity: usize,
    pub history_sample_interval_ms: u64,
    pub high_alert_c: f32,
    pub low_alert_c: f32,
    pub alert_cooldown_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            operator_cooldown_ms: 1_000,
            online_timeout_ms: 2_000,
            history_capacity: 500,
            history_sample_interval_ms: 1_000,
            high_alert_c: 32.0,
            low_alert_c: 21.0,
            alert_cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        self.debounce_ms = self.debounce_ms.clamp(10, 2_000);
        self.read_interval_ms = self.read_interval_ms.clamp(100, 60_000);
        self.tick_delay_ms = self.tick_delay_ms.clamp(1, 100);
        self.wifi_connect_attempts = self.wifi_connect_attempts.max(1);
        self.wifi_reconnect_interval_ms = self.wifi_reconnect_interval_ms.clamp(1_000, 600_000);
        self.wifi_restart_grace_ms = self.wifi_restart_grace_ms.max(self.wifi_reconnect_interval_ms);
        self.http_timeout_ms = self.http_timeout_ms.clamp(100, 30_000);
    }
}

impl ServerConfig {
    pub fn sanitize(&mut self) {
        if self.listen_port == 0 {
            self.listen_port = 8080;
        }
        self.history_capacity = self.history_capacity.clamp(1, 10_000);
        self.history_sample_interval_ms = self.history_sample_interval_ms.max(100);

        if !self.high_alert_c.is_finite() {
            self.high_alert_c = 32.0;
        }
        if !self.low_alert_c.is_finite() {
            self.low_alert_c = 21.0;
        }
        if self.low_alert_c > self.high_alert_c {
            std::mem::swap(&mut self.low_alert_c, &mut self.high_alert_c);
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut runtime: Self = serde_json::from_slice(raw)?;
        runtime.sanitize();
        Ok(runtime)
    }

    pub fn sanitize(&mut self) {
        self.device.sanitize();
        self.server.sanitize();
    }
}
