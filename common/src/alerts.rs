use std::collections::HashMap;

use crate::{
    config::ServerConfig,
    types::{celsius_to_fahrenheit, Channel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alert {
    pub channel: Channel,
    pub kind: AlertKind,
    pub temp_c: f32,
    pub threshold_c: f32,
}

impl Alert {
    pub fn message(&self) -> String {
        let direction = match self.kind {
            AlertKind::High => "exceeded",
            AlertKind::Low => "dropped below",
        };
        format!(
            "Smart Thermometer Alert: sensor {} temperature {} {:.1}°C ({:.1}°F). Current: {:.1}°C / {:.1}°F.",
            self.channel.number(),
            direction,
            self.threshold_c,
            celsius_to_fahrenheit(self.threshold_c),
            self.temp_c,
            celsius_to_fahrenheit(self.temp_c),
        )
    }
}

/// Threshold checks with a per-(channel, kind) rate limit.
#[derive(Debug, Clone)]
pub struct AlertMonitor {
    high_c: f32,
    low_c: f32,
    cooldown_ms: u64,
    last_sent_ms: HashMap<(Channel, AlertKind), u64>,
}

impl AlertMonitor {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            high_c: config.high_alert_c,
            low_c: config.low_alert_c,
            cooldown_ms: config.alert_cooldown_ms,
            last_sent_ms: HashMap::new(),
        }
    }

    pub fn check(&mut self, channel: Channel, temp_c: f32, now_ms: u64) -> Option<Alert> {
        let (kind, threshold_c) = if temp_c > self.high_c {
            (AlertKind::High, self.high_c)
        } else if temp_c < self.low_c {
            (AlertKind::Low, self.low_c)
        } else {
            return None;
        };

        let key = (channel, kind);
        if let Some(last) = self.last_sent_ms.get(&key) {
            if now_ms.saturating_sub(*last) < self.cooldown_ms {
                return None;
            }
        }
        self.last_sent_ms.insert(key, now_ms);

        Some(Alert {
            channel,
            kind,
            temp_c,
            threshold_c,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> AlertMonitor {
        AlertMonitor::new(&ServerConfig::default())
    }

    #[test]
    fn in_range_temperatures_are_quiet() {
        let mut monitor = monitor();

        assert_eq!(monitor.check(Channel::One, 25.0, 0), None);
        assert_eq!(monitor.check(Channel::One, 32.0, 0), None);
        assert_eq!(monitor.check(Channel::One, 21.0, 0), None);
    }

    #[test]
    fn high_alert_is_rate_limited_per_channel() {
        let mut monitor = monitor();

        let alert = monitor.check(Channel::One, 33.5, 1_000).unwrap();
        assert_eq!(alert.kind, AlertKind::High);
        assert_eq!(monitor.check(Channel::One, 34.0, 20_000), None);
        assert!(monitor.check(Channel::Two, 34.0, 20_000).is_some());
        assert!(monitor.check(Channel::One, 34.0, 31_000).is_some());
    }

    #[test]
    fn low_and_high_have_separate_cooldowns() {
        let mut monitor = monitor();

        assert!(monitor.check(Channel::Two, 10.0, 0).is_some());
        assert!(monitor.check(Channel::Two, 40.0, 1).is_some());
        assert_eq!(monitor.check(Channel::Two, 10.0, 2), None);
    }

    #[test]
    fn message_mentions_both_units() {
        let alert = Alert {
            channel: Channel::One,
            kind: AlertKind::High,
            temp_c: 35.0,
            threshold_c: 32.0,
        };

        let message = alert.message();

        assert!(message.contains("exceeded 32.0°C (89.6°F)"));
        assert!(message.contains("35.0°C / 95.0°F"));
    }
}
