use log::{debug, info};

use crate::types::{Channel, Reading, SensorReport, SyncResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ChannelState {
    enabled: bool,
    disconnected: bool,
    temp_c: f32,
}

impl ChannelState {
    fn visible_temp(&self) -> Option<f32> {
        (self.enabled && !self.disconnected).then_some(self.temp_c)
    }
}

/// What an inbound override did to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideEffect {
    pub sensor1_changed: bool,
    pub sensor2_changed: bool,
    /// Set when the server asked for a flag change that was dropped because the
    /// display is off.
    pub suppressed: bool,
    pub requested_display_on: Option<bool>,
}

impl OverrideEffect {
    pub fn changed(&self) -> bool {
        self.sensor1_changed || self.sensor2_changed
    }
}

/// Authoritative device record.
///
/// Owned by the control loop; every mutation goes through one of the
/// transition methods below, each of which reports whether the rendered frame
/// may have changed. Disconnect flags and temperatures are only written by
/// [`DeviceState::apply_reading`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    display_on: bool,
    sensor1: ChannelState,
    sensor2: ChannelState,
    last_temp_read_ms: Option<u64>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_on(&self) -> bool {
        self.display_on
    }

    pub fn sensor_enabled(&self, channel: Channel) -> bool {
        self.channel(channel).enabled
    }

    pub fn sensor_disconnected(&self, channel: Channel) -> bool {
        self.channel(channel).disconnected
    }

    pub fn temp_c(&self, channel: Channel) -> f32 {
        self.channel(channel).temp_c
    }

    pub fn last_temp_read_ms(&self) -> Option<u64> {
        self.last_temp_read_ms
    }

    pub fn read_due(&self, now_ms: u64, interval_ms: u64) -> bool {
        self.last_temp_read_ms
            .map(|last| now_ms.saturating_sub(last) >= interval_ms)
            .unwrap_or(true)
    }

    pub fn mark_read(&mut self, now_ms: u64) {
        self.last_temp_read_ms = Some(now_ms);
    }

    /// Switch edge. The display follows the new level; intent flags are kept.
    pub fn apply_switch(&mut self, level: bool) -> bool {
        if self.display_on == level {
            return false;
        }
        self.display_on = level;
        info!("display switched {}", if level { "on" } else { "off" });
        true
    }

    /// Accepted button edge. Ignored while the display is off.
    pub fn press_button(&mut self, channel: Channel) -> bool {
        if !self.display_on {
            debug!("button {} ignored, display is off", channel.number());
            return false;
        }
        let state = self.channel_mut(channel);
        state.enabled = !state.enabled;
        info!(
            "sensor {} {} locally",
            channel.number(),
            if state.enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Poller result for one channel. Returns `true` when the change is on
    /// screen.
    pub fn apply_reading(&mut self, channel: Channel, reading: Reading) -> bool {
        let display_on = self.display_on;
        let state = self.channel_mut(channel);
        let before = *state;

        match reading {
            Reading::Connected(value) => {
                state.disconnected = false;
                state.temp_c = value;
            }
            Reading::Disconnected => {
                state.disconnected = true;
            }
        }

        if state.disconnected != before.disconnected {
            debug!(
                "sensor {} {}",
                channel.number(),
                if state.disconnected {
                    "disconnected"
                } else {
                    "reconnected"
                }
            );
        }

        display_on && state.enabled && *state != before
    }

    /// Server override. Sensor flags are only taken while the display is on;
    /// the requested display level is reported back but never applied.
    pub fn apply_override(&mut self, response: &SyncResponse) -> OverrideEffect {
        let mut effect = OverrideEffect {
            requested_display_on: response.display_on,
            ..OverrideEffect::default()
        };

        if let Some(requested) = response.display_on {
            if requested != self.display_on {
                info!(
                    "server requested display {}, switch stays authoritative",
                    if requested { "on" } else { "off" }
                );
            }
        }

        for channel in Channel::ALL {
            let Some(desired) = response.sensor(channel) else {
                continue;
            };
            if desired == self.channel(channel).enabled {
                continue;
            }
            if !self.display_on {
                effect.suppressed = true;
                continue;
            }

            self.channel_mut(channel).enabled = desired;
            info!(
                "sensor {} {} by server",
                channel.number(),
                if desired { "enabled" } else { "disabled" }
            );
            match channel {
                Channel::One => effect.sensor1_changed = true,
                Channel::Two => effect.sensor2_changed = true,
            }
        }

        effect
    }

    pub fn report(&self, now_ms: u64) -> SensorReport {
        SensorReport {
            temp1: self.sensor1.visible_temp(),
            temp2: self.sensor2.visible_temp(),
            sensor1: self.sensor1.enabled,
            sensor2: self.sensor2.enabled,
            timestamp: now_ms,
        }
    }

    fn channel(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::One => &self.sensor1,
            Channel::Two => &self.sensor2,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::One => &mut self.sensor1,
            Channel::Two => &mut self.sensor2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn powered() -> DeviceState {
        let mut state = DeviceState::new();
        state.apply_switch(true);
        state
    }

    #[test]
    fn starts_all_off() {
        let state = DeviceState::new();

        assert!(!state.display_on());
        for channel in Channel::ALL {
            assert!(!state.sensor_enabled(channel));
        }
        assert_eq!(state.last_temp_read_ms(), None);
    }

    #[test]
    fn switch_off_keeps_intent_flags() {
        let mut state = powered();
        state.press_button(Channel::One);

        assert!(state.apply_switch(false));
        assert!(!state.display_on());
        assert!(state.sensor_enabled(Channel::One));

        assert!(!state.apply_switch(false));
    }

    #[test]
    fn buttons_are_ignored_while_display_off() {
        let mut state = DeviceState::new();

        assert!(!state.press_button(Channel::One));
        assert!(!state.press_button(Channel::Two));
        assert!(!state.sensor_enabled(Channel::One));
        assert!(!state.sensor_enabled(Channel::Two));

        // Nothing was queued while off.
        state.apply_switch(true);
        assert!(!state.sensor_enabled(Channel::One));
    }

    #[test]
    fn buttons_toggle_while_display_on() {
        let mut state = powered();

        assert!(state.press_button(Channel::Two));
        assert!(state.sensor_enabled(Channel::Two));
        assert!(state.press_button(Channel::Two));
        assert!(!state.sensor_enabled(Channel::Two));
    }

    #[test]
    fn disconnected_reading_keeps_last_temperature() {
        let mut state = powered();
        state.apply_reading(Channel::One, Reading::Connected(23.5));

        state.apply_reading(Channel::One, Reading::Disconnected);

        assert!(state.sensor_disconnected(Channel::One));
        assert_eq!(state.temp_c(Channel::One), 23.5);

        state.apply_reading(Channel::One, Reading::Connected(19.25));
        assert!(!state.sensor_disconnected(Channel::One));
        assert_eq!(state.temp_c(Channel::One), 19.25);
    }

    #[test]
    fn poller_tracks_disabled_channels() {
        let mut state = DeviceState::new();

        let refresh = state.apply_reading(Channel::Two, Reading::Disconnected);

        assert!(!refresh);
        assert!(state.sensor_disconnected(Channel::Two));
    }

    #[test]
    fn reading_refreshes_only_visible_changes() {
        let mut state = powered();
        assert!(!state.apply_reading(Channel::One, Reading::Connected(20.0)));

        state.press_button(Channel::One);
        assert!(state.apply_reading(Channel::One, Reading::Connected(21.0)));
        assert!(!state.apply_reading(Channel::One, Reading::Connected(21.0)));
        assert!(state.apply_reading(Channel::One, Reading::Disconnected));

        state.apply_switch(false);
        assert!(!state.apply_reading(Channel::One, Reading::Connected(22.0)));
    }

    #[test]
    fn override_applies_while_display_on() {
        let mut state = powered();
        let response = SyncResponse {
            sensor2: Some(true),
            ..SyncResponse::default()
        };

        let first = state.apply_override(&response);
        assert!(first.sensor2_changed);
        assert!(!first.sensor1_changed);
        assert!(state.sensor_enabled(Channel::Two));

        let snapshot = state.clone();
        let second = state.apply_override(&response);
        assert!(!second.changed());
        assert_eq!(state, snapshot);
    }

    #[test]
    fn override_is_suppressed_while_display_off() {
        let mut state = DeviceState::new();
        let response = SyncResponse {
            sensor1: Some(true),
            sensor2: Some(true),
            display_on: Some(true),
        };

        let effect = state.apply_override(&response);

        assert!(!effect.changed());
        assert!(effect.suppressed);
        assert!(!state.sensor_enabled(Channel::One));
        assert!(!state.sensor_enabled(Channel::Two));
        assert!(!state.display_on());
    }

    #[test]
    fn override_never_drives_display() {
        let mut state = powered();
        let effect = state.apply_override(&SyncResponse {
            display_on: Some(false),
            ..SyncResponse::default()
        });

        assert_eq!(effect.requested_display_on, Some(false));
        assert!(state.display_on());
    }

    #[test]
    fn absent_override_fields_keep_local_values() {
        let mut state = powered();
        state.press_button(Channel::One);

        let effect = state.apply_override(&SyncResponse::default());

        assert!(!effect.changed());
        assert!(state.sensor_enabled(Channel::One));
    }

    #[test]
    fn report_hides_disabled_and_disconnected_temps() {
        let mut state = powered();
        state.apply_reading(Channel::One, Reading::Disconnected);
        state.apply_reading(Channel::Two, Reading::Connected(24.75));
        state.press_button(Channel::One);

        let report = state.report(9_000);

        assert_eq!(
            report,
            SensorReport {
                temp1: None,
                temp2: None,
                sensor1: true,
                sensor2: false,
                timestamp: 9_000,
            }
        );

        state.press_button(Channel::Two);
        assert_eq!(state.report(9_001).temp2, Some(24.75));
    }

    #[test]
    fn read_interval_gating() {
        let mut state = DeviceState::new();
        assert!(state.read_due(0, 1_000));

        state.mark_read(500);
        assert!(!state.read_due(1_499, 1_000));
        assert!(state.read_due(1_500, 1_000));
    }
}
