use crate::types::{Channel, SyncResponse};

/// Server-held desired state handed back to the device on every report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    pub sensor1: bool,
    pub sensor2: bool,
    pub display_on: bool,
    operator_changed_ms: [Option<u64>; 2],
    cooldown_ms: u64,
}

impl CommandState {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            sensor1: false,
            sensor2: false,
            display_on: true,
            operator_changed_ms: [None; 2],
            cooldown_ms,
        }
    }

    pub fn sensor(&self, channel: Channel) -> bool {
        match channel {
            Channel::One => self.sensor1,
            Channel::Two => self.sensor2,
        }
    }

    /// Operator flipped a sensor from the server side.
    pub fn toggle(&mut self, channel: Channel, now_ms: u64) -> bool {
        let desired = !self.sensor(channel);
        self.set_sensor(channel, desired);
        self.operator_changed_ms[Self::index(channel)] = Some(now_ms);
        desired
    }

    pub fn set_display(&mut self, display_on: bool) {
        self.display_on = display_on;
    }

    /// Adopts the device's flags unless the operator changed that flag
    /// within the cooldown, so an in-flight report cannot undo a fresh toggle.
    /// Returns the channels whose desired value changed.
    pub fn absorb(
        &mut self,
        sensor1: Option<bool>,
        sensor2: Option<bool>,
        now_ms: u64,
    ) -> Vec<Channel> {
        let mut changed = Vec::new();
        for (channel, reported) in [(Channel::One, sensor1), (Channel::Two, sensor2)] {
            let Some(reported) = reported else {
                continue;
            };
            if self.in_cooldown(channel, now_ms) || reported == self.sensor(channel) {
                continue;
            }
            self.set_sensor(channel, reported);
            changed.push(channel);
        }
        changed
    }

    pub fn response(&self) -> SyncResponse {
        SyncResponse {
            sensor1: Some(self.sensor1),
            sensor2: Some(self.sensor2),
            display_on: Some(self.display_on),
        }
    }

    fn in_cooldown(&self, channel: Channel, now_ms: u64) -> bool {
        self.operator_changed_ms[Self::index(channel)]
            .map(|changed| now_ms.saturating_sub(changed) <= self.cooldown_ms)
            .unwrap_or(false)
    }

    fn set_sensor(&mut self, channel: Channel, value: bool) {
        match channel {
            Channel::One => self.sensor1 = value,
            Channel::Two => self.sensor2 = value,
        }
    }

    fn index(channel: Channel) -> usize {
        match channel {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_request_display_on_and_sensors_off() {
        let command = CommandState::new(1_000);

        assert_eq!(
            command.response(),
            SyncResponse {
                sensor1: Some(false),
                sensor2: Some(false),
                display_on: Some(true),
            }
        );
    }

    #[test]
    fn device_button_changes_propagate_up() {
        let mut command = CommandState::new(1_000);

        let changed = command.absorb(Some(true), Some(false), 5_000);

        assert_eq!(changed, vec![Channel::One]);
        assert!(command.sensor1);
    }

    #[test]
    fn fresh_operator_toggle_survives_stale_report() {
        let mut command = CommandState::new(1_000);
        assert!(command.toggle(Channel::Two, 10_000));

        // Device has not seen the toggle yet.
        assert!(command.absorb(None, Some(false), 10_400).is_empty());
        assert!(command.sensor2);

        // After the cooldown the device is authoritative again.
        assert_eq!(command.absorb(None, Some(false), 11_001), vec![Channel::Two]);
        assert!(!command.sensor2);
    }

    #[test]
    fn missing_report_fields_leave_command_alone() {
        let mut command = CommandState::new(1_000);
        command.toggle(Channel::One, 0);

        assert!(command.absorb(None, None, 60_000).is_empty());
        assert!(command.sensor1);
    }

    #[test]
    fn response_carries_display_request() {
        let mut command = CommandState::new(1_000);
        command.set_display(false);
        command.toggle(Channel::One, 0);

        assert_eq!(
            command.response(),
            SyncResponse {
                sensor1: Some(true),
                sensor2: Some(false),
                display_on: Some(false),
            }
        );
    }
}
