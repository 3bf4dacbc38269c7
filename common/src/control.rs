use log::debug;

use crate::{
    config::DeviceConfig,
    display::{self, Frame},
    input::{ButtonDebouncer, SwitchReader},
    state::DeviceState,
    sync::{self, SyncOutcome, Transport},
    types::{Channel, InputPin, Reading},
};

pub trait InputPins {
    /// Logical level of `pin`: `true` means pressed / switched on.
    fn sample(&mut self, pin: InputPin) -> bool;
}

pub trait TemperatureSensor {
    /// Starts a conversion on every sensor so the next read finds a finished
    /// value. Sensors that convert on demand keep the default.
    fn start_conversion(&mut self) {}

    /// Celsius reading, or the driver's disconnect sentinel.
    fn read_celsius(&mut self, channel: Channel) -> f32;
}

pub trait Display {
    fn render(&mut self, frame: &Frame);
}

/// Everything the control loop drives.
pub trait Board: InputPins + TemperatureSensor + Display + Transport {}

impl<T: InputPins + TemperatureSensor + Display + Transport> Board for T {}

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub switch_changed: bool,
    pub buttons_accepted: [bool; 2],
    pub sensors_read: bool,
    pub sync: Option<SyncOutcome>,
    pub rendered: bool,
}

#[derive(Debug)]
pub struct ControlLoop {
    config: DeviceConfig,
    sync_url: String,
    state: DeviceState,
    switch: SwitchReader,
    buttons: [ButtonDebouncer; 2],
}

impl ControlLoop {
    pub fn new(config: DeviceConfig, sync_url: impl Into<String>) -> Self {
        let state = DeviceState::new();
        Self {
            switch: SwitchReader::new(state.display_on()),
            buttons: [ButtonDebouncer::new(config.debounce_ms); 2],
            config,
            sync_url: sync_url.into(),
            state,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn last_button_edge_ms(&self, channel: Channel) -> Option<u64> {
        self.buttons[Self::button_index(channel)].last_edge_ms()
    }

    /// Draws the initial (blank) frame and primes the first conversion.
    pub fn start<B: Display + TemperatureSensor + ?Sized>(&mut self, board: &mut B) {
        board.render(&display::render(&self.state));
        board.start_conversion();
    }

    /// One pass of the fixed step order: switch, buttons, sensors, sync,
    /// then a render when anything visible changed.
    pub fn tick<B: Board + ?Sized>(&mut self, now_ms: u64, board: &mut B) -> TickReport {
        let mut report = TickReport::default();
        let mut refresh = false;

        let level = board.sample(InputPin::Switch);
        if let Some(level) = self.switch.update(level) {
            report.switch_changed = true;
            refresh |= self.state.apply_switch(level);
        }

        // Readers always see the pins so a press held across a display change
        // is not mistaken for a new edge; the transition itself is gated.
        for channel in Channel::ALL {
            let index = Self::button_index(channel);
            let pressed = board.sample(InputPin::button(channel));
            if self.buttons[index].update(pressed, now_ms) && self.state.press_button(channel) {
                report.buttons_accepted[index] = true;
                refresh = true;
            }
        }

        if self.state.read_due(now_ms, self.config.read_interval_ms) {
            self.state.mark_read(now_ms);
            report.sensors_read = true;

            for channel in Channel::ALL {
                let reading = Reading::classify(board.read_celsius(channel));
                if let Reading::Connected(value) = reading {
                    debug!("sensor {}: {value:.2}°C", channel.number());
                }
                refresh |= self.state.apply_reading(channel, reading);
            }
            board.start_conversion();

            if self.state.display_on() {
                let outcome = sync::exchange(&mut self.state, board, &self.sync_url, now_ms);
                refresh |= outcome.refresh_needed();
                report.sync = Some(outcome);
            }
        }

        if refresh {
            board.render(&display::render(&self.state));
            report.rendered = true;
        }

        report
    }

    fn button_index(channel: Channel) -> usize {
        match channel {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }
}
