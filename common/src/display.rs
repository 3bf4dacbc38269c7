use crate::{state::DeviceState, types::Channel};

pub const SEPARATOR: &str = "----------------";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Blank,
    Lines([String; 2]),
}

impl Frame {
    pub fn lines(&self) -> Option<&[String; 2]> {
        match self {
            Self::Blank => None,
            Self::Lines(lines) => Some(lines),
        }
    }

    /// Text layout with the separating rule, used by character displays and
    /// the host console.
    pub fn to_text(&self) -> String {
        match self {
            Self::Blank => String::new(),
            Self::Lines([first, second]) => format!("{first}\n{SEPARATOR}\n{second}"),
        }
    }
}

pub fn render(state: &DeviceState) -> Frame {
    if !state.display_on() {
        return Frame::Blank;
    }
    Frame::Lines([
        sensor_line(state, Channel::One),
        sensor_line(state, Channel::Two),
    ])
}

fn sensor_line(state: &DeviceState, channel: Channel) -> String {
    let number = channel.number();
    if !state.sensor_enabled(channel) {
        format!("Sensor {number}: OFF")
    } else if state.sensor_disconnected(channel) {
        format!("Sensor {number}: DISCONNECT")
    } else {
        format!("Sensor {number}: {:.2}°C", state.temp_c(channel))
    }
}
