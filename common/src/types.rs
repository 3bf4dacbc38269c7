use serde::{Deserialize, Serialize};

/// Value the sensor driver reports when a channel does not answer.
pub const DISCONNECTED_SENTINEL_C: f32 = -127.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    One,
    Two,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputPin {
    Button1,
    Button2,
    Switch,
}

impl InputPin {
    pub fn button(channel: Channel) -> Self {
        match channel {
            Channel::One => Self::Button1,
            Channel::Two => Self::Button2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Connected(f32),
    Disconnected,
}

impl Reading {
    pub fn classify(raw_c: f32) -> Self {
        if !raw_c.is_finite() || (raw_c - DISCONNECTED_SENTINEL_C).abs() < f32::EPSILON {
            Self::Disconnected
        } else {
            Self::Connected(raw_c)
        }
    }

    pub fn value(self) -> Option<f32> {
        match self {
            Self::Connected(value) => Some(value),
            Self::Disconnected => None,
        }
    }
}

/// Body the device posts on every sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReport {
    pub temp1: Option<f32>,
    pub temp2: Option<f32>,
    pub sensor1: bool,
    pub sensor2: bool,
    pub timestamp: u64,
}

/// Server answer to a report. Every field is an independent opinion; `None`
/// means the server has none and the device keeps its local value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor1: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor2: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_on: Option<bool>,
}

impl SyncResponse {
    pub fn sensor(&self, channel: Channel) -> Option<bool> {
        match channel {
            Channel::One => self.sensor1,
            Channel::Two => self.sensor2,
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinel_and_non_finite_values_classify_as_disconnected() {
        assert_eq!(Reading::classify(-127.0), Reading::Disconnected);
        assert_eq!(Reading::classify(f32::NAN), Reading::Disconnected);
        assert_eq!(Reading::classify(f32::INFINITY), Reading::Disconnected);
        assert_eq!(Reading::classify(-126.5), Reading::Connected(-126.5));
        assert_eq!(Reading::classify(0.0), Reading::Connected(0.0));
    }

    #[test]
    fn report_serializes_missing_temps_as_null() {
        let report = SensorReport {
            temp1: None,
            temp2: Some(21.5),
            sensor1: true,
            sensor2: true,
            timestamp: 4_000,
        };

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "temp1": null,
                "temp2": 21.5,
                "sensor1": true,
                "sensor2": true,
                "timestamp": 4000
            })
        );
    }

    #[test]
    fn response_keeps_absent_fields_distinct_from_false() {
        let parsed: SyncResponse =
            serde_json::from_str(r#"{"sensor2": false, "status": "success"}"#).unwrap();

        assert_eq!(
            parsed,
            SyncResponse {
                sensor1: None,
                sensor2: Some(false),
                display_on: None,
            }
        );
    }

    #[test]
    fn channel_numbers_round_trip() {
        assert_eq!(Channel::from_number(1), Some(Channel::One));
        assert_eq!(Channel::from_number(2), Some(Channel::Two));
        assert_eq!(Channel::from_number(3), None);
        assert_eq!(Channel::Two.number(), 2);
    }
}
