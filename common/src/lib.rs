pub mod alerts;
pub mod command;
pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod history;
pub mod input;
pub mod link;
pub mod state;
pub mod sync;
pub mod types;

pub use alerts::{Alert, AlertKind, AlertMonitor};
pub use command::CommandState;
pub use config::{DeviceConfig, NetworkConfig, RuntimeConfig, ServerConfig};
pub use control::{Board, ControlLoop, Display, InputPins, TemperatureSensor, TickReport};
pub use display::{render, Frame};
pub use error::{ConfigError, TransportError};
pub use history::History;
pub use input::{ButtonDebouncer, SwitchReader};
pub use link::{LinkAction, LinkMonitor};
pub use state::{DeviceState, OverrideEffect};
pub use sync::{exchange, HttpResponse, SyncOutcome, Transport};
pub use types::{
    celsius_to_fahrenheit, Channel, InputPin, Reading, SensorReport, SyncResponse,
    DISCONNECTED_SENTINEL_C,
};
