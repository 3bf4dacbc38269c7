use std::{
    io::{BufRead, ErrorKind},
    path::{Path, PathBuf},
    sync::{mpsc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, info, warn};

use thermometer_common::{
    Channel, ControlLoop, Display, Frame, HttpResponse, InputPin, InputPins, RuntimeConfig,
    SyncOutcome, TemperatureSensor, TickReport, Transport, TransportError,
    DISCONNECTED_SENTINEL_C,
};

use crate::http::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Press(Channel),
    FlipSwitch,
    ToggleDisconnect(Channel),
    Quit,
}

/// Simulated hardware: console-driven inputs, synthetic sensors, log display.
struct SimBoard {
    started: Instant,
    switch_on: bool,
    pending_press: [bool; 2],
    disconnected: [bool; 2],
    last_frame: Option<Frame>,
    transport: HttpTransport,
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("THERMOMETER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.thermometer"));
    let mut runtime = load_runtime_config(&data_dir.join("runtime.json"))?;
    if let Ok(url) = std::env::var("SYNC_URL") {
        runtime.network.sync_url = url;
    }

    info!(
        "thermometer device (host simulation) starting, sync url {}",
        runtime.network.sync_url
    );
    info!("console: 1/2 press button, s flip switch, d1/d2 toggle sensor disconnect, q quit");

    let (commands_tx, commands_rx) = mpsc::channel();
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || read_console(commands_tx))
        .context("failed to spawn console thread")?;

    let mut board = SimBoard::new(HttpTransport::new(runtime.device.http_timeout_ms));
    let mut control = ControlLoop::new(runtime.device, runtime.network.sync_url);
    let tick_delay = Duration::from_millis(control.config().tick_delay_ms);
    control.start(&mut board);

    loop {
        while let Ok(command) = commands_rx.try_recv() {
            if command == ConsoleCommand::Quit {
                info!("quit requested");
                return Ok(());
            }
            board.apply(command);
        }

        let report = control.tick(monotonic_ms(), &mut board);
        log_tick(&report);
        thread::sleep(tick_delay);
    }
}

fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match std::fs::read(path) {
        Ok(raw) => RuntimeConfig::from_json(&raw)
            .with_context(|| format!("invalid runtime config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn read_console(commands: mpsc::Sender<ConsoleCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("console read failed: {err}");
                break;
            }
        };
        match parse_command(&line) {
            Some(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!("unknown console command `{}`", line.trim()),
        }
    }
    debug!("console input closed");
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim() {
        "1" => Some(ConsoleCommand::Press(Channel::One)),
        "2" => Some(ConsoleCommand::Press(Channel::Two)),
        "s" => Some(ConsoleCommand::FlipSwitch),
        "d1" => Some(ConsoleCommand::ToggleDisconnect(Channel::One)),
        "d2" => Some(ConsoleCommand::ToggleDisconnect(Channel::Two)),
        "q" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

fn log_tick(report: &TickReport) {
    if report.switch_changed {
        info!("display switch changed");
    }
    for channel in Channel::ALL {
        if report.buttons_accepted[channel_index(channel)] {
            info!("button {} toggled sensor", channel.number());
        }
    }
    match &report.sync {
        Some(SyncOutcome::Applied(effect)) if effect.changed() => {
            info!("server override applied: {effect:?}");
        }
        Some(SyncOutcome::Applied(effect)) if effect.suppressed => {
            debug!("server sensor change ignored while display is off");
        }
        Some(outcome) => debug!("sync: {outcome:?}"),
        None => {}
    }
}

impl SimBoard {
    fn new(transport: HttpTransport) -> Self {
        Self {
            started: Instant::now(),
            switch_on: false,
            pending_press: [false; 2],
            disconnected: [false; 2],
            last_frame: None,
            transport,
        }
    }

    fn apply(&mut self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Press(channel) => self.pending_press[channel_index(channel)] = true,
            ConsoleCommand::FlipSwitch => {
                self.switch_on = !self.switch_on;
                info!("switch {}", if self.switch_on { "on" } else { "off" });
            }
            ConsoleCommand::ToggleDisconnect(channel) => {
                let flag = &mut self.disconnected[channel_index(channel)];
                *flag = !*flag;
                info!(
                    "sensor {} {}",
                    channel.number(),
                    if *flag { "unplugged" } else { "plugged in" }
                );
            }
            ConsoleCommand::Quit => {}
        }
    }
}

impl InputPins for SimBoard {
    fn sample(&mut self, pin: InputPin) -> bool {
        match pin {
            // A press is high for exactly one sample.
            InputPin::Button1 => std::mem::take(&mut self.pending_press[0]),
            InputPin::Button2 => std::mem::take(&mut self.pending_press[1]),
            InputPin::Switch => self.switch_on,
        }
    }
}

impl TemperatureSensor for SimBoard {
    fn read_celsius(&mut self, channel: Channel) -> f32 {
        let index = channel_index(channel);
        if self.disconnected[index] {
            return DISCONNECTED_SENTINEL_C;
        }
        let elapsed_s = self.started.elapsed().as_secs_f32();
        let base = 22.0 + index as f32 * 3.5;
        base + 1.5 * (elapsed_s / 45.0 + index as f32).sin()
    }
}

impl Display for SimBoard {
    fn render(&mut self, frame: &Frame) {
        if self.last_frame.as_ref() == Some(frame) {
            return;
        }
        match frame {
            Frame::Blank => info!("[display] (blank)"),
            Frame::Lines(_) => info!("[display]\n{}", frame.to_text()),
        }
        self.last_frame = Some(frame.clone());
    }
}

impl Transport for SimBoard {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        self.transport.post_json(url, body)
    }
}

fn channel_index(channel: Channel) -> usize {
    match channel {
        Channel::One => 0,
        Channel::Two => 1,
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
