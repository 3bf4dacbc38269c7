use core::convert::TryInto;
use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use ds18b20::Ds18b20;
use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle},
    text::{Baseline, Text},
};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, IOPin, Input, InputOutput, InputPin as _, PinDriver, Pull},
    i2c::{I2cConfig, I2cDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use one_wire_bus::{Address, OneWire};
use ssd1306::{
    mode::BufferedGraphicsMode, prelude::*, size::DisplaySize128x64, I2CDisplayInterface,
    Ssd1306,
};

use thermometer_common::{
    config::NetworkConfig, Channel, ControlLoop, Display, Frame, HttpResponse, InputPin,
    InputPins, LinkAction, LinkMonitor, RuntimeConfig, SyncOutcome, TemperatureSensor,
    TickReport, Transport, TransportError, DISCONNECTED_SENTINEL_C,
};

const NVS_NAMESPACE: &str = "thermometer";
const NVS_RUNTIME_KEY: &str = "runtime_json";

const SENSOR1_PIN: i32 = 4;
const SENSOR2_PIN: i32 = 5;
const MAX_RESPONSE_BYTES: usize = 4096;
/// 12-bit DS18B20 conversion time.
const CONVERSION_TIME: Duration = Duration::from_millis(750);

type OledDisplay = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

/// One DS18B20 on its own one-wire bus, so channel mapping never depends on
/// ROM ordering.
struct OneWireSensor {
    gpio: i32,
    bus: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    address: Option<Address>,
}

struct Oled {
    display: OledDisplay,
}

struct EspTransport {
    timeout: Duration,
}

struct EspBoard {
    sensors: [OneWireSensor; 2],
    conversion_started: Option<Instant>,
    buttons: [PinDriver<'static, AnyInputPin, Input>; 2],
    switch: PinDriver<'static, AnyInputPin, Input>,
    oled: Oled,
    transport: EspTransport,
    delay: Ets,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    apply_build_defaults(&mut runtime.network);

    let Peripherals {
        modem,
        pins,
        i2c0,
        ..
    } = Peripherals::take()?;

    let i2c = I2cDriver::new(
        i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )
    .context("failed to initialize I2C bus")?;
    let mut oled = Oled::new(i2c).context("SSD1306 display initialization failed")?;
    oled.clear();

    let mut delay = Ets;
    let sensors = [
        OneWireSensor::new(SENSOR1_PIN, pins.gpio4.downgrade(), &mut delay)?,
        OneWireSensor::new(SENSOR2_PIN, pins.gpio5.downgrade(), &mut delay)?,
    ];
    let buttons = [
        pull_up_input(pins.gpio25.downgrade_input())?,
        pull_up_input(pins.gpio26.downgrade_input())?,
    ];
    let switch = pull_up_input(pins.gpio27.downgrade_input())?;

    let (mut wifi, online) = connect_wifi(modem, sys_loop, nvs_partition, &runtime)
        .context("wifi startup failed")?;
    let has_credentials = !runtime.network.wifi_ssid.is_empty();
    if !online && has_credentials {
        warn!("continuing without network; reconnecting in the background");
    }

    let mut board = EspBoard {
        sensors,
        conversion_started: None,
        buttons,
        switch,
        oled,
        transport: EspTransport {
            timeout: Duration::from_millis(runtime.device.http_timeout_ms),
        },
        delay,
    };

    let mut control = ControlLoop::new(runtime.device, runtime.network.sync_url);
    let tick_delay = Duration::from_millis(control.config().tick_delay_ms);
    let mut link = LinkMonitor::new(control.config());
    control.start(&mut board);
    info!("thermometer device running");

    loop {
        let now_ms = monotonic_ms();
        if has_credentials {
            maintain_wifi(&mut wifi, &mut link, now_ms);
        }
        let report = control.tick(now_ms, &mut board);
        log_sync(&report);
        thread::sleep(tick_delay);
    }
}

fn log_sync(report: &TickReport) {
    if let Some(SyncOutcome::Applied(effect)) = &report.sync {
        if effect.changed() {
            info!("server override applied: {effect:?}");
        } else if effect.suppressed {
            debug!("server sensor change ignored while display is off");
        }
    }
}

/// Background reconnects while the station is down; a link that dropped and
/// stays down past the grace period restarts the chip.
fn maintain_wifi(wifi: &mut EspWifi<'static>, link: &mut LinkMonitor, now_ms: u64) {
    match link.poll(is_wifi_station_connected(), now_ms) {
        LinkAction::Idle => {}
        LinkAction::Reconnect => {
            if let Err(err) = wifi.connect() {
                debug!("wifi reconnect request failed: {err:#}");
            }
        }
        LinkAction::Restart => {
            warn!("wifi down beyond grace period, restarting");
            thread::sleep(Duration::from_millis(100));
            unsafe {
                esp_idf_svc::sys::esp_restart();
            }
        }
    }
}

fn pull_up_input(
    pin: AnyInputPin,
) -> anyhow::Result<PinDriver<'static, AnyInputPin, Input>> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    Ok(driver)
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 4096];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(RuntimeConfig::from_json(value.as_bytes())?),
        None => Ok(RuntimeConfig::default()),
    }
}

fn apply_build_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            network.wifi_ssid = ssid.to_string();
        }
    }
    if network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            network.wifi_pass = pass.to_string();
        }
    }
    if network.sync_url == NetworkConfig::default().sync_url {
        if let Some(url) = option_env!("SYNC_URL") {
            network.sync_url = url.to_string();
        }
    }
}

/// Returns the driver and whether the station came up. Exhausting the
/// attempts is not an error: the device keeps running offline.
fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    runtime: &RuntimeConfig,
) -> anyhow::Result<(EspWifi<'static>, bool)> {
    let network = &runtime.network;
    let attempts = runtime.device.wifi_connect_attempts;
    let retry_delay = Duration::from_millis(runtime.device.wifi_retry_delay_ms);

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    if network.wifi_ssid.is_empty() {
        warn!("wifi credentials missing; running offline");
        return Ok((esp_wifi, false));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    for attempt in 1..=attempts {
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected on attempt {attempt}/{attempts}");
                return Ok((esp_wifi, true));
            }
            Err(err) => debug!("wifi attempt {attempt}/{attempts} failed: {err:#}"),
        }
        if attempt < attempts {
            let _ = wifi.disconnect();
            thread::sleep(retry_delay);
        }
    }

    warn!("wifi connection failed after {attempts} attempts");
    let _ = wifi.disconnect();
    Ok((esp_wifi, false))
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

impl OneWireSensor {
    fn new(gpio: i32, pin: AnyIOPin, delay: &mut Ets) -> anyhow::Result<Self> {
        let mut one_wire_pin = PinDriver::input_output_od(pin)?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let bus = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus on GPIO{gpio}: {err:?}"))?;

        let mut sensor = Self {
            gpio,
            bus,
            address: None,
        };
        sensor.refresh_address(delay);
        Ok(sensor)
    }

    fn refresh_address(&mut self, delay: &mut Ets) {
        self.address = None;
        for addr in self.bus.devices(false, delay) {
            match addr {
                Ok(address) if address.family_code() == ds18b20::FAMILY_CODE => {
                    self.address = Some(address);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!("one-wire scan on GPIO{} failed: {err:?}", self.gpio);
                    break;
                }
            }
        }

        match self.address {
            Some(address) => info!("DS18B20 ready on GPIO{} ({address:?})", self.gpio),
            None => debug!("no DS18B20 on GPIO{}", self.gpio),
        }
    }

    /// Kicks off a conversion without waiting for it.
    fn start_conversion(&mut self, delay: &mut Ets) {
        if self.address.is_none() {
            self.refresh_address(delay);
        }
        if self.address.is_none() {
            return;
        }
        if let Err(err) = ds18b20::start_simultaneous_temp_measurement(&mut self.bus, delay) {
            debug!("DS18B20 on GPIO{} did not start conversion: {err:?}", self.gpio);
            self.address = None;
        }
    }

    /// Scratchpad value of the last conversion, or the disconnect sentinel.
    fn read(&mut self, delay: &mut Ets) -> f32 {
        let Some(address) = self.address else {
            return DISCONNECTED_SENTINEL_C;
        };

        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid DS18B20 address {address:?}: {err:?}");
                self.address = None;
                return DISCONNECTED_SENTINEL_C;
            }
        };

        match sensor.read_data(&mut self.bus, delay) {
            Ok(data) => data.temperature,
            Err(err) => {
                debug!("DS18B20 on GPIO{} read failed: {err:?}", self.gpio);
                self.address = None;
                DISCONNECTED_SENTINEL_C
            }
        }
    }
}

impl Oled {
    fn new(i2c: I2cDriver<'static>) -> anyhow::Result<Self> {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        display.init().map_err(|err| anyhow!("{err:?}"))?;
        Ok(Self { display })
    }

    fn clear(&mut self) {
        let _ = self.display.clear(BinaryColor::Off);
        if let Err(err) = self.display.flush() {
            warn!("display flush failed: {err:?}");
        }
    }

    fn draw_lines(&mut self, first: &str, second: &str) -> anyhow::Result<()> {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        let failed = |err| anyhow!("{err:?}");

        self.display.clear(BinaryColor::Off).map_err(failed)?;
        Text::with_baseline(first, Point::new(0, 12), style, Baseline::Top)
            .draw(&mut self.display)
            .map_err(failed)?;
        Line::new(Point::new(0, 31), Point::new(127, 31))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut self.display)
            .map_err(failed)?;
        Text::with_baseline(second, Point::new(0, 40), style, Baseline::Top)
            .draw(&mut self.display)
            .map_err(failed)?;
        self.display.flush().map_err(failed)
    }
}

impl InputPins for EspBoard {
    fn sample(&mut self, pin: InputPin) -> bool {
        // Pull-ups: a closed contact reads low.
        match pin {
            InputPin::Button1 => self.buttons[0].is_low(),
            InputPin::Button2 => self.buttons[1].is_low(),
            InputPin::Switch => self.switch.is_low(),
        }
    }
}

impl TemperatureSensor for EspBoard {
    fn start_conversion(&mut self) {
        for sensor in &mut self.sensors {
            sensor.start_conversion(&mut self.delay);
        }
        self.conversion_started = Some(Instant::now());
    }

    fn read_celsius(&mut self, channel: Channel) -> f32 {
        // Only the part of the conversion that has not already elapsed
        // between ticks is waited for, once per read cycle.
        match self.conversion_started.take() {
            Some(started) => {
                if let Some(remaining) = CONVERSION_TIME.checked_sub(started.elapsed()) {
                    thread::sleep(remaining);
                }
            }
            None if channel == Channel::One => {
                self.start_conversion();
                self.conversion_started = None;
                thread::sleep(CONVERSION_TIME);
            }
            None => {}
        }

        let sensor = match channel {
            Channel::One => &mut self.sensors[0],
            Channel::Two => &mut self.sensors[1],
        };
        sensor.read(&mut self.delay)
    }
}

impl Display for EspBoard {
    fn render(&mut self, frame: &Frame) {
        match frame {
            Frame::Blank => self.oled.clear(),
            Frame::Lines([first, second]) => {
                if let Err(err) = self.oled.draw_lines(first, second) {
                    warn!("display draw failed: {err:#}");
                }
            }
        }
    }
}

impl Transport for EspBoard {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        if !is_wifi_station_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.post_json(url, body)
    }
}

impl Transport for EspTransport {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf).map_err(io)?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("content-type", "application/json"),
            ("content-length", content_length.as_str()),
        ];
        let mut request = client.request(Method::Post, url, &headers).map_err(io)?;
        request.write_all(body).map_err(io)?;
        request.flush().map_err(io)?;

        let mut response = request.submit().map_err(io)?;
        let status = response.status();

        let mut payload = Vec::new();
        let mut chunk = [0_u8; 512];
        loop {
            let read = response.read(&mut chunk).map_err(io)?;
            if read == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..read]);
            if payload.len() > MAX_RESPONSE_BYTES {
                return Err(TransportError::Protocol("response too large".to_string()));
            }
        }

        Ok(HttpResponse {
            status,
            body: payload,
        })
    }
}

fn io<E: core::fmt::Debug>(err: E) -> TransportError {
    TransportError::Io(format!("{err:?}"))
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
