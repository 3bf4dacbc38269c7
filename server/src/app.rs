use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use thermometer_common::{
    celsius_to_fahrenheit, AlertMonitor, Channel, CommandState, History, ServerConfig,
    SyncResponse,
};

use crate::store::AppStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<SyncState>>,
    config: Arc<ServerConfig>,
    store: AppStore,
}

struct SyncState {
    commands: CommandState,
    latest: Option<LatestSample>,
    /// A report arrived since the history sampler last ran.
    fresh: bool,
    history: History,
    alerts: AlertMonitor,
}

#[derive(Debug, Clone, Copy)]
struct LatestSample {
    temp1: Option<f32>,
    temp2: Option<f32>,
    sensor1: Option<bool>,
    sensor2: Option<bool>,
    device_timestamp: Option<u64>,
    received_ms: u64,
}

/// Device report as accepted by the server: every field is optional.
#[derive(Debug, Default, Deserialize)]
struct InboundReport {
    #[serde(default)]
    temp1: Option<f32>,
    #[serde(default)]
    temp2: Option<f32>,
    #[serde(default)]
    sensor1: Option<bool>,
    #[serde(default)]
    sensor2: Option<bool>,
    #[serde(default)]
    timestamp: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ReportAck {
    status: &'static str,
    #[serde(flatten)]
    desired: SyncResponse,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct TestBody {
    message: &'static str,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct DisplayUpdate {
    display_on: bool,
}

#[derive(Debug, Serialize)]
struct ChannelStatus {
    desired_on: bool,
    reported_on: Option<bool>,
    temp_c: Option<f32>,
    temp_f: Option<f32>,
}

#[derive(Debug, Serialize)]
struct StatusView {
    online: bool,
    display_on: bool,
    last_report_age_ms: Option<u64>,
    device_timestamp: Option<u64>,
    sensor1: ChannelStatus,
    sensor2: ChannelStatus,
}

#[derive(Debug, Serialize)]
struct HistoryView<'a> {
    interval_ms: u64,
    capacity: usize,
    #[serde(flatten)]
    history: &'a History,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::from_env();
    let runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        Default::default()
    });
    let config = runtime.server;

    let history = store
        .load_history(config.history_capacity)
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load history, starting empty: {err:#}");
            History::new(config.history_capacity)
        });

    let port = std::env::var("SERVER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.listen_port);

    let app_state = AppState::new(config, history, store);
    spawn_history_loop(app_state.clone());

    let app = router(app_state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind sync server at {addr}"))?;

    info!("sync server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    persist_history(&app_state).await;
    info!("sync server stopped");
    Ok(())
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/test", get(handle_test))
        .route("/data", post(handle_post_data))
        .route("/api/status", get(handle_get_status))
        .route("/api/sensor/{channel}/toggle", post(handle_toggle_sensor))
        .route("/api/display", put(handle_put_display))
        .route("/api/history", get(handle_get_history))
        .with_state(app_state)
}

impl AppState {
    pub fn new(config: ServerConfig, history: History, store: AppStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SyncState {
                commands: CommandState::new(config.operator_cooldown_ms),
                latest: None,
                fresh: false,
                history,
                alerts: AlertMonitor::new(&config),
            })),
            config: Arc::new(config),
            store,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn spawn_history_loop(app_state: AppState) {
    tokio::spawn(async move {
        let period = Duration::from_millis(app_state.config.history_sample_interval_ms);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            sample_history(&app_state).await;
            persist_history(&app_state).await;
        }
    });
}

/// Appends one point per channel: the reported temperature when a report
/// arrived since the last sample and the channel is desired-on, else a gap.
async fn sample_history(app_state: &AppState) {
    let mut state = app_state.inner.lock().await;
    let fresh = std::mem::take(&mut state.fresh);
    let point = |channel: Channel, state: &SyncState| {
        if !fresh || !state.commands.sensor(channel) {
            return None;
        }
        state.latest.and_then(|sample| match channel {
            Channel::One => sample.temp1,
            Channel::Two => sample.temp2,
        })
    };
    let first = point(Channel::One, &*state);
    let second = point(Channel::Two, &*state);
    state.history.push(first, second);
}

async fn persist_history(app_state: &AppState) {
    let snapshot = app_state.inner.lock().await.history.clone();
    if let Err(err) = app_state.store.save_history(&snapshot).await {
        warn!("failed to persist history: {err:#}");
    }
}

async fn handle_root() -> &'static str {
    "Smart thermometer sync server is running"
}

async fn handle_test() -> impl IntoResponse {
    Json(TestBody {
        message: "Server is reachable",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn handle_post_data(State(app_state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let report = match serde_json::from_slice::<InboundReport>(&body) {
        Ok(report) => report,
        Err(err) => {
            warn!("rejecting device report: {err}");
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid report: {err}"));
        }
    };
    let now_ms = monotonic_ms();
    debug!("device report: {report:?}");

    let mut state = app_state.inner.lock().await;

    for channel in state.commands.absorb(report.sensor1, report.sensor2, now_ms) {
        info!(
            "sensor {} turned {} from the device",
            channel.number(),
            if state.commands.sensor(channel) { "on" } else { "off" }
        );
    }

    state.latest = Some(LatestSample {
        temp1: report.temp1.filter(|value| value.is_finite()),
        temp2: report.temp2.filter(|value| value.is_finite()),
        sensor1: report.sensor1,
        sensor2: report.sensor2,
        device_timestamp: report.timestamp,
        received_ms: now_ms,
    });
    state.fresh = true;

    for (channel, temp) in [(Channel::One, report.temp1), (Channel::Two, report.temp2)] {
        let Some(temp) = temp.filter(|value| value.is_finite()) else {
            continue;
        };
        if !state.commands.sensor(channel) {
            continue;
        }
        if let Some(alert) = state.alerts.check(channel, temp, now_ms) {
            warn!("{}", alert.message());
        }
    }

    Json(ReportAck {
        status: "success",
        desired: state.commands.response(),
    })
    .into_response()
}

async fn handle_get_status(State(app_state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let state = app_state.inner.lock().await;

    let age_ms = state
        .latest
        .map(|sample| now_ms.saturating_sub(sample.received_ms));
    let channel_status = |channel: Channel| {
        let (reported_on, temp_c) = match (channel, state.latest) {
            (_, None) => (None, None),
            (Channel::One, Some(sample)) => (sample.sensor1, sample.temp1),
            (Channel::Two, Some(sample)) => (sample.sensor2, sample.temp2),
        };
        ChannelStatus {
            desired_on: state.commands.sensor(channel),
            reported_on,
            temp_c,
            temp_f: temp_c.map(celsius_to_fahrenheit),
        }
    };

    Json(StatusView {
        online: age_ms.is_some_and(|age| age <= app_state.config.online_timeout_ms),
        display_on: state.commands.display_on,
        last_report_age_ms: age_ms,
        device_timestamp: state.latest.and_then(|sample| sample.device_timestamp),
        sensor1: channel_status(Channel::One),
        sensor2: channel_status(Channel::Two),
    })
}

async fn handle_toggle_sensor(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
) -> impl IntoResponse {
    let Some(channel) = channel.parse::<u8>().ok().and_then(Channel::from_number) else {
        return error_response(StatusCode::BAD_REQUEST, "Sensor must be 1 or 2");
    };

    let desired = {
        let mut state = app_state.inner.lock().await;
        state.commands.toggle(channel, monotonic_ms())
    };
    info!(
        "operator turned sensor {} {}",
        channel.number(),
        if desired { "on" } else { "off" }
    );

    handle_get_status(State(app_state)).await.into_response()
}

async fn handle_put_display(
    State(app_state): State<AppState>,
    Json(update): Json<DisplayUpdate>,
) -> impl IntoResponse {
    app_state
        .inner
        .lock()
        .await
        .commands
        .set_display(update.display_on);
    info!("requested display_on = {}", update.display_on);

    handle_get_status(State(app_state)).await.into_response()
}

async fn handle_get_history(State(app_state): State<AppState>) -> impl IntoResponse {
    let state = app_state.inner.lock().await;
    Json(HistoryView {
        interval_ms: app_state.config.history_sample_interval_ms,
        capacity: state.history.capacity(),
        history: &state.history,
    })
    .into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            status: "error",
            message: message.to_string(),
        }),
    )
        .into_response()
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
