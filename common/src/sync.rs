use log::{debug, warn};

use crate::{
    error::TransportError,
    state::{DeviceState, OverrideEffect},
    types::SyncResponse,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking JSON POST. One attempt per call; retries belong to the next cycle.
pub trait Transport {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Display is off, nothing was sent.
    Suppressed,
    TransportFailed(TransportError),
    Rejected { status: u16 },
    Malformed(String),
    Applied(OverrideEffect),
}

impl SyncOutcome {
    pub fn sent(&self) -> bool {
        !matches!(self, Self::Suppressed)
    }

    pub fn refresh_needed(&self) -> bool {
        matches!(self, Self::Applied(effect) if effect.changed())
    }
}

/// One report/reconcile cycle against `url`.
pub fn exchange<T: Transport + ?Sized>(
    state: &mut DeviceState,
    transport: &mut T,
    url: &str,
    now_ms: u64,
) -> SyncOutcome {
    if !state.display_on() {
        return SyncOutcome::Suppressed;
    }

    let report = state.report(now_ms);
    let body = match serde_json::to_vec(&report) {
        Ok(body) => body,
        Err(err) => return SyncOutcome::Malformed(format!("report encoding failed: {err}")),
    };

    let response = match transport.post_json(url, &body) {
        Ok(response) => response,
        Err(err) => {
            warn!("sync post failed: {err}");
            return SyncOutcome::TransportFailed(err);
        }
    };

    if !response.is_success() {
        warn!("sync server answered HTTP {}", response.status);
        return SyncOutcome::Rejected {
            status: response.status,
        };
    }

    match serde_json::from_slice::<SyncResponse>(&response.body) {
        Ok(desired) => {
            debug!("sync response: {desired:?}");
            SyncOutcome::Applied(state.apply_override(&desired))
        }
        Err(err) => {
            warn!("discarding malformed sync response: {err}");
            SyncOutcome::Malformed(err.to_string())
        }
    }
}
