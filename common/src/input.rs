/// Rising-edge detector for a push button with a dead time after every
/// accepted press.
#[derive(Debug, Clone, Copy)]
pub struct ButtonDebouncer {
    window_ms: u64,
    last_sample: bool,
    last_edge_ms: Option<u64>,
}

impl ButtonDebouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_sample: false,
            last_edge_ms: None,
        }
    }

    /// Feeds one raw sample (`true` = pressed). Returns `true` when this
    /// sample is an accepted press.
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> bool {
        let rising = pressed && !self.last_sample;
        self.last_sample = pressed;

        if !rising {
            return false;
        }

        let settled = self
            .last_edge_ms
            .map(|last| now_ms.saturating_sub(last) >= self.window_ms)
            .unwrap_or(true);
        if settled {
            self.last_edge_ms = Some(now_ms);
        }
        settled
    }

    pub fn last_edge_ms(&self) -> Option<u64> {
        self.last_edge_ms
    }
}

/// Level follower for the slow mechanical on/off switch. No debounce.
#[derive(Debug, Clone, Copy)]
pub struct SwitchReader {
    last_level: bool,
}

impl SwitchReader {
    pub fn new(initial_level: bool) -> Self {
        Self {
            last_level: initial_level,
        }
    }

    /// Returns the new level when it differs from the last observed one.
    pub fn update(&mut self, level: bool) -> Option<bool> {
        if level == self.last_level {
            return None;
        }
        self.last_level = level;
        Some(level)
    }
}
