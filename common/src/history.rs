use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Channel;

/// Fixed-length per-channel trace, oldest first. `None` marks a gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "history_1")]
    channel1: VecDeque<Option<f32>>,
    #[serde(rename = "history_2")]
    channel2: VecDeque<Option<f32>>,
    #[serde(skip)]
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channel1: VecDeque::from(vec![None; capacity]),
            channel2: VecDeque::from(vec![None; capacity]),
            capacity,
        }
    }

    /// Rebuilds a trace loaded from disk: keeps the newest `capacity` points
    /// and left-pads short traces with gaps.
    pub fn restore(mut loaded: History, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        loaded.capacity = capacity;
        for trace in [&mut loaded.channel1, &mut loaded.channel2] {
            for value in trace.iter_mut() {
                if value.is_some_and(|v| !v.is_finite()) {
                    *value = None;
                }
            }
            while trace.len() > capacity {
                trace.pop_front();
            }
            while trace.len() < capacity {
                trace.push_front(None);
            }
        }
        loaded
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, channel1: Option<f32>, channel2: Option<f32>) {
        for (trace, value) in [(&mut self.channel1, channel1), (&mut self.channel2, channel2)] {
            if trace.len() == self.capacity {
                trace.pop_front();
            }
            trace.push_back(value.filter(|v| v.is_finite()));
        }
    }

    pub fn trace(&self, channel: Channel) -> &VecDeque<Option<f32>> {
        match channel {
            Channel::One => &self.channel1,
            Channel::Two => &self.channel2,
        }
    }
}
