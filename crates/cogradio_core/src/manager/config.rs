use std::time::Duration;

use crate::decision::{SelectionPolicy, SwitchPolicy};
use crate::error::{Error, Result};
use crate::types::{ChannelId, Position};

/// Default sensing period
pub const DEFAULT_SENSE_TIME: Duration = Duration::from_millis(100);

/// Default transmission period
pub const DEFAULT_TRANSMIT_TIME: Duration = Duration::from_millis(200);

/// Default channel switching delay
pub const DEFAULT_HANDOFF_TIME: Duration = Duration::from_millis(10);

/// Upper bound on a backoff spent waiting for a busy channel to clear
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Physical-layer side of the node binding
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhyBinding {
    /// Antenna location used for PU footprint queries
    pub position: Position,
}

impl PhyBinding {
    pub fn at(position: Position) -> Self {
        Self { position }
    }
}

/// Timing and policy knobs for one spectrum manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub sense_time: Duration,
    pub transmit_time: Duration,
    pub handoff_time: Duration,
    /// Longest wait in HANDOFF when no replacement channel is free
    pub max_backoff: Duration,
    /// Channel registered on `start()`
    pub initial_channel: ChannelId,
    pub switch_policy: SwitchPolicy,
    pub selection_policy: SelectionPolicy,
    /// End a transmission at the predicted PU arrival instead of running
    /// through it
    pub truncate_on_pu_arrival: bool,
    /// Seed for the fallback-probability draws
    pub seed: u64,
    /// Keep a log of every state transition
    pub record_transitions: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sense_time: DEFAULT_SENSE_TIME,
            transmit_time: DEFAULT_TRANSMIT_TIME,
            handoff_time: DEFAULT_HANDOFF_TIME,
            max_backoff: DEFAULT_MAX_BACKOFF,
            initial_channel: 0,
            switch_policy: SwitchPolicy::default(),
            selection_policy: SelectionPolicy::default(),
            truncate_on_pu_arrival: true,
            seed: 0,
            record_transitions: false,
        }
    }
}

impl ManagerConfig {
    pub fn with_timing(mut self, sense_time: Duration, transmit_time: Duration) -> Self {
        self.sense_time = sense_time;
        self.transmit_time = transmit_time;
        self
    }

    pub fn with_initial_channel(mut self, channel: ChannelId) -> Self {
        self.initial_channel = channel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sense_time.is_zero() {
            return Err(Error::InvalidConfig("sense_time must be positive".into()));
        }
        if self.transmit_time.is_zero() {
            return Err(Error::InvalidConfig("transmit_time must be positive".into()));
        }
        if self.max_backoff < self.handoff_time {
            return Err(Error::InvalidConfig(format!(
                "max_backoff {:?} shorter than handoff_time {:?}",
                self.max_backoff, self.handoff_time
            )));
        }
        Ok(())
    }
}
