use std::fmt;

use serde::Serialize;

use crate::time::SimTime;
use crate::types::ChannelId;

/// Phase of the sense/transmit/handoff cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    /// Not started, or stopped
    #[default]
    Idle,
    /// Listening on the current channel for PU activity
    Sensing,
    /// Channel found clear, sending
    Transmitting,
    /// Moving to another channel, or backing off while none is free
    Handoff,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::Sensing => "sensing",
            ManagerState::Transmitting => "transmitting",
            ManagerState::Handoff => "handoff",
        };
        f.write_str(name)
    }
}

/// One recorded state change
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub time: SimTime,
    pub from: ManagerState,
    pub to: ManagerState,
    /// Current channel after the transition
    pub channel: ChannelId,
}

/// Per-manager counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManagerStats {
    /// Completed sensing periods
    pub senses: u64,
    /// Sensing periods that found the channel occupied
    pub busy_senses: u64,
    /// Completed transmissions
    pub transmissions: u64,
    /// Transmissions cut short by a predicted PU arrival
    pub truncated_transmissions: u64,
    /// Completed channel switches
    pub handoffs: u64,
    /// Handoff phases that ended without a new channel
    pub backoffs: u64,
    /// Total time spent transmitting (seconds)
    pub airtime_secs: f64,
}

impl ManagerStats {
    /// Fraction of sensing periods that found the channel busy
    pub fn busy_ratio(&self) -> f64 {
        if self.senses == 0 {
            0.0
        } else {
            self.busy_senses as f64 / self.senses as f64
        }
    }
}
