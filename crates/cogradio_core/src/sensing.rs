//! Sensing outcome prediction.
//!
//! Thin, side-effect free view over the PU model: "would a PU show up on this
//! channel while I sense and then transmit?"

use std::time::Duration;

use tracing::debug;

use crate::pu::SharedPuModel;
use crate::time::SimTime;
use crate::types::{ChannelId, NodeId, Position};

#[derive(Debug, Clone)]
pub struct SpectrumSensing {
    pu_model: SharedPuModel,
}

impl SpectrumSensing {
    pub fn new(pu_model: SharedPuModel) -> Self {
        Self { pu_model }
    }

    pub fn pu_model(&self) -> &SharedPuModel {
        &self.pu_model
    }

    /// Predict whether PU activity overlaps
    /// `[now, now + sense_time + transmit_time]` on `channel` at `pos`.
    pub fn get_sense_results_future(
        &self,
        id: NodeId,
        now: SimTime,
        pos: &Position,
        sense_time: Duration,
        transmit_time: Duration,
        channel: ChannelId,
    ) -> bool {
        let window = sense_time.saturating_add(transmit_time);
        let busy = self
            .pu_model
            .borrow()
            .is_pu_active(now, window, pos, channel);
        debug!(node = id, channel, now = %now, window_ms = window.as_millis() as u64, busy, "sense prediction");
        busy
    }

    /// Outcome of a sensing period that started at `started` and lasted `window`
    pub fn get_sense_results(
        &self,
        started: SimTime,
        window: Duration,
        pos: &Position,
        channel: ChannelId,
    ) -> bool {
        self.pu_model
            .borrow()
            .is_pu_active(started, window, pos, channel)
    }

    /// True if the PU model has spatial data for `pos` on `channel`
    pub fn has_coverage(&self, pos: &Position, channel: ChannelId) -> bool {
        self.pu_model.borrow().covers(pos, channel)
    }
}
