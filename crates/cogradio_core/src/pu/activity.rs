use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ChannelId, Position};

/// Shortest mean ON/OFF duration accepted, in seconds (one clock tick)
pub const MIN_MEAN_SECS: f64 = 1e-9;

/// One primary user: where it sits, which channels it holds and how often
/// it is on the air.
///
/// The PU alternates between OFF and ON periods. OFF periods have mean
/// `alpha` seconds, ON periods mean `beta` seconds. `alpha = 0` means the PU
/// never goes quiet, `beta = inf` means the first ON period never ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PuActivity {
    /// Lowest channel held by this PU
    pub main_channel: ChannelId,
    /// Additional data channels directly above `main_channel`
    #[serde(default)]
    pub number_data: usize,
    /// PU transmitter location
    #[serde(with = "crate::types::xy")]
    pub location: Position,
    /// PU receiver location
    #[serde(with = "crate::types::xy")]
    pub receiver_location: Position,
    /// Interference radius around transmitter and receiver (metres)
    pub radius: f64,
    /// Mean OFF duration (seconds)
    pub alpha: f64,
    /// Mean ON duration (seconds)
    pub beta: f64,
    /// Interference power, used to rank overlapping PUs
    #[serde(default)]
    pub interference: f64,
}

impl PuActivity {
    /// Channels occupied while ON
    pub fn channels(&self) -> RangeInclusive<ChannelId> {
        self.main_channel..=self.main_channel.saturating_add(self.number_data)
    }

    pub fn occupies(&self, channel: ChannelId) -> bool {
        self.channels().contains(&channel)
    }

    /// Distance from `pos` to the closer of transmitter and receiver
    pub fn distance_to(&self, pos: &Position) -> f64 {
        self.location
            .distance(pos)
            .min(self.receiver_location.distance(pos))
    }

    /// True if `pos` lies inside the interference footprint
    pub fn covers(&self, pos: &Position) -> bool {
        self.distance_to(pos) <= self.radius
    }

    /// Check ranges and channel span against a spectrum of `num_channels`.
    pub fn validate(&self, index: usize, num_channels: usize) -> Result<()> {
        let fail = |reason: String| Error::InvalidActivity { index, reason };

        let last = self
            .main_channel
            .checked_add(self.number_data)
            .ok_or_else(|| fail("channel range overflows".into()))?;
        if last >= num_channels {
            return Err(fail(format!(
                "channels {}..={} exceed spectrum width {}",
                self.main_channel, last, num_channels
            )));
        }

        for (name, p) in [("location", self.location), ("receiver_location", self.receiver_location)] {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(fail(format!("{} must be finite", name)));
            }
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(fail(format!("radius {} must be finite and >= 0", self.radius)));
        }
        if self.alpha.is_nan() || self.alpha < 0.0 || (self.alpha > 0.0 && self.alpha < MIN_MEAN_SECS) {
            return Err(fail(format!("alpha {} must be 0 or >= {}", self.alpha, MIN_MEAN_SECS)));
        }
        if self.beta.is_nan() || self.beta < MIN_MEAN_SECS {
            return Err(fail(format!("beta {} must be >= {}", self.beta, MIN_MEAN_SECS)));
        }
        if !self.interference.is_finite() {
            return Err(fail("interference must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample() -> PuActivity {
        PuActivity {
            main_channel: 2,
            number_data: 1,
            location: Position::new(0.0, 0.0),
            receiver_location: Position::new(100.0, 0.0),
            radius: 30.0,
            alpha: 2.0,
            beta: 1.0,
            interference: 10.0,
        }
    }

    #[test]
    fn test_channel_range() {
        let a = sample();
        assert!(!a.occupies(1));
        assert!(a.occupies(2));
        assert!(a.occupies(3));
        assert!(!a.occupies(4));
    }

    #[test]
    fn test_footprint_covers_both_ends() {
        let a = sample();
        assert!(a.covers(&Position::new(20.0, 0.0)));
        assert!(a.covers(&Position::new(80.0, 10.0)));
        assert!(!a.covers(&Position::new(50.0, 0.0)));
    }

    #[test]
    fn test_validate_rejects_bad_records() {
        assert!(sample().validate(0, 4).is_ok());
        assert!(sample().validate(0, 3).is_err());

        let mut a = sample();
        a.beta = 0.0;
        assert!(matches!(a.validate(7, 8), Err(Error::InvalidActivity { index: 7, .. })));

        let mut a = sample();
        a.alpha = -1.0;
        assert!(a.validate(0, 8).is_err());

        let mut a = sample();
        a.radius = f64::NAN;
        assert!(a.validate(0, 8).is_err());
    }

    #[test]
    fn test_validate_accepts_permanent_pu() {
        let mut a = sample();
        a.alpha = 0.0;
        a.beta = f64::INFINITY;
        assert!(a.validate(0, 8).is_ok());
    }
}
