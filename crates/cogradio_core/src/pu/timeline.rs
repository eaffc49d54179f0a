//! Lazily generated ON/OFF renewal process for a single primary user.
//!
//! The process starts OFF at `t = 0`. `boundaries` holds every state change
//! in order: even indices end an OFF period, odd indices end an ON period.
//! The state at `t` is ON iff an odd number of boundaries are `<= t`, so ON
//! periods are half-open `[start, end)`. Zero-length periods are merged into
//! their neighbours so a reported boundary is always a real flip.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::time::SimTime;

#[derive(Debug, Clone)]
pub(crate) struct OnOffTimeline {
    mean_off: f64,
    mean_on: f64,
    rng: ChaCha20Rng,
    boundaries: Vec<SimTime>,
    /// End of the most recently drawn period
    cursor: SimTime,
}

impl OnOffTimeline {
    pub(crate) fn new(mean_off: f64, mean_on: f64, seed: u64) -> Self {
        Self {
            mean_off,
            mean_on,
            rng: ChaCha20Rng::seed_from_u64(seed),
            boundaries: Vec::new(),
            cursor: SimTime::ZERO,
        }
    }

    fn draw(&mut self, mean: f64) -> SimTime {
        if mean <= 0.0 {
            return SimTime::ZERO;
        }
        if mean.is_infinite() {
            return SimTime::MAX;
        }
        let u: f64 = self.rng.gen();
        SimTime::from_secs_f64(-mean * (1.0 - u).ln())
    }

    /// Draw periods until some boundary lies strictly after `t`.
    fn extend_past(&mut self, t: SimTime) {
        while self.cursor <= t && !self.cursor.is_never() {
            let mean = if self.boundaries.len() % 2 == 0 {
                self.mean_off
            } else {
                self.mean_on
            };
            let d = self.draw(mean);
            let end = SimTime::from_nanos(self.cursor.as_nanos().saturating_add(d.as_nanos()));

            if end == self.cursor && self.boundaries.last() == Some(&end) {
                self.boundaries.pop();
            } else {
                self.boundaries.push(end);
            }
            self.cursor = end;
        }
    }

    fn index_at(&mut self, t: SimTime) -> usize {
        self.extend_past(t);
        self.boundaries.partition_point(|b| *b <= t)
    }

    fn next_boundary(&mut self, t: SimTime) -> SimTime {
        let k = self.index_at(t);
        self.boundaries.get(k).copied().unwrap_or(SimTime::MAX)
    }

    pub(crate) fn is_on(&mut self, t: SimTime) -> bool {
        self.index_at(t) % 2 == 1
    }

    /// End of the ON period containing `t`, or `t` itself when OFF
    pub(crate) fn next_off(&mut self, t: SimTime) -> SimTime {
        if self.is_on(t) {
            self.next_boundary(t)
        } else {
            t
        }
    }

    /// Start of the next ON period, `t` itself when already ON
    pub(crate) fn next_on(&mut self, t: SimTime) -> SimTime {
        if self.is_on(t) {
            t
        } else {
            self.next_boundary(t)
        }
    }

    /// ON at any instant of the closed window `[t, t + window]`
    pub(crate) fn active_within(&mut self, t: SimTime, window: std::time::Duration) -> bool {
        let on = self.next_on(t);
        !on.is_never() && on <= t + window
    }

    #[cfg(test)]
    pub(crate) fn boundaries(&self) -> &[SimTime] {
        &self.boundaries
    }
}
