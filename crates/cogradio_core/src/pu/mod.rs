//! Primary-user activity model.
//!
//! The ground truth every sensing decision is checked against. A `PuModel`
//! holds the PU records loaded from a map file together with one ON/OFF
//! timeline per record. Queries resolve a `(position, channel)` pair to the
//! records whose footprint covers it and evaluate their timelines.
//!
//! Timelines are generated on demand from a per-record seed, so the answer
//! for a given instant does not depend on the order of earlier queries.

pub mod activity;
pub mod map_file;
mod timeline;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use activity::PuActivity;

use crate::error::{Error, Result};
use crate::time::SimTime;
use crate::types::{ChannelId, Position};
use timeline::OnOffTimeline;

/// Shared handle held by every spectrum manager of a scenario
pub type SharedPuModel = Rc<RefCell<PuModel>>;

/// Default seed for PU timelines
pub const DEFAULT_PU_SEED: u64 = 0x5EED_0F_F0_0D;

/// Golden-ratio increment spreading record indices over the seed space
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// How to answer when several PU footprints cover the same point and channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The PU closest to the point decides
    #[default]
    Nearest,
    /// The PU with the highest interference power decides (ties: nearest)
    Strongest,
    /// Busy whenever any covering PU is ON
    Any,
}

#[derive(Debug)]
enum Resolved {
    Nothing,
    One(usize),
    All(Vec<usize>),
}

/// Ground-truth PU oracle
#[derive(Debug)]
pub struct PuModel {
    num_channels: usize,
    seed: u64,
    policy: OverlapPolicy,
    activities: Vec<PuActivity>,
    timelines: RefCell<Vec<OnOffTimeline>>,
    source: Option<PathBuf>,
}

impl PuModel {
    /// Empty model over `num_channels` channels. Every channel is free.
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            seed: DEFAULT_PU_SEED,
            policy: OverlapPolicy::default(),
            activities: Vec::new(),
            timelines: RefCell::new(Vec::new()),
            source: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rebuild_timelines();
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn into_shared(self) -> SharedPuModel {
        Rc::new(RefCell::new(self))
    }

    pub fn set_overlap_policy(&mut self, policy: OverlapPolicy) {
        self.policy = policy;
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.policy
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn activities(&self) -> &[PuActivity] {
        &self.activities
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Path of the last successfully loaded map file
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Replace the loaded records. On error the previous set is kept.
    pub fn set_activities(&mut self, activities: Vec<PuActivity>) -> Result<()> {
        for (i, a) in activities.iter().enumerate() {
            a.validate(i, self.num_channels)?;
        }
        self.activities = activities;
        self.source = None;
        self.rebuild_timelines();
        Ok(())
    }

    /// Load a PU map file, replacing any previously loaded records.
    ///
    /// Parsing and validation complete before anything is replaced, so a
    /// malformed file leaves the model untouched.
    pub fn set_pu_map_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let activities = map_file::read(path)?;
        self.set_activities(activities)?;
        self.source = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            records = self.activities.len(),
            "Loaded PU map"
        );
        Ok(self.activities.len())
    }

    /// Serialize the loaded records in map-file format
    pub fn to_map_string(&self) -> Result<String> {
        map_file::render(&self.activities)
    }

    pub fn write_pu_map_file(&self, path: impl AsRef<Path>) -> Result<()> {
        map_file::write(path.as_ref(), &self.activities)
    }

    fn rebuild_timelines(&mut self) {
        let timelines = self
            .activities
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let seed = self.seed ^ (i as u64 + 1).wrapping_mul(SEED_STRIDE);
                OnOffTimeline::new(a.alpha, a.beta, seed)
            })
            .collect();
        *self.timelines.get_mut() = timelines;
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn check_channel(&self, channel: ChannelId) {
        assert!(
            channel < self.num_channels,
            "channel {} outside spectrum of {} channels",
            channel,
            self.num_channels
        );
    }

    /// True if some PU footprint covers `pos` on `channel`
    pub fn covers(&self, pos: &Position, channel: ChannelId) -> bool {
        self.check_channel(channel);
        self.activities
            .iter()
            .any(|a| a.occupies(channel) && a.covers(pos))
    }

    fn resolve(&self, pos: &Position, channel: ChannelId) -> Resolved {
        self.check_channel(channel);
        let covering = self
            .activities
            .iter()
            .enumerate()
            .filter(|(_, a)| a.occupies(channel) && a.covers(pos))
            .map(|(i, a)| (i, a.distance_to(pos), a.interference));

        match self.policy {
            OverlapPolicy::Nearest => covering
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(Resolved::Nothing, |(i, _, _)| Resolved::One(i)),
            OverlapPolicy::Strongest => covering
                .max_by(|a, b| a.2.total_cmp(&b.2).then(b.1.total_cmp(&a.1)))
                .map_or(Resolved::Nothing, |(i, _, _)| Resolved::One(i)),
            OverlapPolicy::Any => {
                let all: Vec<usize> = covering.map(|(i, _, _)| i).collect();
                if all.is_empty() {
                    Resolved::Nothing
                } else {
                    Resolved::All(all)
                }
            }
        }
    }

    /// Is a PU covering `pos` ON at any instant of `[now, now + window]`?
    ///
    /// `window = 0` asks about `now` alone. A point no PU covers is free.
    pub fn is_pu_active(
        &self,
        now: SimTime,
        window: Duration,
        pos: &Position,
        channel: ChannelId,
    ) -> bool {
        let mut timelines = self.timelines.borrow_mut();
        let active = match self.resolve(pos, channel) {
            Resolved::Nothing => false,
            Resolved::One(i) => timelines[i].active_within(now, window),
            Resolved::All(all) => all.iter().any(|&i| timelines[i].active_within(now, window)),
        };
        debug!(now = %now, channel, x = pos.x, y = pos.y, active, "PU query");
        active
    }

    /// Location-free check: is any PU holding `channel` ON within the window?
    pub fn check_active(&self, now: SimTime, window: Duration, channel: ChannelId) -> bool {
        self.check_channel(channel);
        let mut timelines = self.timelines.borrow_mut();
        self.activities
            .iter()
            .enumerate()
            .filter(|(_, a)| a.occupies(channel))
            .any(|(i, _)| timelines[i].active_within(now, window))
    }

    /// When the PU activity seen at `pos` on `channel` next stops.
    ///
    /// Returns `now` when nothing is active there and `SimTime::MAX` when the
    /// current ON period never ends.
    pub fn next_off_time(&self, now: SimTime, pos: &Position, channel: ChannelId) -> SimTime {
        let mut timelines = self.timelines.borrow_mut();
        match self.resolve(pos, channel) {
            Resolved::Nothing => now,
            Resolved::One(i) => timelines[i].next_off(now),
            Resolved::All(all) => {
                // Advance until every covering PU is OFF at the same instant
                let mut t = now;
                loop {
                    let latest = all
                        .iter()
                        .map(|&i| timelines[i].next_off(t))
                        .max()
                        .unwrap_or(t);
                    if latest == t || latest.is_never() {
                        return latest;
                    }
                    t = latest;
                }
            }
        }
    }

    /// When PU activity at `pos` on `channel` next starts (`now` if ON)
    pub fn next_on_time(&self, now: SimTime, pos: &Position, channel: ChannelId) -> SimTime {
        let mut timelines = self.timelines.borrow_mut();
        match self.resolve(pos, channel) {
            Resolved::Nothing => SimTime::MAX,
            Resolved::One(i) => timelines[i].next_on(now),
            Resolved::All(all) => all
                .iter()
                .map(|&i| timelines[i].next_on(now))
                .min()
                .unwrap_or(SimTime::MAX),
        }
    }
}

// =============================================================================
// Random map generation
// =============================================================================

/// Parameters for synthesizing a PU map
#[derive(Debug, Clone)]
pub struct MapGenerator {
    pub count: usize,
    pub num_channels: usize,
    /// Side of the square deployment area (metres)
    pub area: f64,
    /// Maximum number of extra data channels per PU
    pub max_data_channels: usize,
    /// Radius range (metres)
    pub radius: (f64, f64),
    /// Mean OFF range (seconds)
    pub alpha: (f64, f64),
    /// Mean ON range (seconds)
    pub beta: (f64, f64),
    /// Maximum transmitter to receiver distance (metres)
    pub link_length: f64,
}

impl Default for MapGenerator {
    fn default() -> Self {
        Self {
            count: 10,
            num_channels: 11,
            area: 1000.0,
            max_data_channels: 1,
            radius: (100.0, 300.0),
            alpha: (0.5, 5.0),
            beta: (0.5, 5.0),
            link_length: 100.0,
        }
    }
}

impl MapGenerator {
    /// Draw `count` records. Every record passes [`PuActivity::validate`].
    pub fn generate(&self, seed: u64) -> Result<Vec<PuActivity>> {
        if self.num_channels == 0 {
            return Err(Error::InvalidConfig("map needs at least one channel".into()));
        }
        if !(self.area.is_finite() && self.area > 0.0) {
            return Err(Error::InvalidConfig(format!("area {} must be positive", self.area)));
        }
        if !(self.link_length.is_finite() && self.link_length >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "link length {} must be non-negative",
                self.link_length
            )));
        }
        for (name, (lo, _)) in [("radius", self.radius), ("alpha", self.alpha), ("beta", self.beta)] {
            if !(lo.is_finite() && lo > 0.0) {
                return Err(Error::InvalidConfig(format!("{} range must start above zero", name)));
            }
        }

        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let range = |rng: &mut ChaCha20Rng, (lo, hi): (f64, f64)| {
            if hi > lo {
                rng.gen_range(lo..hi)
            } else {
                lo
            }
        };

        let activities = (0..self.count)
            .map(|_| {
                let number_data = rng.gen_range(0..=self.max_data_channels.min(self.num_channels - 1));
                let main_channel = rng.gen_range(0..self.num_channels - number_data);
                let tx = Position::new(rng.gen_range(0.0..self.area), rng.gen_range(0.0..self.area));
                let heading = rng.gen_range(0.0..std::f64::consts::TAU);
                let len = rng.gen_range(0.0..=self.link_length);
                let rx = Position::new(
                    (tx.x + len * heading.cos()).clamp(0.0, self.area),
                    (tx.y + len * heading.sin()).clamp(0.0, self.area),
                );
                PuActivity {
                    main_channel,
                    number_data,
                    location: tx,
                    receiver_location: rx,
                    radius: range(&mut rng, self.radius),
                    alpha: range(&mut rng, self.alpha),
                    beta: range(&mut rng, self.beta),
                    interference: rng.gen_range(0.1..10.0),
                }
            })
            .collect();
        Ok(activities)
    }
}
