//! Scenario assembly.
//!
//! A scenario is one simulated run: a shared repository, the PU model, the
//! channel table, one spectrum manager per node and the event queue driving
//! them. It is described by a TOML document:
//!
//! ```toml
//! [scenario]
//! num_channels = 8
//! seed = 42
//! duration_secs = 60.0
//! pu_map = "pu_map.toml"
//!
//! [timing]
//! sense = 0.1
//! transmit = 0.2
//!
//! [decision]
//! selection = "least_contended"
//!
//! [[node]]
//! id = 1
//! position = [120.0, 40.0]
//! initial_channel = 3
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decision::{SelectionPolicy, SwitchPolicy};
use crate::error::{Error, Result};
use crate::manager::{
    ManagerConfig, ManagerHandle, ManagerState, ManagerStats, PhyBinding, SpectrumManager,
    DEFAULT_HANDOFF_TIME, DEFAULT_MAX_BACKOFF, DEFAULT_SENSE_TIME, DEFAULT_TRANSMIT_TIME,
};
use crate::pu::{OverlapPolicy, PuActivity, PuModel, SharedPuModel, DEFAULT_PU_SEED};
use crate::repository::{Repository, SharedRepository};
use crate::scheduler::{EventQueue, Scheduler};
use crate::spectrum_data::{ChannelRow, SpectrumData, SpectrumEntry};
use crate::time::SimTime;
use crate::types::{ChannelId, MacAddress, NodeId, Position};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSection {
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_duration")]
    pub duration_secs: f64,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    /// Chance a sense reports busy where the PU model has no data
    #[serde(default)]
    pub fallback_probability: f64,
    /// PU map file, relative to the scenario file
    #[serde(default)]
    pub pu_map: Option<PathBuf>,
    /// Spectrum data file, relative to the scenario file
    #[serde(default)]
    pub spectrum: Option<PathBuf>,
    #[serde(default)]
    pub record_transitions: bool,
}

impl Default for ScenarioSection {
    fn default() -> Self {
        Self {
            num_channels: default_num_channels(),
            seed: default_seed(),
            duration_secs: default_duration(),
            overlap_policy: OverlapPolicy::default(),
            fallback_probability: 0.0,
            pu_map: None,
            spectrum: None,
            record_transitions: false,
        }
    }
}

fn default_num_channels() -> usize {
    8
}
fn default_seed() -> u64 {
    DEFAULT_PU_SEED
}
fn default_duration() -> f64 {
    60.0
}

/// Phase durations, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingSection {
    #[serde(default = "default_sense")]
    pub sense: f64,
    #[serde(default = "default_transmit")]
    pub transmit: f64,
    #[serde(default = "default_handoff")]
    pub handoff: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: f64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            sense: default_sense(),
            transmit: default_transmit(),
            handoff: default_handoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_sense() -> f64 {
    DEFAULT_SENSE_TIME.as_secs_f64()
}
fn default_transmit() -> f64 {
    DEFAULT_TRANSMIT_TIME.as_secs_f64()
}
fn default_handoff() -> f64 {
    DEFAULT_HANDOFF_TIME.as_secs_f64()
}
fn default_max_backoff() -> f64 {
    DEFAULT_MAX_BACKOFF.as_secs_f64()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionSection {
    #[serde(default)]
    pub switch: SwitchPolicy,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default = "default_truncate")]
    pub truncate_on_pu_arrival: bool,
}

impl Default for DecisionSection {
    fn default() -> Self {
        Self {
            switch: SwitchPolicy::default(),
            selection: SelectionPolicy::default(),
            truncate_on_pu_arrival: default_truncate(),
        }
    }
}

fn default_truncate() -> bool {
    true
}

/// One secondary-user radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default, with = "crate::types::xy")]
    pub position: Position,
    #[serde(default)]
    pub initial_channel: ChannelId,
}

impl NodeSpec {
    pub fn new(id: NodeId, position: Position, initial_channel: ChannelId) -> Self {
        Self {
            id,
            position,
            initial_channel,
        }
    }
}

/// Parsed scenario file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub scenario: ScenarioSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub decision: DecisionSection,
    /// Inline channel table, overrides `scenario.spectrum`
    #[serde(default)]
    pub channel: Vec<ChannelRow>,
    /// Inline PU records, used when no `pu_map` file is given
    #[serde(default)]
    pub activity: Vec<PuActivity>,
    #[serde(default)]
    pub node: Vec<NodeSpec>,
}

impl ScenarioConfig {
    /// Parse a scenario file. Relative `pu_map` and `spectrum` paths are
    /// resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text, path)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn resolve_paths(&mut self, dir: &Path) {
        for p in [&mut self.scenario.pu_map, &mut self.scenario.spectrum]
            .into_iter()
            .flatten()
        {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
    }

    /// Timing and policy knobs shared by every node
    pub fn manager_config(&self) -> Result<ManagerConfig> {
        let config = ManagerConfig {
            sense_time: secs("timing.sense", self.timing.sense)?,
            transmit_time: secs("timing.transmit", self.timing.transmit)?,
            handoff_time: secs("timing.handoff", self.timing.handoff)?,
            max_backoff: secs("timing.max_backoff", self.timing.max_backoff)?,
            initial_channel: 0,
            switch_policy: self.decision.switch,
            selection_policy: self.decision.selection,
            truncate_on_pu_arrival: self.decision.truncate_on_pu_arrival,
            seed: self.scenario.seed,
            record_transitions: self.scenario.record_transitions,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn horizon(&self) -> Result<SimTime> {
        let d = secs("scenario.duration_secs", self.scenario.duration_secs)?;
        Ok(SimTime::ZERO + d)
    }
}

fn secs(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::InvalidConfig(format!("{} = {} is not a valid duration", key, value)))
}

// =============================================================================
// Run
// =============================================================================

/// Outcome of one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub mac: String,
    pub channel: ChannelId,
    pub state: ManagerState,
    #[serde(flatten)]
    pub stats: ManagerStats,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub simulated_secs: f64,
    pub events: u64,
    pub pu_records: usize,
    pub nodes: Vec<NodeReport>,
}

impl ScenarioReport {
    /// Pretty-printed JSON summary
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("cannot serialize report: {}", e)))
    }

    /// Counters summed over every node
    pub fn total(&self) -> ManagerStats {
        self.nodes.iter().fold(ManagerStats::default(), |mut acc, n| {
            acc.senses += n.stats.senses;
            acc.busy_senses += n.stats.busy_senses;
            acc.transmissions += n.stats.transmissions;
            acc.truncated_transmissions += n.stats.truncated_transmissions;
            acc.handoffs += n.stats.handoffs;
            acc.backoffs += n.stats.backoffs;
            acc.airtime_secs += n.stats.airtime_secs;
            acc
        })
    }
}

pub struct Scenario {
    horizon: SimTime,
    queue: EventQueue,
    repository: SharedRepository,
    pu_model: SharedPuModel,
    spectrum: Rc<SpectrumData>,
    managers: Vec<ManagerHandle>,
    started: bool,
}

impl Scenario {
    /// Build every component described by `config`. Nothing runs until
    /// [`Scenario::start`] or [`Scenario::run`].
    pub fn new(config: &ScenarioConfig) -> Result<Self> {
        let section = &config.scenario;
        let num_channels = section.num_channels;
        if num_channels == 0 {
            return Err(Error::InvalidConfig("num_channels must be at least 1".into()));
        }
        let horizon = config.horizon()?;
        let base = config.manager_config()?;

        let spectrum = if !config.channel.is_empty() {
            SpectrumData::from_rows(&config.channel)?
        } else if let Some(path) = &section.spectrum {
            SpectrumData::load(path)?
        } else {
            SpectrumData::uniform(num_channels, SpectrumEntry::default())
        };
        if spectrum.is_empty() || spectrum.width() > num_channels {
            return Err(Error::InvalidConfig(format!(
                "channel table covers {} channels, spectrum has {}",
                spectrum.width(),
                num_channels
            )));
        }

        let mut pu_model = PuModel::new(num_channels)
            .with_seed(section.seed)
            .with_overlap_policy(section.overlap_policy);
        match (&section.pu_map, config.activity.is_empty()) {
            (Some(_), false) => {
                return Err(Error::InvalidConfig(
                    "give either scenario.pu_map or inline [[activity]] records, not both".into(),
                ))
            }
            (Some(path), true) => {
                pu_model.set_pu_map_file(path)?;
            }
            (None, _) => pu_model.set_activities(config.activity.clone())?,
        }

        if config.node.is_empty() {
            return Err(Error::InvalidConfig("scenario has no [[node]] entries".into()));
        }
        let mut seen = HashSet::new();
        for node in &config.node {
            if !seen.insert(node.id) {
                return Err(Error::InvalidConfig(format!("node {} listed twice", node.id)));
            }
            if node.initial_channel >= num_channels {
                return Err(Error::InvalidConfig(format!(
                    "node {}: initial channel {} outside spectrum of {} channels",
                    node.id, node.initial_channel, num_channels
                )));
            }
        }

        let repository = Repository::new(num_channels).into_shared();
        let pu_model = pu_model.into_shared();
        let spectrum = Rc::new(spectrum);

        let mut managers = Vec::with_capacity(config.node.len());
        for node in &config.node {
            let mut manager = SpectrumManager::with_config(
                MacAddress::from_node_id(node.id),
                Some(PhyBinding::at(node.position)),
                node.id,
                base.clone().with_initial_channel(node.initial_channel),
            );
            manager.set_repository(repository.clone());
            manager.set_pu_model(section.fallback_probability, pu_model.clone())?;
            manager.set_spectrum_data(spectrum.clone());
            managers.push(manager.into_handle());
        }

        info!(
            channels = num_channels,
            nodes = managers.len(),
            pu_records = pu_model.borrow().len(),
            horizon = %horizon,
            "Scenario built"
        );

        Ok(Self {
            horizon,
            queue: EventQueue::new(),
            repository,
            pu_model,
            spectrum,
            managers,
            started: false,
        })
    }

    /// Start every manager at the current simulated time
    pub fn start(&mut self) -> Result<()> {
        for manager in &self.managers {
            manager.borrow_mut().start(&mut self.queue)?;
        }
        self.started = true;
        Ok(())
    }

    /// Advance the simulation to `horizon`. Returns the number of callbacks
    /// executed.
    pub fn run_until(&mut self, horizon: SimTime) -> u64 {
        self.queue.run_until(horizon)
    }

    /// Start if needed, run to the configured duration and report
    pub fn run(&mut self) -> Result<ScenarioReport> {
        if !self.started {
            self.start()?;
        }
        let events = self.run_until(self.horizon);
        info!(events, now = %self.queue.now(), "Scenario finished");
        Ok(self.report())
    }

    pub fn report(&self) -> ScenarioReport {
        let nodes = self
            .managers
            .iter()
            .map(|handle| {
                let m = handle.borrow();
                NodeReport {
                    id: m.id(),
                    mac: m.mac().to_string(),
                    channel: m.current_channel(),
                    state: m.state(),
                    stats: m.stats().clone(),
                }
            })
            .collect();
        ScenarioReport {
            simulated_secs: self.queue.now().as_secs_f64(),
            events: self.queue.executed(),
            pu_records: self.pu_model.borrow().len(),
            nodes,
        }
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn horizon(&self) -> SimTime {
        self.horizon
    }

    pub fn managers(&self) -> &[ManagerHandle] {
        &self.managers
    }

    pub fn manager(&self, id: NodeId) -> Option<&ManagerHandle> {
        self.managers.iter().find(|m| m.borrow().id() == id)
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repository
    }

    pub fn pu_model(&self) -> &SharedPuModel {
        &self.pu_model
    }

    pub fn spectrum(&self) -> &Rc<SpectrumData> {
        &self.spectrum
    }

    pub fn queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queue
    }
}
