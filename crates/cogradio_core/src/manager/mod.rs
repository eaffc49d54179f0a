//! Per-radio spectrum manager.
//!
//! Runs the sense → transmit / handoff → sense cycle for one secondary user.
//! Every phase ends in a callback scheduled with the external [`Scheduler`];
//! the manager itself never blocks.
//!
//! # Cancellation
//!
//! Scheduled callbacks hold a `Weak` reference to the manager and the epoch
//! of the phase they close. A callback whose manager has been dropped, or
//! whose phase was superseded by `stop()` or a direct call, does nothing.

mod config;
mod state;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, warn};

pub use config::{
    ManagerConfig, PhyBinding, DEFAULT_HANDOFF_TIME, DEFAULT_MAX_BACKOFF, DEFAULT_SENSE_TIME,
    DEFAULT_TRANSMIT_TIME,
};
pub use state::{ManagerState, ManagerStats, Transition};

use crate::decision::SpectrumDecision;
use crate::error::{Error, Result};
use crate::pu::SharedPuModel;
use crate::repository::SharedRepository;
use crate::scheduler::{EventId, Scheduler};
use crate::sensing::SpectrumSensing;
use crate::spectrum_data::SpectrumData;
use crate::time::SimTime;
use crate::types::{ChannelId, MacAddress, NodeId, Position};

/// Shared handle through which the scheduler reaches a manager
pub type ManagerHandle = Rc<RefCell<SpectrumManager>>;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Sense,
    Transmit,
    Handoff,
}

pub struct SpectrumManager {
    id: NodeId,
    mac: MacAddress,
    phy: Option<PhyBinding>,
    position: Position,
    config: ManagerConfig,

    state: ManagerState,
    current_channel: ChannelId,
    pending_channel: Option<ChannelId>,
    phase_started: SimTime,
    truncated: bool,

    repository: Option<SharedRepository>,
    sensing: Option<SpectrumSensing>,
    spectrum: Option<Rc<SpectrumData>>,
    fallback_probability: f64,
    decision: SpectrumDecision,
    rng: ChaCha20Rng,

    epoch: u64,
    pending_event: Option<EventId>,
    self_ref: Weak<RefCell<SpectrumManager>>,

    stats: ManagerStats,
    transitions: Vec<Transition>,
}

impl SpectrumManager {
    /// Minimal binding: MAC and node id, default timing, node at the origin
    pub fn new(mac: MacAddress, id: NodeId) -> Self {
        Self::with_config(mac, None, id, ManagerConfig::default())
    }

    /// Full binding: the PHY fixes the node position, and the sense and
    /// transmit durations drive the whole cycle
    pub fn with_phy(
        mac: MacAddress,
        phy: PhyBinding,
        id: NodeId,
        sense_time: Duration,
        transmit_time: Duration,
    ) -> Self {
        let config = ManagerConfig::default().with_timing(sense_time, transmit_time);
        Self::with_config(mac, Some(phy), id, config)
    }

    pub fn with_config(mac: MacAddress, phy: Option<PhyBinding>, id: NodeId, config: ManagerConfig) -> Self {
        let decision = SpectrumDecision::new(id, config.switch_policy, config.selection_policy);
        let rng = ChaCha20Rng::seed_from_u64(config.seed ^ u64::from(id));
        Self {
            id,
            mac,
            phy,
            position: phy.map(|p| p.position).unwrap_or(Position::ORIGIN),
            current_channel: config.initial_channel,
            config,
            state: ManagerState::Idle,
            pending_channel: None,
            phase_started: SimTime::ZERO,
            truncated: false,
            repository: None,
            sensing: None,
            spectrum: None,
            fallback_probability: 0.0,
            decision,
            rng,
            epoch: 0,
            pending_event: None,
            self_ref: Weak::new(),
            stats: ManagerStats::default(),
            transitions: Vec::new(),
        }
    }

    /// Wrap the manager so scheduled callbacks can reach it
    pub fn into_handle(self) -> ManagerHandle {
        Rc::new_cyclic(|weak| {
            let mut manager = self;
            manager.self_ref = weak.clone();
            RefCell::new(manager)
        })
    }

    // =========================================================================
    // Collaborator binding
    // =========================================================================

    pub fn set_repository(&mut self, repository: SharedRepository) {
        self.repository = Some(repository);
    }

    /// Bind the PU model. `prob` is the chance a sense reports the channel
    /// busy where the model has no spatial data for this node.
    pub fn set_pu_model(&mut self, prob: f64, model: SharedPuModel) -> Result<()> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(Error::InvalidConfig(format!(
                "fallback probability {} outside [0, 1]",
                prob
            )));
        }
        self.fallback_probability = prob;
        self.sensing = Some(SpectrumSensing::new(model));
        Ok(())
    }

    pub fn set_spectrum_data(&mut self, spectrum: Rc<SpectrumData>) {
        self.spectrum = Some(spectrum);
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn phy(&self) -> Option<&PhyBinding> {
        self.phy.as_ref()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn current_channel(&self) -> ChannelId {
        self.current_channel
    }

    /// Channel a handoff in progress will commit, `None` during a backoff
    pub fn pending_channel(&self) -> Option<ChannelId> {
        self.pending_channel
    }

    pub fn is_handoff_in_progress(&self) -> bool {
        self.state == ManagerState::Handoff
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// State changes seen so far (only with `record_transitions`)
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn decision(&self) -> &SpectrumDecision {
        &self.decision
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// IDLE → SENSING. Registers the initial channel and schedules the end of
    /// the first sensing period.
    pub fn start(&mut self, sched: &mut dyn Scheduler) -> Result<()> {
        if self.state != ManagerState::Idle {
            return Err(Error::AlreadyStarted(self.id));
        }
        self.config.validate()?;
        let repository = self.repository.clone().ok_or(Error::Unbound("repository"))?;
        if self.sensing.is_none() {
            return Err(Error::Unbound("PU model"));
        }
        if self.spectrum.is_none() {
            return Err(Error::Unbound("spectrum data"));
        }
        if self.self_ref.strong_count() == 0 {
            return Err(Error::Unbound("manager handle"));
        }

        let num_channels = repository.borrow().num_channels();
        if self.current_channel >= num_channels {
            return Err(Error::InvalidConfig(format!(
                "initial channel {} outside spectrum of {} channels",
                self.current_channel, num_channels
            )));
        }
        repository.borrow_mut().set_rx_channel(self.id, self.current_channel);

        let now = sched.now();
        info!(
            node = self.id,
            mac = %self.mac,
            channel = self.current_channel,
            x = self.position.x,
            y = self.position.y,
            "Spectrum manager started"
        );
        self.enter(now, ManagerState::Sensing);
        self.schedule_phase(sched, self.config.sense_time, Phase::Sense);
        Ok(())
    }

    /// Back to IDLE. Any pending phase callback becomes a no-op and an open
    /// transmission is closed in the repository.
    pub fn stop(&mut self, sched: &mut dyn Scheduler) {
        if let Some(id) = self.pending_event.take() {
            sched.cancel(id);
        }
        self.epoch += 1;
        let now = sched.now();
        if self.state == ManagerState::Transmitting {
            self.log_tx(now, false);
        }
        self.pending_channel = None;
        self.enter(now, ManagerState::Idle);
    }

    // =========================================================================
    // Phase callbacks
    // =========================================================================

    /// End of a sensing period: transmit if the channel is clear, otherwise
    /// hand off (or back off when no other channel is free).
    pub fn sense_ended(&mut self, sched: &mut dyn Scheduler) {
        if !self.expect_state(ManagerState::Sensing, "sense_ended") {
            return;
        }
        let now = sched.now();
        self.stats.senses += 1;

        let available = self.is_channel_available(now);
        self.decision.record_sense_result(!available);

        if available {
            self.begin_transmit(sched, now);
        } else {
            self.stats.busy_senses += 1;
            self.begin_handoff(sched, now);
        }
    }

    /// End of a transmission: close it in the repository and sense again
    pub fn transmit_ended(&mut self, sched: &mut dyn Scheduler) {
        if !self.expect_state(ManagerState::Transmitting, "transmit_ended") {
            return;
        }
        let now = sched.now();
        self.log_tx(now, false);

        self.stats.transmissions += 1;
        self.stats.airtime_secs += (now - self.phase_started).as_secs_f64();
        if self.truncated {
            self.stats.truncated_transmissions += 1;
            self.truncated = false;
        }

        self.enter(now, ManagerState::Sensing);
        self.schedule_phase(sched, self.config.sense_time, Phase::Sense);
    }

    /// End of a handoff: commit the chosen channel (if any) and sense again
    pub fn handoff_ended(&mut self, sched: &mut dyn Scheduler) {
        if !self.expect_state(ManagerState::Handoff, "handoff_ended") {
            return;
        }
        let now = sched.now();

        match self.pending_channel.take() {
            Some(channel) => {
                let from = self.current_channel;
                self.current_channel = channel;
                if let Some(repo) = &self.repository {
                    repo.borrow_mut().set_rx_channel(self.id, channel);
                }
                self.decision.reset();
                self.stats.handoffs += 1;
                info!(node = self.id, from, to = channel, now = %now, "Handoff complete");
            }
            None => {
                self.stats.backoffs += 1;
                debug!(node = self.id, channel = self.current_channel, now = %now, "Backoff over");
            }
        }

        self.enter(now, ManagerState::Sensing);
        self.schedule_phase(sched, self.config.sense_time, Phase::Sense);
    }

    // =========================================================================
    // Channel checks
    // =========================================================================

    /// Was the current channel free of PU activity over the sensing period
    /// that ends at `now`?
    ///
    /// Where the PU model has no data for this node, the channel is reported
    /// busy with the configured fallback probability.
    pub fn is_channel_available(&mut self, now: SimTime) -> bool {
        let Some(sensing) = &self.sensing else {
            return true;
        };
        let channel = self.current_channel;
        if sensing.has_coverage(&self.position, channel) {
            let window = now - self.phase_started;
            !sensing.get_sense_results(self.phase_started, window, &self.position, channel)
        } else {
            !self.rng.gen_bool(self.fallback_probability)
        }
    }

    /// Will a PU show up on the current channel within `tx_duration` of `now`?
    pub fn is_pu_interfering(&self, now: SimTime, tx_duration: Duration) -> bool {
        self.sensing.as_ref().is_some_and(|s| {
            s.get_sense_results(now, tx_duration, &self.position, self.current_channel)
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn expect_state(&self, expected: ManagerState, callback: &str) -> bool {
        if self.state == expected {
            true
        } else {
            warn!(
                node = self.id,
                state = %self.state,
                callback,
                "Ignoring callback outside its phase"
            );
            false
        }
    }

    fn enter(&mut self, now: SimTime, to: ManagerState) {
        let from = self.state;
        self.state = to;
        self.phase_started = now;
        debug!(node = self.id, from = %from, to = %to, channel = self.current_channel, now = %now, "state");
        if self.config.record_transitions {
            self.transitions.push(Transition {
                time: now,
                from,
                to,
                channel: self.current_channel,
            });
        }
    }

    fn log_tx(&self, now: SimTime, active: bool) {
        if let Some(repo) = &self.repository {
            if let Err(e) = repo
                .borrow_mut()
                .update_tx_channel(self.id, self.current_channel, now, active)
            {
                warn!(node = self.id, error = %e, "Transmit log rejected");
            }
        }
    }

    fn begin_transmit(&mut self, sched: &mut dyn Scheduler, now: SimTime) {
        let mut duration = self.config.transmit_time;
        self.truncated = false;

        if self.config.truncate_on_pu_arrival && self.is_pu_interfering(now, duration) {
            if let Some(sensing) = &self.sensing {
                let arrival = sensing
                    .pu_model()
                    .borrow()
                    .next_on_time(now, &self.position, self.current_channel);
                duration = duration.min(arrival - now);
                self.truncated = true;
                debug!(node = self.id, arrival = %arrival, "PU arrival predicted, truncating transmission");
            }
        }

        self.log_tx(now, true);
        self.enter(now, ManagerState::Transmitting);
        self.schedule_phase(sched, duration, Phase::Transmit);
    }

    fn begin_handoff(&mut self, sched: &mut dyn Scheduler, now: SimTime) {
        let target = if self.decision.decide_switch() {
            self.select_channel(now)
        } else {
            None
        };
        self.pending_channel = target;

        let delay = match target {
            Some(_) => self.config.handoff_time,
            None => self.backoff_delay(now),
        };
        if target.is_none() {
            debug!(
                node = self.id,
                channel = self.current_channel,
                backoff_ms = delay.as_millis() as u64,
                "No replacement channel, backing off"
            );
        }

        self.enter(now, ManagerState::Handoff);
        self.schedule_phase(sched, delay, Phase::Handoff);
    }

    fn select_channel(&mut self, now: SimTime) -> Option<ChannelId> {
        let (Some(sensing), Some(spectrum), Some(repo)) =
            (&self.sensing, &self.spectrum, &self.repository)
        else {
            return None;
        };
        let id = self.id;
        let pos = self.position;
        // A candidate must stay clear through the switch and one full cycle
        let lead = self.config.handoff_time + self.config.sense_time;
        let transmit = self.config.transmit_time;

        let repo = repo.borrow();
        self.decision
            .decide_spectrum(self.current_channel, spectrum, &repo, |ch| {
                sensing.get_sense_results_future(id, now, &pos, lead, transmit, ch)
            })
    }

    /// Wait for the current channel to clear, bounded by
    /// `[handoff_time, max_backoff]`
    fn backoff_delay(&self, now: SimTime) -> Duration {
        let floor = self.config.handoff_time;
        let ceiling = self.config.max_backoff.max(floor);
        let clear_at = match &self.sensing {
            Some(s) => s
                .pu_model()
                .borrow()
                .next_off_time(now, &self.position, self.current_channel),
            None => now,
        };
        (clear_at - now).clamp(floor, ceiling)
    }

    fn schedule_phase(&mut self, sched: &mut dyn Scheduler, delay: Duration, phase: Phase) {
        if let Some(id) = self.pending_event.take() {
            sched.cancel(id);
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let target = self.self_ref.clone();

        let id = sched.schedule(
            delay,
            Box::new(move |s: &mut dyn Scheduler| {
                let Some(manager) = target.upgrade() else {
                    return;
                };
                let mut manager = manager.borrow_mut();
                if manager.epoch != epoch {
                    return;
                }
                manager.pending_event = None;
                match phase {
                    Phase::Sense => manager.sense_ended(s),
                    Phase::Transmit => manager.transmit_ended(s),
                    Phase::Handoff => manager.handoff_ended(s),
                }
            }),
        );
        self.pending_event = Some(id);
    }
}

impl std::fmt::Debug for SpectrumManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumManager")
            .field("id", &self.id)
            .field("mac", &self.mac)
            .field("state", &self.state)
            .field("current_channel", &self.current_channel)
            .field("pending_channel", &self.pending_channel)
            .field("stats", &self.stats)
            .finish()
    }
}
