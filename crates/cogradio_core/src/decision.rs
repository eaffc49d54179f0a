//! Spectrum decision policies.
//!
//! Two independent questions, each answered by a policy picked at
//! configuration time:
//!
//! - **Switch**: given recent sensing results, should the radio leave its
//!   channel? ([`SwitchPolicy`])
//! - **Select**: which channel should it move to? ([`SelectionPolicy`])
//!
//! Selection never returns the channel being left and returns `None` when
//! every other channel is occupied.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::repository::Repository;
use crate::spectrum_data::SpectrumData;
use crate::types::{ChannelId, NodeId};

/// When to abandon the current channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    /// Leave as soon as the latest sense reports the channel occupied
    #[default]
    OnOccupied,
    /// Leave after this many consecutive busy senses
    AfterConsecutiveBusy(u32),
}

/// How to rank replacement channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Lowest packet error rate, then least contended, then lowest id
    #[default]
    LowestPer,
    /// Next free channel after the last one picked
    RoundRobin,
    /// Fewest other transmitters and listeners, then lowest PER
    LeastContended,
}

#[derive(Debug, Clone)]
pub struct SpectrumDecision {
    node: NodeId,
    switch_policy: SwitchPolicy,
    selection_policy: SelectionPolicy,
    consecutive_busy: u32,
    last_busy: bool,
    rr_cursor: Option<ChannelId>,
}

impl SpectrumDecision {
    pub fn new(node: NodeId, switch_policy: SwitchPolicy, selection_policy: SelectionPolicy) -> Self {
        Self {
            node,
            switch_policy,
            selection_policy,
            consecutive_busy: 0,
            last_busy: false,
            rr_cursor: None,
        }
    }

    pub fn switch_policy(&self) -> SwitchPolicy {
        self.switch_policy
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        self.selection_policy
    }

    pub fn consecutive_busy(&self) -> u32 {
        self.consecutive_busy
    }

    /// Feed the outcome of a sensing period
    pub fn record_sense_result(&mut self, busy: bool) {
        self.last_busy = busy;
        if busy {
            self.consecutive_busy = self.consecutive_busy.saturating_add(1);
        } else {
            self.consecutive_busy = 0;
        }
    }

    /// Forget busy streaks, e.g. after moving to a new channel
    pub fn reset(&mut self) {
        self.consecutive_busy = 0;
        self.last_busy = false;
    }

    /// Should the radio leave its current channel?
    pub fn decide_switch(&self) -> bool {
        match self.switch_policy {
            SwitchPolicy::OnOccupied => self.last_busy,
            SwitchPolicy::AfterConsecutiveBusy(n) => self.last_busy && self.consecutive_busy >= n.max(1),
        }
    }

    /// Pick a replacement for `current`.
    ///
    /// `occupied` reports whether a candidate is predicted to carry PU
    /// activity; such channels are never chosen. Returns `None` when no
    /// configured channel other than `current` is free.
    pub fn decide_spectrum<F>(
        &mut self,
        current: ChannelId,
        spectrum: &SpectrumData,
        repository: &Repository,
        occupied: F,
    ) -> Option<ChannelId>
    where
        F: Fn(ChannelId) -> bool,
    {
        let candidates: Vec<ChannelId> = spectrum
            .channels()
            .filter(|&ch| ch != current && !occupied(ch))
            .collect();

        let contention = |ch: ChannelId| {
            repository.active_transmitters(ch, Some(self.node))
                + repository
                    .rx_nodes_on(ch)
                    .iter()
                    .filter(|&&n| n != self.node)
                    .count()
        };
        let per = |ch: ChannelId| {
            spectrum
                .get_spectrum_data(ch)
                .map(|e| e.per)
                .unwrap_or(1.0)
        };

        let choice = match self.selection_policy {
            SelectionPolicy::LowestPer => candidates.iter().copied().min_by(|&a, &b| {
                per(a)
                    .total_cmp(&per(b))
                    .then(contention(a).cmp(&contention(b)))
                    .then(a.cmp(&b))
            }),
            SelectionPolicy::LeastContended => candidates.iter().copied().min_by(|&a, &b| {
                contention(a)
                    .cmp(&contention(b))
                    .then(per(a).total_cmp(&per(b)))
                    .then(a.cmp(&b))
            }),
            SelectionPolicy::RoundRobin => {
                let after = self.rr_cursor.unwrap_or(current);
                candidates
                    .iter()
                    .copied()
                    .find(|&ch| ch > after)
                    .or_else(|| candidates.first().copied())
            }
        };

        if let Some(ch) = choice {
            self.rr_cursor = Some(ch);
        }
        debug!(
            node = self.node,
            current,
            candidates = candidates.len(),
            choice = ?choice,
            "spectrum decision"
        );
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum_data::ChannelRow;
    use crate::time::SimTime;

    fn spectrum() -> SpectrumData {
        SpectrumData::from_rows(&[
            ChannelRow { id: 0, bandwidth: 1e6, per: 0.30 },
            ChannelRow { id: 1, bandwidth: 1e6, per: 0.10 },
            ChannelRow { id: 2, bandwidth: 1e6, per: 0.05 },
            ChannelRow { id: 3, bandwidth: 1e6, per: 0.20 },
        ])
        .unwrap()
    }

    #[test]
    fn test_on_occupied_switch() {
        let mut d = SpectrumDecision::new(1, SwitchPolicy::OnOccupied, SelectionPolicy::LowestPer);
        assert!(!d.decide_switch());
        d.record_sense_result(true);
        assert!(d.decide_switch());
        d.record_sense_result(false);
        assert!(!d.decide_switch());
    }

    #[test]
    fn test_consecutive_busy_switch() {
        let mut d = SpectrumDecision::new(1, SwitchPolicy::AfterConsecutiveBusy(3), SelectionPolicy::LowestPer);
        d.record_sense_result(true);
        d.record_sense_result(true);
        assert!(!d.decide_switch());
        d.record_sense_result(true);
        assert!(d.decide_switch());
        d.reset();
        assert!(!d.decide_switch());
        assert_eq!(d.consecutive_busy(), 0);
    }

    #[test]
    fn test_lowest_per_excludes_current() {
        let repo = Repository::new(4);
        let data = spectrum();
        let mut d = SpectrumDecision::new(1, SwitchPolicy::OnOccupied, SelectionPolicy::LowestPer);
        assert_eq!(d.decide_spectrum(0, &data, &repo, |_| false), Some(2));
        assert_eq!(d.decide_spectrum(2, &data, &repo, |_| false), Some(1));
        assert_eq!(d.decide_spectrum(0, &data, &repo, |ch| ch == 2), Some(1));
    }

    #[test]
    fn test_none_when_everything_occupied() {
        let repo = Repository::new(4);
        let data = spectrum();
        for policy in [SelectionPolicy::LowestPer, SelectionPolicy::RoundRobin, SelectionPolicy::LeastContended] {
            let mut d = SpectrumDecision::new(1, SwitchPolicy::OnOccupied, policy);
            assert_eq!(d.decide_spectrum(1, &data, &repo, |ch| ch != 1), None);
        }
    }

    #[test]
    fn test_never_returns_current() {
        let repo = Repository::new(4);
        let data = spectrum();
        for policy in [SelectionPolicy::LowestPer, SelectionPolicy::RoundRobin, SelectionPolicy::LeastContended] {
            let mut d = SpectrumDecision::new(9, SwitchPolicy::OnOccupied, policy);
            for current in 0..4 {
                for _ in 0..6 {
                    let pick = d.decide_spectrum(current, &data, &repo, |_| false);
                    assert!(pick.is_some());
                    assert_ne!(pick, Some(current));
                }
            }
        }
    }

    #[test]
    fn test_round_robin_cycles() {
        let repo = Repository::new(4);
        let data = spectrum();
        let mut d = SpectrumDecision::new(1, SwitchPolicy::OnOccupied, SelectionPolicy::RoundRobin);
        let picks: Vec<_> = (0..4)
            .map(|_| d.decide_spectrum(0, &data, &repo, |_| false).unwrap())
            .collect();
        assert_eq!(picks, vec![1, 2, 3, 1]);
    }

    #[test]
    fn test_least_contended_avoids_busy_channels() {
        let mut repo = Repository::new(4);
        repo.set_rx_channel(2, 2);
        repo.update_tx_channel(3, 1, SimTime::ZERO, true).unwrap();
        let data = spectrum();

        let mut d = SpectrumDecision::new(1, SwitchPolicy::OnOccupied, SelectionPolicy::LeastContended);
        assert_eq!(d.decide_spectrum(0, &data, &repo, |_| false), Some(3));

        // Own registrations do not count as contention
        repo.set_rx_channel(1, 3);
        assert_eq!(d.decide_spectrum(0, &data, &repo, |_| false), Some(3));
    }
}
