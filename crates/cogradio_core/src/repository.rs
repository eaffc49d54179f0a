//! Shared cross-node channel state.
//!
//! Every spectrum manager in a scenario writes here and the decision logic of
//! every other manager reads from here:
//!
//! - receive channel per node: last writer wins
//! - transmit log per (node, channel): append-only, ordered by time
//!
//! Access is serialized by the discrete-event scheduler, so the repository is
//! shared as `Rc<RefCell<_>>` without locking.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result, What};
use crate::time::SimTime;
use crate::types::{ChannelId, NodeId};

pub type SharedRepository = Rc<RefCell<Repository>>;

/// Where a node currently listens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntryRecv {
    pub rx_channel: ChannelId,
}

/// One transmit event: `active = true` marks the start of a transmission,
/// `false` its end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntrySend {
    pub time: SimTime,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct Repository {
    num_channels: usize,
    recv: BTreeMap<NodeId, RepositoryEntryRecv>,
    send: HashMap<(NodeId, ChannelId), Vec<RepositoryEntrySend>>,
}

impl Repository {
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            recv: BTreeMap::new(),
            send: HashMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedRepository {
        Rc::new(RefCell::new(self))
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn check_channel(&self, channel: ChannelId) {
        assert!(
            channel < self.num_channels,
            "channel {} outside spectrum of {} channels",
            channel,
            self.num_channels
        );
    }

    // =========================================================================
    // Receive channels
    // =========================================================================

    /// Record the channel `node` now listens on. Overwrites any earlier value.
    pub fn set_rx_channel(&mut self, node: NodeId, channel: ChannelId) {
        self.check_channel(channel);
        trace!(node, channel, "rx channel");
        self.recv.insert(node, RepositoryEntryRecv { rx_channel: channel });
    }

    pub fn get_rx_channel(&self, node: NodeId) -> Result<ChannelId> {
        self.recv
            .get(&node)
            .map(|e| e.rx_channel)
            .ok_or(Error::NotFound(What::Node(node)))
    }

    /// Nodes currently listening on `channel`, ascending by id
    pub fn rx_nodes_on(&self, channel: ChannelId) -> Vec<NodeId> {
        self.check_channel(channel);
        self.recv
            .iter()
            .filter(|(_, e)| e.rx_channel == channel)
            .map(|(&n, _)| n)
            .collect()
    }

    /// Every node that has registered a receive channel
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.recv.keys().copied()
    }

    // =========================================================================
    // Transmit log
    // =========================================================================

    /// Append a transmit event for `node` on `channel`.
    ///
    /// Fails with `NonMonotonic` if `time` precedes the last event logged for
    /// the same pair.
    pub fn update_tx_channel(
        &mut self,
        node: NodeId,
        channel: ChannelId,
        time: SimTime,
        active: bool,
    ) -> Result<()> {
        self.check_channel(channel);
        let log = self.send.entry((node, channel)).or_default();
        if let Some(last) = log.last() {
            if time < last.time {
                return Err(Error::NonMonotonic {
                    node,
                    channel,
                    last: last.time,
                    time,
                });
            }
        }
        trace!(node, channel, time = %time, active, "tx event");
        log.push(RepositoryEntrySend { time, active });
        Ok(())
    }

    /// Full transmit log for a (node, channel) pair, oldest first
    pub fn tx_history(&self, node: NodeId, channel: ChannelId) -> &[RepositoryEntrySend] {
        self.check_channel(channel);
        self.send
            .get(&(node, channel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if the latest event for the pair opened a transmission
    pub fn is_transmitting(&self, node: NodeId, channel: ChannelId) -> bool {
        self.tx_history(node, channel)
            .last()
            .is_some_and(|e| e.active)
    }

    /// Number of nodes other than `exclude` with an open transmission on `channel`
    pub fn active_transmitters(&self, channel: ChannelId, exclude: Option<NodeId>) -> usize {
        self.check_channel(channel);
        self.send
            .iter()
            .filter(|((node, ch), log)| {
                *ch == channel
                    && Some(*node) != exclude
                    && log.last().is_some_and(|e| e.active)
            })
            .count()
    }

    /// Transmissions started on `channel` at or after `since`, all nodes
    pub fn tx_events_since(&self, channel: ChannelId, since: SimTime) -> usize {
        self.check_channel(channel);
        self.send
            .iter()
            .filter(|((_, ch), _)| *ch == channel)
            .map(|(_, log)| {
                let start = log.partition_point(|e| e.time < since);
                log[start..].iter().filter(|e| e.active).count()
            })
            .sum()
    }
}
