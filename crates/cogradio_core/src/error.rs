use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::time::SimTime;
use crate::types::{ChannelId, NodeId};

/// What a failed lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum What {
    Node(NodeId),
    Channel(ChannelId),
}

impl fmt::Display for What {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            What::Node(id) => write!(f, "node {}", id),
            What::Channel(ch) => write!(f, "channel {}", ch),
        }
    }
}

/// Errors surfaced by the spectrum management engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid PU activity #{index}: {reason}")]
    InvalidActivity { index: usize, reason: String },

    #[error("{0} not found")]
    NotFound(What),

    #[error("transmit log for node {node} channel {channel} would go back in time ({time} < {last})")]
    NonMonotonic {
        node: NodeId,
        channel: ChannelId,
        last: SimTime,
        time: SimTime,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} must be bound before start")]
    Unbound(&'static str),

    #[error("spectrum manager for node {0} already started")]
    AlreadyStarted(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;
