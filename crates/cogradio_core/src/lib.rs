//! Cognitive-radio spectrum management engine.
//!
//! Secondary-user radios share a simulated medium with licensed primary
//! users (PUs). Each radio runs a [`SpectrumManager`] that cycles through
//! sense, transmit and handoff phases driven by callbacks fired from a
//! discrete-event [`Scheduler`]:
//!
//! ```text
//!            start()
//!   Idle ────────────► Sensing ◄──────────────────────┐
//!                        │                            │
//!            sense_ended │                            │
//!          ┌─────────────┴─────────────┐              │
//!          ▼ channel clear             ▼ PU present   │
//!    Transmitting                   Handoff           │
//!          │ transmit_ended            │ handoff_ended│
//!          └───────────────────────────┴──────────────┘
//! ```
//!
//! The [`PuModel`] is the ground truth for PU activity, [`SpectrumSensing`]
//! turns it into predictions, [`SpectrumDecision`] picks replacement
//! channels, and the shared [`Repository`] lets every radio see where the
//! others listen and transmit.

pub mod decision;
pub mod error;
pub mod manager;
pub mod pu;
pub mod repository;
pub mod scenario;
pub mod scheduler;
pub mod sensing;
pub mod spectrum_data;
pub mod time;
pub mod types;

pub use decision::{SelectionPolicy, SpectrumDecision, SwitchPolicy};
pub use error::{Error, Result, What};
pub use manager::{
    ManagerConfig, ManagerHandle, ManagerState, ManagerStats, PhyBinding, SpectrumManager,
};
pub use pu::{MapGenerator, OverlapPolicy, PuActivity, PuModel, SharedPuModel};
pub use repository::{Repository, RepositoryEntryRecv, RepositoryEntrySend, SharedRepository};
pub use scenario::{NodeReport, NodeSpec, Scenario, ScenarioConfig, ScenarioReport};
pub use scheduler::{Callback, EventId, EventQueue, Scheduler};
pub use sensing::SpectrumSensing;
pub use spectrum_data::{ChannelRow, SpectrumData, SpectrumEntry};
pub use time::SimTime;
pub use types::{ChannelId, MacAddress, NodeId, Position};
