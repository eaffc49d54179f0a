//! End-to-end behaviour of the sense/transmit/handoff cycle over whole
//! scenarios.

use std::time::Duration;

use cogradio_core::scenario::DecisionSection;
use cogradio_core::{
    ManagerState, NodeSpec, Position, PuActivity, Scenario, ScenarioConfig, SelectionPolicy,
    SimTime,
};

fn permanent_pu(channel: usize) -> PuActivity {
    PuActivity {
        main_channel: channel,
        number_data: 0,
        location: Position::ORIGIN,
        receiver_location: Position::new(50.0, 0.0),
        radius: 1_000.0,
        alpha: 0.0,
        beta: f64::INFINITY,
        interference: 1.0,
    }
}

fn bursty_pu(channel: usize, alpha: f64, beta: f64) -> PuActivity {
    PuActivity {
        alpha,
        beta,
        ..permanent_pu(channel)
    }
}

fn config(num_channels: usize, activity: Vec<PuActivity>, nodes: Vec<NodeSpec>) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::default();
    cfg.scenario.num_channels = num_channels;
    cfg.scenario.duration_secs = 10.0;
    cfg.scenario.seed = 99;
    cfg.scenario.record_transitions = true;
    cfg.activity = activity;
    cfg.node = nodes;
    cfg
}

fn allowed(from: ManagerState, to: ManagerState) -> bool {
    use ManagerState::*;
    matches!(
        (from, to),
        (Idle, Sensing)
            | (Sensing, Transmitting)
            | (Sensing, Handoff)
            | (Transmitting, Sensing)
            | (Handoff, Sensing)
    )
}

/// A PU that never turns off pushes both radios off its channel for good
#[test]
fn permanent_pu_forces_handoff_and_is_never_reselected() {
    let nodes = vec![
        NodeSpec::new(1, Position::new(10.0, 0.0), 3),
        NodeSpec::new(2, Position::new(0.0, 10.0), 3),
    ];
    let mut scenario = Scenario::new(&config(6, vec![permanent_pu(3)], nodes)).unwrap();
    scenario.run().unwrap();

    for handle in scenario.managers() {
        let m = handle.borrow();
        let log = m.transitions();
        assert_eq!(log[0].to, ManagerState::Sensing);
        assert_eq!(log[0].channel, 3);
        assert_eq!(log[1].from, ManagerState::Sensing);
        assert_eq!(log[1].to, ManagerState::Handoff);
        assert_eq!(log[1].time, SimTime::ZERO + m.config().sense_time);

        // Once moved, channel 3 never comes back
        assert!(log[2..].iter().all(|t| t.channel != 3), "node {} went back to 3", m.id());
        assert!(log
            .iter()
            .filter(|t| t.to == ManagerState::Transmitting)
            .all(|t| t.channel != 3));

        assert_ne!(m.current_channel(), 3);
        assert_eq!(m.stats().handoffs, 1);
        assert!(m.stats().transmissions > 0);
        assert!(scenario.repository().borrow().tx_history(m.id(), 3).is_empty());
    }
}

/// With no PU records every sense finds the channel free
#[test]
fn empty_pu_map_never_hands_off() {
    let nodes = (1..=4)
        .map(|id| NodeSpec::new(id, Position::new(id as f64 * 25.0, 0.0), id as usize % 3))
        .collect();
    let mut scenario = Scenario::new(&config(3, vec![], nodes)).unwrap();
    let report = scenario.run().unwrap();

    for node in &report.nodes {
        assert_eq!(node.stats.handoffs, 0);
        assert_eq!(node.stats.backoffs, 0);
        assert_eq!(node.stats.busy_senses, 0);
        assert!(node.stats.transmissions > 0);
    }
    for handle in scenario.managers() {
        let m = handle.borrow();
        assert!(m.transitions().iter().all(|t| t.to != ManagerState::Handoff));
    }
}

/// Every recorded transition is a legal edge, and a sense leads to
/// transmission exactly when the PU model reports the window clear
#[test]
fn state_machine_is_total_and_follows_the_pu_model() {
    let activity = vec![
        bursty_pu(0, 0.8, 0.4),
        bursty_pu(1, 0.3, 1.5),
        bursty_pu(2, 2.0, 0.2),
    ];
    let nodes = vec![
        NodeSpec::new(1, Position::new(20.0, 20.0), 0),
        NodeSpec::new(2, Position::new(-30.0, 5.0), 1),
        NodeSpec::new(3, Position::new(5.0, -40.0), 2),
    ];
    let mut cfg = config(4, activity, nodes);
    cfg.decision = DecisionSection {
        selection: SelectionPolicy::LeastContended,
        ..DecisionSection::default()
    };
    cfg.scenario.duration_secs = 30.0;
    let mut scenario = Scenario::new(&cfg).unwrap();
    scenario.run().unwrap();

    let model = scenario.pu_model().borrow();
    let mut saw_handoff = false;
    for handle in scenario.managers() {
        let m = handle.borrow();
        let log = m.transitions();
        assert_eq!(log[0].from, ManagerState::Idle);

        for pair in log.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        for t in log {
            assert!(allowed(t.from, t.to), "illegal {} -> {}", t.from, t.to);
            if t.from == ManagerState::Sensing {
                let sense = m.config().sense_time;
                let started = SimTime::from_nanos(t.time.as_nanos() - sense.as_nanos() as u64);
                let busy = model.is_pu_active(started, sense, &m.position(), t.channel);
                let expected = if busy {
                    ManagerState::Handoff
                } else {
                    ManagerState::Transmitting
                };
                assert_eq!(t.to, expected, "node {} at {}", m.id(), t.time);
                saw_handoff |= busy;
            }
        }
    }
    assert!(saw_handoff);
}

/// Every channel blocked: the radio waits in HANDOFF and re-senses its own
/// channel instead of failing
#[test]
fn no_free_channel_backs_off_then_resenses() {
    let activity = (0..3).map(permanent_pu).collect();
    let nodes = vec![NodeSpec::new(7, Position::new(1.0, 1.0), 1)];
    let mut cfg = config(3, activity, nodes);
    cfg.timing.max_backoff = 0.5;
    cfg.scenario.duration_secs = 3.0;
    let mut scenario = Scenario::new(&cfg).unwrap();
    scenario.run().unwrap();

    let handle = scenario.manager(7).unwrap();
    let m = handle.borrow();
    assert_eq!(m.current_channel(), 1);
    assert_eq!(m.stats().handoffs, 0);
    assert_eq!(m.stats().transmissions, 0);
    assert!(m.stats().backoffs >= 4);

    let log = m.transitions();
    for pair in log.windows(2) {
        if pair[0].to == ManagerState::Handoff {
            assert_eq!(pair[1].time - pair[0].time, Duration::from_millis(500));
            assert_eq!(pair[1].to, ManagerState::Sensing);
            assert_eq!(pair[1].channel, 1);
        }
    }
}

/// Repository transmit logs stay ordered and balanced
#[test]
fn repository_logs_are_monotonic() {
    let nodes = vec![
        NodeSpec::new(1, Position::new(10.0, 0.0), 0),
        NodeSpec::new(2, Position::new(20.0, 0.0), 0),
    ];
    let mut scenario = Scenario::new(&config(2, vec![bursty_pu(0, 0.5, 0.5)], nodes)).unwrap();
    scenario.run().unwrap();

    let repo = scenario.repository().borrow();
    for node in [1, 2] {
        for ch in 0..2 {
            let log = repo.tx_history(node, ch);
            assert!(log.windows(2).all(|w| w[0].time <= w[1].time));
            // Starts and ends alternate
            for (i, e) in log.iter().enumerate() {
                assert_eq!(e.active, i % 2 == 0);
            }
        }
    }
}

/// The scenario files shipped with the repository build and run
#[test]
fn shipped_scenarios_run() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
    for name in ["two_cells.toml", "saturated.toml"] {
        let mut cfg = ScenarioConfig::load(dir.join(name)).unwrap();
        cfg.scenario.duration_secs = 5.0;
        let mut scenario = Scenario::new(&cfg).unwrap();
        let report = scenario.run().unwrap();
        assert!(report.total().senses > 0, "{} did not sense", name);
    }
}
