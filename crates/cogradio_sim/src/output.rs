//! Run summaries: per-node CSV rows and a plain-text table.

use std::path::Path;

use anyhow::{Context, Result};
use cogradio_core::{NodeReport, ScenarioReport};
use serde::Serialize;

/// One CSV line per node
#[derive(Debug, Serialize)]
struct NodeRow<'a> {
    node: u32,
    mac: &'a str,
    final_channel: usize,
    final_state: String,
    senses: u64,
    busy_senses: u64,
    busy_ratio: f64,
    transmissions: u64,
    truncated_transmissions: u64,
    handoffs: u64,
    backoffs: u64,
    airtime_secs: f64,
}

impl<'a> From<&'a NodeReport> for NodeRow<'a> {
    fn from(n: &'a NodeReport) -> Self {
        Self {
            node: n.id,
            mac: &n.mac,
            final_channel: n.channel,
            final_state: n.state.to_string(),
            senses: n.stats.senses,
            busy_senses: n.stats.busy_senses,
            busy_ratio: n.stats.busy_ratio(),
            transmissions: n.stats.transmissions,
            truncated_transmissions: n.stats.truncated_transmissions,
            handoffs: n.stats.handoffs,
            backoffs: n.stats.backoffs,
            airtime_secs: n.stats.airtime_secs,
        }
    }
}

pub fn write_csv(path: &Path, report: &ScenarioReport) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for node in &report.nodes {
        wtr.serialize(NodeRow::from(node))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_table(report: &ScenarioReport) {
    println!(
        "{:>6}  {:>7}  {:>12}  {:>6}  {:>6}  {:>5}  {:>8}  {:>8}  {:>9}",
        "node", "channel", "state", "senses", "busy%", "tx", "handoffs", "backoffs", "airtime_s"
    );
    for n in &report.nodes {
        println!(
            "{:>6}  {:>7}  {:>12}  {:>6}  {:>5.1}%  {:>5}  {:>8}  {:>8}  {:>9.3}",
            n.id,
            n.channel,
            n.state.to_string(),
            n.stats.senses,
            n.stats.busy_ratio() * 100.0,
            n.stats.transmissions,
            n.stats.handoffs,
            n.stats.backoffs,
            n.stats.airtime_secs
        );
    }
    let total = report.total();
    println!(
        "{} nodes, {} PU records, {:.3}s simulated, {} events, {} handoffs, {:.3}s airtime",
        report.nodes.len(),
        report.pu_records,
        report.simulated_secs,
        report.events,
        total.handoffs,
        total.airtime_secs
    );
}
