//! Static per-channel characteristics.
//!
//! Channel properties are fixed when the scenario is built. The table can
//! come from code or from a TOML file:
//!
//! ```toml
//! [[channel]]
//! id = 0
//! bandwidth = 2.0e6
//! per = 0.01
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, What};
use crate::types::ChannelId;

/// Default channel bandwidth (Hz)
pub const DEFAULT_BANDWIDTH_HZ: f64 = 2.0e6;

/// Default packet error rate
pub const DEFAULT_PER: f64 = 0.0;

/// Snapshot of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEntry {
    /// Bandwidth in Hz
    pub bandwidth: f64,
    /// Packet error rate (0.0 to 1.0)
    pub per: f64,
}

impl Default for SpectrumEntry {
    fn default() -> Self {
        Self {
            bandwidth: DEFAULT_BANDWIDTH_HZ,
            per: DEFAULT_PER,
        }
    }
}

/// One row of a spectrum data file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelRow {
    pub id: ChannelId,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,
    #[serde(default)]
    pub per: f64,
}

fn default_bandwidth() -> f64 {
    DEFAULT_BANDWIDTH_HZ
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpectrumFile {
    #[serde(default)]
    channel: Vec<ChannelRow>,
}

/// Read-only channel table
#[derive(Debug, Clone, Default)]
pub struct SpectrumData {
    entries: BTreeMap<ChannelId, SpectrumEntry>,
}

impl SpectrumData {
    /// `num_channels` channels sharing the same characteristics
    pub fn uniform(num_channels: usize, entry: SpectrumEntry) -> Self {
        Self {
            entries: (0..num_channels).map(|ch| (ch, entry)).collect(),
        }
    }

    /// Build from explicit rows, rejecting duplicates and out-of-range values
    pub fn from_rows(rows: &[ChannelRow]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for row in rows {
            if !(0.0..=1.0).contains(&row.per) {
                return Err(Error::InvalidConfig(format!(
                    "channel {}: per {} outside [0, 1]",
                    row.id, row.per
                )));
            }
            if !row.bandwidth.is_finite() || row.bandwidth <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "channel {}: bandwidth {} must be positive",
                    row.id, row.bandwidth
                )));
            }
            let entry = SpectrumEntry {
                bandwidth: row.bandwidth,
                per: row.per,
            };
            if entries.insert(row.id, entry).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "channel {} listed twice",
                    row.id
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Load a spectrum data file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SpectrumFile = toml::from_str(&text).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_rows(&file.channel)
    }

    /// Characteristics of `channel`
    pub fn get_spectrum_data(&self, channel: ChannelId) -> Result<SpectrumEntry> {
        self.entries
            .get(&channel)
            .copied()
            .ok_or(Error::NotFound(What::Channel(channel)))
    }

    /// Configured channel ids in ascending order
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the highest configured channel id
    pub fn width(&self) -> usize {
        self.entries.keys().next_back().map_or(0, |ch| ch + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_lookup() {
        let data = SpectrumData::uniform(4, SpectrumEntry::default());
        assert_eq!(data.len(), 4);
        assert_eq!(data.width(), 4);
        assert_eq!(data.get_spectrum_data(3).unwrap().bandwidth, DEFAULT_BANDWIDTH_HZ);
    }

    #[test]
    fn test_unknown_channel_not_found() {
        let data = SpectrumData::uniform(2, SpectrumEntry::default());
        assert!(matches!(
            data.get_spectrum_data(2),
            Err(Error::NotFound(What::Channel(2)))
        ));
    }

    #[test]
    fn test_rows_validation() {
        let ok = [
            ChannelRow { id: 0, bandwidth: 1e6, per: 0.1 },
            ChannelRow { id: 5, bandwidth: 2e6, per: 0.0 },
        ];
        let data = SpectrumData::from_rows(&ok).unwrap();
        assert_eq!(data.channels().collect::<Vec<_>>(), vec![0, 5]);
        assert_eq!(data.width(), 6);
        assert!(data.get_spectrum_data(3).is_err());

        let dup = [
            ChannelRow { id: 1, bandwidth: 1e6, per: 0.1 },
            ChannelRow { id: 1, bandwidth: 1e6, per: 0.2 },
        ];
        assert!(SpectrumData::from_rows(&dup).is_err());

        let bad_per = [ChannelRow { id: 0, bandwidth: 1e6, per: 1.5 }];
        assert!(SpectrumData::from_rows(&bad_per).is_err());
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("cogradio_spectrum_{}.toml", std::process::id()));
        fs::write(
            &path,
            "[[channel]]\nid = 0\nper = 0.25\n\n[[channel]]\nid = 1\nbandwidth = 5.0e6\n",
        )
        .unwrap();
        let data = SpectrumData::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(data.get_spectrum_data(0).unwrap().per, 0.25);
        assert_eq!(data.get_spectrum_data(0).unwrap().bandwidth, DEFAULT_BANDWIDTH_HZ);
        assert_eq!(data.get_spectrum_data(1).unwrap().bandwidth, 5.0e6);
    }
}
