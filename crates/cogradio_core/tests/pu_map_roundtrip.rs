//! PU map and scenario files on disk.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use cogradio_core::{Error, MapGenerator, Position, PuModel, Scenario, ScenarioConfig, SimTime};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cogradio_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Writing a map and reading it back reproduces every record and every
/// activity query
#[test]
fn written_map_reloads_identically() {
    let dir = scratch_dir("roundtrip");
    let path = dir.join("pu_map.toml");

    let generator = MapGenerator {
        count: 25,
        num_channels: 6,
        ..MapGenerator::default()
    };
    let mut original = PuModel::new(6).with_seed(3);
    original.set_activities(generator.generate(17).unwrap()).unwrap();
    original.write_pu_map_file(&path).unwrap();

    let mut reloaded = PuModel::new(6).with_seed(3);
    assert_eq!(reloaded.set_pu_map_file(&path).unwrap(), 25);
    assert_eq!(reloaded.activities(), original.activities());
    assert_eq!(reloaded.source(), Some(path.as_path()));

    let window = Duration::from_millis(250);
    for step in 0..200u64 {
        let now = SimTime::from_millis(step * 137);
        let pos = Position::new((step * 37 % 1000) as f64, (step * 91 % 1000) as f64);
        let ch = step as usize % 6;
        assert_eq!(
            original.is_pu_active(now, window, &pos, ch),
            reloaded.is_pu_active(now, window, &pos, ch)
        );
        assert_eq!(
            original.next_off_time(now, &pos, ch),
            reloaded.next_off_time(now, &pos, ch)
        );
    }

    fs::remove_dir_all(&dir).ok();
}

/// A bad file leaves the previously loaded records in place
#[test]
fn failed_load_keeps_previous_map() {
    let dir = scratch_dir("failed_load");
    let good = dir.join("good.toml");
    let malformed = dir.join("malformed.toml");
    let invalid = dir.join("invalid.toml");

    fs::write(
        &good,
        r#"
[[activity]]
main_channel = 1
location = [0.0, 0.0]
receiver_location = [10.0, 0.0]
radius = 50.0
alpha = 0.0
beta = inf
"#,
    )
    .unwrap();
    fs::write(&malformed, "[[activity]\nmain_channel = ").unwrap();
    fs::write(
        &invalid,
        r#"
[[activity]]
main_channel = 1
location = [0.0, 0.0]
receiver_location = [0.0, 0.0]
radius = 50.0
alpha = 1.0
beta = 1.0

[[activity]]
main_channel = 3
number_data = 2
location = [0.0, 0.0]
receiver_location = [0.0, 0.0]
radius = 50.0
alpha = 1.0
beta = 1.0
"#,
    )
    .unwrap();

    let mut model = PuModel::new(4);
    model.set_pu_map_file(&good).unwrap();
    assert!(model.is_pu_active(SimTime::ZERO, Duration::ZERO, &Position::new(5.0, 0.0), 1));

    assert!(matches!(model.set_pu_map_file(&malformed), Err(Error::Parse { .. })));
    assert!(matches!(
        model.set_pu_map_file(&invalid),
        Err(Error::InvalidActivity { index: 1, .. })
    ));
    assert!(matches!(
        model.set_pu_map_file(dir.join("missing.toml")),
        Err(Error::Io { .. })
    ));

    assert_eq!(model.len(), 1);
    assert_eq!(model.source(), Some(good.as_path()));
    assert_eq!(model.activities()[0].beta, f64::INFINITY);

    fs::remove_dir_all(&dir).ok();
}

/// Scenario files find their PU map next to them
#[test]
fn scenario_file_resolves_map_path() {
    let dir = scratch_dir("scenario_file");
    fs::write(
        dir.join("map.toml"),
        r#"
[[activity]]
main_channel = 0
location = [0.0, 0.0]
receiver_location = [0.0, 0.0]
radius = 500.0
alpha = 0.0
beta = inf
"#,
    )
    .unwrap();
    let scenario_path = dir.join("scenario.toml");
    fs::write(
        &scenario_path,
        r#"
[scenario]
num_channels = 2
duration_secs = 1.0
pu_map = "map.toml"

[[channel]]
id = 0
per = 0.1

[[channel]]
id = 1
per = 0.2

[[node]]
id = 1
position = [3.0, 4.0]
"#,
    )
    .unwrap();

    let config = ScenarioConfig::load(&scenario_path).unwrap();
    assert_eq!(config.scenario.pu_map, Some(dir.join("map.toml")));

    let mut scenario = Scenario::new(&config).unwrap();
    let report = scenario.run().unwrap();
    assert_eq!(report.pu_records, 1);
    assert_eq!(report.nodes[0].channel, 1);
    assert_eq!(report.nodes[0].stats.handoffs, 1);

    fs::remove_dir_all(&dir).ok();
}
