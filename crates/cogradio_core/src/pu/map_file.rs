//! PU map file codec.
//!
//! A map file is a TOML document with one `[[activity]]` table per primary
//! user:
//!
//! ```toml
//! [[activity]]
//! main_channel = 3
//! number_data = 0
//! location = [120.0, 40.0]
//! receiver_location = [180.0, 40.0]
//! radius = 250.0
//! alpha = 0.0
//! beta = inf
//! interference = 1.0
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::PuActivity;
use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PuMap {
    #[serde(default)]
    activity: Vec<PuActivity>,
}

/// Parse map text. `path` is only used for error reporting.
pub fn parse(text: &str, path: &Path) -> Result<Vec<PuActivity>> {
    let map: PuMap = toml::from_str(text).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(map.activity)
}

pub fn read(path: &Path) -> Result<Vec<PuActivity>> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path)
}

pub fn render(activities: &[PuActivity]) -> Result<String> {
    let map = PuMap {
        activity: activities.to_vec(),
    };
    toml::to_string_pretty(&map)
        .map_err(|e| Error::InvalidConfig(format!("cannot serialize PU map: {}", e)))
}

pub fn write(path: &Path, activities: &[PuActivity]) -> Result<()> {
    let text = render(activities)?;
    fs::write(path, text).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pu::activity::tests::sample;

    #[test]
    fn test_parse_example() {
        let text = r#"
            [[activity]]
            main_channel = 3
            number_data = 0
            location = [120.0, 40.0]
            receiver_location = [180.0, 40.0]
            radius = 250.0
            alpha = 0.0
            beta = inf
            interference = 1.0

            [[activity]]
            main_channel = 0
            location = [0.0, 0.0]
            receiver_location = [1.0, 1.0]
            radius = 5.0
            alpha = 2.5
            beta = 0.5
        "#;
        let acts = parse(text, Path::new("inline")).unwrap();
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[0].main_channel, 3);
        assert!(acts[0].beta.is_infinite());
        assert_eq!(acts[1].number_data, 0);
        assert_eq!(acts[1].interference, 0.0);
    }

    #[test]
    fn test_empty_map() {
        assert!(parse("", Path::new("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let missing_beta = r#"
            [[activity]]
            main_channel = 1
            location = [0.0, 0.0]
            receiver_location = [0.0, 0.0]
            radius = 1.0
            alpha = 1.0
        "#;
        assert!(matches!(
            parse(missing_beta, Path::new("x")),
            Err(Error::Parse { .. })
        ));

        let unknown_key = "[[activity]]\nchannel = 1\n";
        assert!(matches!(
            parse(unknown_key, Path::new("x")),
            Err(Error::Parse { .. })
        ));

        assert!(matches!(
            parse("[[activity]\n", Path::new("x")),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_render_then_parse_is_exact() {
        let mut a = sample();
        a.alpha = 0.1 + 0.2;
        a.location.x = 1.0 / 3.0;
        let mut b = sample();
        b.beta = f64::INFINITY;
        b.alpha = 0.0;

        let text = render(&[a.clone(), b.clone()]).unwrap();
        let back = parse(&text, Path::new("rendered")).unwrap();
        assert_eq!(back, vec![a, b]);
    }
}
