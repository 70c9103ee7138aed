//! Application configuration
//!
//! An explicitly passed value object: commands receive the config they need,
//! nothing is process-global. Persisted as a JSON side-car next to the data
//! the user works with.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How point coordinates are rendered in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinateFormat {
    /// `x, y` with six decimal places
    #[default]
    DecimalDegrees,
    /// Degrees/minutes/seconds with hemisphere suffix
    DegreesMinutesSeconds,
}

/// Display settings for the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Coordinate rendering format for reports
    #[serde(default)]
    pub coordinate_format: CoordinateFormat,
}

impl AppConfig {
    /// Load configuration from a side-car file.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Save configuration to a side-car file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Render a point per the configured coordinate format.
    pub fn format_point(&self, x: f64, y: f64) -> String {
        match self.coordinate_format {
            CoordinateFormat::DecimalDegrees => format!("{:.6}, {:.6}", x, y),
            CoordinateFormat::DegreesMinutesSeconds => {
                format!("{} {}", format_dms(y, 'N', 'S'), format_dms(x, 'E', 'W'))
            }
        }
    }
}

fn format_dms(value: f64, positive: char, negative: char) -> String {
    let hemisphere = if value >= 0.0 { positive } else { negative };
    let value = value.abs();
    let degrees = value.floor();
    let minutes_f = (value - degrees) * 60.0;
    let minutes = minutes_f.floor();
    let seconds = (minutes_f - minutes) * 60.0;
    format!("{}°{}'{:.2}\"{}", degrees, minutes, seconds, hemisphere)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.coordinate_format, CoordinateFormat::DecimalDegrees);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sightline.json");

        let config = AppConfig {
            coordinate_format: CoordinateFormat::DegreesMinutesSeconds,
        };
        config.save(&path).unwrap();

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(
            reloaded.coordinate_format,
            CoordinateFormat::DegreesMinutesSeconds
        );
    }

    #[test]
    fn test_format_decimal() {
        let config = AppConfig::default();
        assert_eq!(config.format_point(1.5, -2.25), "1.500000, -2.250000");
    }

    #[test]
    fn test_format_dms() {
        let config = AppConfig {
            coordinate_format: CoordinateFormat::DegreesMinutesSeconds,
        };
        let rendered = config.format_point(-70.5, -33.25);
        assert_eq!(rendered, "33°15'0.00\"S 70°30'0.00\"W");
    }
}
