//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_sniffer_core::{BusSpeed, SnifferConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sniffer: SnifferConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Capture file played back as the bus
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// Previously exported capture (CSV)
    pub file: Option<PathBuf>,
    /// Speed the capture was recorded at; other speeds read only errors
    #[serde(default = "default_bus_speed")]
    pub bus_speed: BusSpeed,
    /// Pace frames by their recorded timestamps
    #[serde(default = "default_true")]
    pub realtime: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            file: None,
            bus_speed: default_bus_speed(),
            realtime: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print every received frame as a capture line
    #[serde(default)]
    pub echo_frames: bool,
    /// Print responses as JSON instead of text
    #[serde(default)]
    pub json: bool,
    /// Directory for exported captures (default: current directory)
    pub export_dir: Option<PathBuf>,
}

fn default_bus_speed() -> BusSpeed {
    BusSpeed::Kbps250
}

fn default_true() -> bool {
    true
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.sniffer.scan_candidates.is_empty() {
        log::warn!("No scan candidates configured; speed detection will never select a speed");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [sniffer]
            initial_speed = "500k"
            scan_window_ms = 3000
            scan_candidates = ["250k", "500k"]

            [replay]
            file = "capture.csv"
            bus_speed = "500k"

            [output]
            echo_frames = true
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.sniffer.initial_speed, BusSpeed::Kbps500);
        assert_eq!(config.sniffer.scan_window_ms, 3000);
        assert_eq!(config.sniffer.scan_candidates, vec![BusSpeed::Kbps250, BusSpeed::Kbps500]);
        assert_eq!(config.sniffer.log_capacity, 500);
        assert_eq!(config.replay.file, Some(PathBuf::from("capture.csv")));
        assert!(config.replay.realtime);
        assert!(config.output.echo_frames);
        assert!(!config.output.json);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.sniffer, SnifferConfig::default());
        assert_eq!(config.replay.bus_speed, BusSpeed::Kbps250);
        assert!(config.replay.file.is_none());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sniffer]\nstatus_interval_ms = 0").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sniffer.status_interval_ms, 0);
    }

    #[test]
    fn test_load_config_reports_bad_speed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sniffer]\ninitial_speed = \"33k\"").unwrap();

        assert!(load_config(file.path()).is_err());
    }
}
