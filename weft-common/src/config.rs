//! Configuration: named fabrication tunables
//!
//! Resolution is priority-ordered: compiled defaults, overlaid by an
//! optional TOML file, overlaid by per-chain `ChainConfigItem` key/value
//! rows at use sites.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entity::chain::ChainConfigItem;
use crate::error::{Error, Result};

/// Named tunables for the fabrication engine.
///
/// All fields have compiled defaults; any subset may be overridden from a
/// TOML file or per-chain config rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricationConfig {
    /// Maximum length of a Preview chain, seconds
    pub preview_length_max_seconds: i64,
    /// Maximum delta (segments into one main-program run) before NextMain
    pub main_program_length_max_delta: u32,
    /// A Fabricate chain older than this with no fresh output is stalled
    pub chain_revive_threshold_start_seconds: i64,
    /// "Fresh output" horizon for stall detection, seconds
    pub chain_revive_threshold_head_seconds: i64,
    /// Forward bound of the time-window segment read, seconds
    pub play_buffer_ahead_seconds: i64,
    /// Backward bound of the time-window segment read, seconds
    pub play_buffer_delay_seconds: i64,
    /// Maximum segments returned by any windowed read
    pub limit_segment_read_size: usize,
    /// Output audio format: channel count
    pub output_channels: u16,
    /// Output audio format: frame rate, Hz
    pub output_frame_rate: u32,
    /// Output audio format: bits per sample
    pub output_sample_bits: u16,
    /// Output audio format: encoding name
    pub output_encoding: String,
    /// Output container extension for waveform artifacts
    pub output_container: String,
}

impl Default for FabricationConfig {
    fn default() -> Self {
        Self {
            preview_length_max_seconds: 300,
            main_program_length_max_delta: 64,
            chain_revive_threshold_start_seconds: 300,
            chain_revive_threshold_head_seconds: 120,
            play_buffer_ahead_seconds: 60,
            play_buffer_delay_seconds: 5,
            limit_segment_read_size: 20,
            output_channels: 2,
            output_frame_rate: 48000,
            output_sample_bits: 16,
            output_encoding: "PCM_SIGNED".to_string(),
            output_container: "ogg".to_string(),
        }
    }
}

impl FabricationConfig {
    /// Load from a TOML file, overlaying compiled defaults.
    ///
    /// A missing file is not an error: defaults are returned so the engine
    /// can start zero-config. A present-but-malformed file is a
    /// `Validation` error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Fatal(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| Error::Validation(format!("parsing {}: {e}", path.display())))
    }

    /// Overlay per-chain key/value overrides onto a copy of this config.
    ///
    /// Unknown keys are ignored with a warning; unparseable values are a
    /// `Validation` error naming the key.
    pub fn with_overrides(&self, items: &[ChainConfigItem]) -> Result<Self> {
        let mut out = self.clone();
        for item in items {
            match item.key.as_str() {
                "preview_length_max_seconds" => {
                    out.preview_length_max_seconds = parse(&item.key, &item.value)?
                }
                "main_program_length_max_delta" => {
                    out.main_program_length_max_delta = parse(&item.key, &item.value)?
                }
                "chain_revive_threshold_start_seconds" => {
                    out.chain_revive_threshold_start_seconds = parse(&item.key, &item.value)?
                }
                "chain_revive_threshold_head_seconds" => {
                    out.chain_revive_threshold_head_seconds = parse(&item.key, &item.value)?
                }
                "play_buffer_ahead_seconds" => {
                    out.play_buffer_ahead_seconds = parse(&item.key, &item.value)?
                }
                "play_buffer_delay_seconds" => {
                    out.play_buffer_delay_seconds = parse(&item.key, &item.value)?
                }
                "limit_segment_read_size" => {
                    out.limit_segment_read_size = parse(&item.key, &item.value)?
                }
                "output_channels" => out.output_channels = parse(&item.key, &item.value)?,
                "output_frame_rate" => out.output_frame_rate = parse(&item.key, &item.value)?,
                "output_sample_bits" => out.output_sample_bits = parse(&item.key, &item.value)?,
                "output_encoding" => out.output_encoding = item.value.clone(),
                "output_container" => out.output_container = item.value.clone(),
                other => {
                    tracing::warn!("ignoring unknown chain config key {other:?}");
                }
            }
        }
        Ok(out)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("chain config {key}={value:?} is not valid")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(key: &str, value: &str) -> ChainConfigItem {
        ChainConfigItem {
            id: Uuid::new_v4(),
            chain_id: Uuid::new_v4(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn defaults_are_sane() {
        let config = FabricationConfig::default();
        assert!(config.preview_length_max_seconds > 0);
        assert!(config.limit_segment_read_size > 0);
        assert_eq!(config.output_channels, 2);
    }

    #[test]
    fn overrides_overlay_defaults() {
        let config = FabricationConfig::default()
            .with_overrides(&[
                item("main_program_length_max_delta", "8"),
                item("output_container", "wav"),
            ])
            .unwrap();
        assert_eq!(config.main_program_length_max_delta, 8);
        assert_eq!(config.output_container, "wav");
        // Untouched fields keep defaults
        assert_eq!(config.limit_segment_read_size, 20);
    }

    #[test]
    fn bad_override_value_is_validation_error() {
        let err = FabricationConfig::default()
            .with_overrides(&[item("output_frame_rate", "fast")])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = FabricationConfig::load(Path::new("/nonexistent/weft.toml")).unwrap();
        assert_eq!(config.output_frame_rate, 48000);
    }

    #[test]
    fn toml_file_overlays_defaults() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "main_program_length_max_delta = 4\noutput_container = \"wav\""
        )
        .unwrap();

        let config = FabricationConfig::load(file.path()).unwrap();
        assert_eq!(config.main_program_length_max_delta, 4);
        assert_eq!(config.output_container, "wav");
        assert_eq!(config.output_frame_rate, 48000);
    }

    #[test]
    fn malformed_file_is_validation_error() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_channels = \"stereo\"").unwrap();

        let err = FabricationConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
