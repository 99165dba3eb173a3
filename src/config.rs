// In: src/config.rs

//! The single source of truth for codec configuration.
//!
//! `CodecConfig` is created once at the application boundary (usually from a
//! JSON document) and handed by reference to the fragment decoder and writers.
//! Every field has a serde default so partial documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::L1CaloError;
use crate::types::word::DataFormat;

//==================================================================================
// I. PPM Settings
//==================================================================================

/// Settings the PPM sub-block needs but the wire format does not carry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PpmConfig {
    /// Pedestal used by V00 compression to place the small-signal window.
    #[serde(default = "default_pedestal")]
    pub pedestal: u32,

    /// Lower edge of the V02 small-signal window.
    #[serde(default)]
    pub fadc_baseline: u32,

    /// A channel is "present" for super-compression when any FADC sample
    /// reaches this value.
    #[serde(default = "default_fadc_threshold")]
    pub fadc_threshold: u32,

    /// Triggered LUT slice. `None` means `slices / 2`.
    #[serde(default)]
    pub lut_offset: Option<usize>,

    /// Triggered FADC slice. `None` means `slices / 2`.
    #[serde(default)]
    pub fadc_offset: Option<usize>,
}

impl Default for PpmConfig {
    fn default() -> Self {
        Self {
            pedestal: default_pedestal(),
            fadc_baseline: 0,
            fadc_threshold: default_fadc_threshold(),
            lut_offset: None,
            fadc_offset: None,
        }
    }
}

fn default_pedestal() -> u32 {
    10
}

fn default_fadc_threshold() -> u32 {
    21
}

//==================================================================================
// II. Logging
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append log lines to this file instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

//==================================================================================
// III. The Unified CodecConfig
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CodecConfig {
    #[serde(default)]
    pub ppm: PpmConfig,

    /// Compression version used by writers when the format is compressed.
    #[serde(default = "default_compression_version")]
    pub compression_version: u32,

    /// Data format used by writers.
    #[serde(default = "default_format")]
    pub default_format: DataFormat,

    /// Reject a fragment on crate/module inconsistencies or a failed
    /// sub-block unpack instead of only counting them.
    #[serde(default = "default_true")]
    pub strict_structure: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            ppm: PpmConfig::default(),
            compression_version: default_compression_version(),
            default_format: default_format(),
            strict_structure: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl CodecConfig {
    /// Parses a JSON document and validates the values serde cannot check.
    pub fn from_json_str(json: &str) -> Result<Self, L1CaloError> {
        let config: CodecConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), L1CaloError> {
        if self.compression_version > 2 {
            return Err(L1CaloError::Config(format!(
                "compression_version {} is not one of 0, 1, 2",
                self.compression_version
            )));
        }
        if self.ppm.fadc_baseline > 0x3ff || self.ppm.pedestal > 0x3ff {
            return Err(L1CaloError::Config(
                "pedestal and fadc_baseline must fit in 10 bits".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_compression_version() -> u32 {
    1
}

fn default_format() -> DataFormat {
    DataFormat::Compressed
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

//==================================================================================
// Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CodecConfig::from_json_str(r#"{ "ppm": { "pedestal": 32 } }"#).unwrap();
        assert_eq!(config.ppm.pedestal, 32);
        assert_eq!(config.ppm.fadc_threshold, 21);
        assert_eq!(config.compression_version, 1);
        assert_eq!(config.default_format, DataFormat::Compressed);
        assert!(config.strict_structure);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_format_names_are_snake_case() {
        let config =
            CodecConfig::from_json_str(r#"{ "default_format": "super_compressed" }"#).unwrap();
        assert_eq!(config.default_format, DataFormat::SuperCompressed);
    }

    #[test]
    fn test_rejects_unknown_compression_version() {
        let result = CodecConfig::from_json_str(r#"{ "compression_version": 3 }"#);
        assert!(matches!(result, Err(L1CaloError::Config(_))));
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut config = CodecConfig::default();
        config.ppm.fadc_offset = Some(2);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(CodecConfig::from_json_str(&json).unwrap(), config);
    }
}
