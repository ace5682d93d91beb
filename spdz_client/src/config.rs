use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::{error::ConfigError, params::DEFAULT_FIXED_PRECISION};

/// Default host of every engine.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of engine 0.
pub const DEFAULT_PORT_BASE: u16 = 20000;

/// Default fraction of the dataset used for training.
pub const DEFAULT_TRAINING_FRACTION: f64 = 0.8;

/// Session settings that are not part of the field parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub engines: Vec<String>,
    pub port_base: u16,
    pub fixed_precision: u32,
    pub training_fraction: f64,
}

/// Raw parsed JSON configuration file. Every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSessionConfig {
    engines: Option<Vec<String>>,
    port_base: Option<u16>,
    fixed_precision: Option<u32>,
    training_fraction: Option<f64>,
}

impl SessionConfig {
    /// Defaults for a cohort of `num_engines` engines on localhost.
    pub fn local(num_engines: usize) -> Self {
        Self {
            engines: vec![DEFAULT_HOST.to_string(); num_engines],
            port_base: DEFAULT_PORT_BASE,
            fixed_precision: DEFAULT_FIXED_PRECISION,
            training_fraction: DEFAULT_TRAINING_FRACTION,
        }
    }

    /// Load configuration from JSON file, falling back to local defaults.
    pub fn load(path: impl AsRef<Path>, num_engines: usize) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawSessionConfig = serde_json::from_reader(BufReader::new(file))?;
        Self::from_raw(raw, num_engines)
    }

    /// Parse configuration from JSON string.
    pub fn from_json(json: &str, num_engines: usize) -> Result<Self, ConfigError> {
        Self::from_raw(serde_json::from_str(json)?, num_engines)
    }

    fn from_raw(raw: RawSessionConfig, num_engines: usize) -> Result<Self, ConfigError> {
        let defaults = Self::local(num_engines);
        let config = Self {
            engines: raw.engines.unwrap_or(defaults.engines),
            port_base: raw.port_base.unwrap_or(defaults.port_base),
            fixed_precision: raw.fixed_precision.unwrap_or(defaults.fixed_precision),
            training_fraction: raw.training_fraction.unwrap_or(defaults.training_fraction),
        };
        config.validate(num_engines)?;
        Ok(config)
    }

    /// Check consistency with the requested engine count.
    pub fn validate(&self, num_engines: usize) -> Result<(), ConfigError> {
        if num_engines == 0 {
            return Err(ConfigError::InvalidArgument(
                "at least one engine is required".into(),
            ));
        }
        if self.engines.len() != num_engines {
            return Err(ConfigError::InvalidArgument(format!(
                "{} engine hosts configured for {} engines",
                self.engines.len(),
                num_engines
            )));
        }
        let last_offset = u16::try_from(num_engines - 1).ok();
        if last_offset.and_then(|x| self.port_base.checked_add(x)).is_none() {
            return Err(ConfigError::InvalidArgument(format!(
                "port base {} leaves no room for {} engines",
                self.port_base, num_engines
            )));
        }
        if !(self.training_fraction > 0.0 && self.training_fraction <= 1.0) {
            return Err(ConfigError::InvalidArgument(format!(
                "training fraction {} must be in (0, 1]",
                self.training_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_json("{}", 3).unwrap();
        assert_eq!(config, SessionConfig::local(3));
        assert_eq!(config.engines, ["127.0.0.1"; 3]);
        assert_eq!(config.port_base, 20000);
        assert_eq!(config.fixed_precision, 8);
    }

    #[test]
    fn test_overrides() {
        let json = r#"{ "engines": ["10.0.0.1", "10.0.0.2"], "port_base": 14000, "training_fraction": 0.5 }"#;
        let config = SessionConfig::from_json(json, 2).unwrap();
        assert_eq!(config.engines, ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.port_base, 14000);
        assert_eq!(config.training_fraction, 0.5);
    }

    #[test]
    fn test_engine_count_mismatch() {
        let json = r#"{ "engines": ["10.0.0.1"] }"#;
        assert!(SessionConfig::from_json(json, 2).is_err());
    }

    #[test]
    fn test_port_range() {
        let mut config = SessionConfig::local(2);
        config.port_base = u16::MAX;
        assert!(config.validate(2).is_err());
        config.port_base = u16::MAX - 1;
        assert!(config.validate(2).is_ok());

        // 65537 engines must not wrap around to an offset of 0.
        let config = SessionConfig::local(65537);
        assert!(config.validate(65537).is_err());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(SessionConfig::from_json(r#"{ "training_fraction": 0 }"#, 2).is_err());
        assert!(SessionConfig::from_json(r#"{ "training_fraction": 1.5 }"#, 2).is_err());
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(
            SessionConfig::from_json(r#"{ "enignes": [] }"#, 1),
            Err(ConfigError::Json(_))
        ));
    }
}
