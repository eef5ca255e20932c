//! Session settings.
//!
//! Settings are layered with figment:
//!
//! 1. Defaults from [`CounterSettings::default`]
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `COUNTER_`, using `__` for nesting
//!
//! ```text
//! COUNTER_PORT=192.168.1.50          -> port
//! COUNTER_CHANNELS=4                 -> channels
//! COUNTER_MOCK__SEED=7               -> mock.seed
//! ```
//!
//! The merged result is validated before it is returned.

use crate::error::{CounterError, CounterResult};
use crate::interface::Interface;
use crate::schema::{IMPEDANCE_OHMS, SAMPLE_COUNT};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COUNTER_";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Settings for one counter session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterSettings {
    /// Interface used to reach the instrument.
    pub interface: Interface,
    /// Port identifier, interpreted per interface.
    pub port: String,
    /// Optional human-readable instrument name.
    pub name: Option<String>,
    /// Number of input channels.
    pub channels: u8,
    /// Default sample count for operations that take `sampl`.
    pub samples: u32,
    /// Default interval between samples, in milliseconds.
    pub interval_ms: u64,
    /// Log instrument traffic at info level.
    pub debug: bool,
    /// Default input impedance in ohms.
    pub default_impedance: u32,
    /// Transport I/O timeout in milliseconds.
    pub timeout_ms: u64,
    /// Default log filter for the command-line tool.
    pub log_level: String,
    /// Simulated instrument settings.
    pub mock: MockSettings,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            interface: Interface::Vxi11,
            port: "127.0.0.1".to_string(),
            name: None,
            channels: 2,
            samples: 1,
            interval_ms: 1000,
            debug: false,
            default_impedance: 1_000_000,
            timeout_ms: 2000,
            log_level: "info".to_string(),
            mock: MockSettings::default(),
        }
    }
}

/// Signal model of the simulated counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Seed for reproducible noise.
    pub seed: u64,
    /// Frequency of channel 1, in hertz. Each further channel doubles it.
    pub base_frequency_hz: f64,
    /// Peak-to-peak amplitude of every channel, in volts.
    pub amplitude_v: f64,
    /// Relative noise added to each reading.
    pub noise: f64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            base_frequency_hz: 10e6,
            amplitude_v: 1.0,
            noise: 1e-6,
        }
    }
}

impl CounterSettings {
    /// Figment with all layers merged, before extraction.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(CounterSettings::default()));

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            } else {
                warn!(path = %path.display(), "Settings file not found, using defaults");
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings.
    pub fn load(config_path: Option<&Path>) -> CounterResult<Self> {
        let settings: CounterSettings = Self::figment(config_path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check semantic constraints serde cannot express.
    pub fn validate(&self) -> CounterResult<()> {
        if self.channels == 0 {
            return Err(CounterError::Configuration(
                "channels must be at least 1".to_string(),
            ));
        }
        let (min, max) = SAMPLE_COUNT;
        if !(min..=max).contains(&u64::from(self.samples)) {
            return Err(CounterError::Configuration(format!(
                "samples = {} is out of valid range ({} - {})",
                self.samples, min, max
            )));
        }
        if self.interval_ms == 0 {
            return Err(CounterError::Configuration(
                "interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(CounterError::Configuration(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        let (min, max) = IMPEDANCE_OHMS;
        if !(min..=max).contains(&u64::from(self.default_impedance)) {
            return Err(CounterError::Configuration(format!(
                "default_impedance = {} is out of valid range ({} - {} ohms)",
                self.default_impedance, min, max
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(CounterError::Configuration(format!(
                "log_level '{}' is not one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if !(self.mock.base_frequency_hz.is_finite() && self.mock.base_frequency_hz > 0.0) {
            return Err(CounterError::Configuration(
                "mock.base_frequency_hz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in ["COUNTER_CHANNELS", "COUNTER_PORT", "COUNTER_MOCK__SEED"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_are_valid() {
        clear_env();
        let settings = CounterSettings::load(None).unwrap();
        assert_eq!(settings, CounterSettings::default());
        assert_eq!(settings.channels, 2);
        assert_eq!(settings.samples, 1);
        assert_eq!(settings.interval_ms, 1000);
        assert!(!settings.debug);
    }

    #[test]
    #[serial]
    fn test_toml_file_overrides_defaults() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
interface = "usb"
port = "/dev/usbtmc0"
name = "bench counter"
samples = 10

[mock]
seed = 7
"#
        )
        .unwrap();

        let settings = CounterSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.interface, Interface::Usb);
        assert_eq!(settings.port, "/dev/usbtmc0");
        assert_eq!(settings.name.as_deref(), Some("bench counter"));
        assert_eq!(settings.samples, 10);
        assert_eq!(settings.mock.seed, 7);
        assert_eq!(settings.channels, 2);
    }

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let settings = CounterSettings::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(settings, CounterSettings::default());
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channels = 3").unwrap();

        std::env::set_var("COUNTER_CHANNELS", "4");
        std::env::set_var("COUNTER_MOCK__SEED", "99");
        let result = CounterSettings::load(Some(file.path()));
        clear_env();

        let settings = result.unwrap();
        assert_eq!(settings.channels, 4);
        assert_eq!(settings.mock.seed, 99);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_values() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channels = 0").unwrap();
        let err = CounterSettings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CounterError::Configuration(_)));

        let settings = CounterSettings {
            default_impedance: 10,
            ..CounterSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = CounterSettings {
            log_level: "verbose".to_string(),
            ..CounterSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_type_mismatch_is_settings_error() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"channels = "two""#).unwrap();
        let err = CounterSettings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, CounterError::Settings(_)));
    }
}
