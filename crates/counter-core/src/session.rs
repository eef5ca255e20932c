//! Instrument session state.

use crate::error::{CounterError, CounterResult, SessionState};
use crate::interface::Interface;
use crate::schema::{SchemaContext, TriggerLevel};
use crate::settings::CounterSettings;
use std::collections::BTreeMap;
use std::time::Duration;

/// One connection to one instrument.
///
/// A session is bound to a single interface and port for its whole life and
/// moves `Closed -> Open -> Closed`. Dropping an open session does not close
/// the instrument; call [`crate::FrequencyCounter::close`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSession {
    interface: Interface,
    port: String,
    name: Option<String>,
    channel_count: u8,
    default_samples: u32,
    default_interval: Duration,
    debug: bool,
    default_impedance: u32,
    state: SessionState,
    triggers: BTreeMap<u8, TriggerLevel>,
}

impl InstrumentSession {
    /// Closed session with default parameters.
    pub fn new(interface: Interface, port: impl Into<String>) -> Self {
        Self {
            interface,
            port: port.into(),
            name: None,
            channel_count: 2,
            default_samples: 1,
            default_interval: Duration::from_millis(1000),
            debug: false,
            default_impedance: 1_000_000,
            state: SessionState::Closed,
            triggers: BTreeMap::new(),
        }
    }

    /// Closed session configured from settings.
    pub fn from_settings(settings: &CounterSettings) -> Self {
        Self {
            name: settings.name.clone(),
            channel_count: settings.channels,
            default_samples: settings.samples,
            default_interval: Duration::from_millis(settings.interval_ms),
            debug: settings.debug,
            default_impedance: settings.default_impedance,
            ..Self::new(settings.interface, settings.port.clone())
        }
    }

    /// Set the instrument name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the number of input channels.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channel_count = channels;
        self
    }

    /// Set the default sample count.
    pub fn with_default_samples(mut self, samples: u32) -> Self {
        self.default_samples = samples;
        self
    }

    /// Set the default inter-sample interval.
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Enable or disable traffic logging at info level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the default input impedance in ohms.
    pub fn with_default_impedance(mut self, ohms: u32) -> Self {
        self.default_impedance = ohms;
        self
    }

    /// Interface kind.
    pub fn interface(&self) -> Interface {
        self.interface
    }

    /// Port identifier.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Human-readable name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of input channels.
    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// Default sample count.
    pub fn default_samples(&self) -> u32 {
        self.default_samples
    }

    /// Default interval between samples.
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Whether instrument traffic is logged at info level.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Default input impedance in ohms.
    pub fn default_impedance(&self) -> u32 {
        self.default_impedance
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True when the session is open.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Trigger levels applied since the last reset, by channel.
    pub fn trigger_config(&self) -> &BTreeMap<u8, TriggerLevel> {
        &self.triggers
    }

    /// Fail with [`CounterError::NotConnected`] unless open.
    pub fn ensure_open(&self) -> CounterResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CounterError::NotConnected {
                port: self.port.clone(),
            })
        }
    }

    /// Session-dependent inputs to schema validation.
    pub fn schema_context(&self) -> SchemaContext {
        SchemaContext {
            channel_count: self.channel_count,
            default_samples: self.default_samples,
            default_impedance: self.default_impedance,
        }
    }

    /// Display label for log lines.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({}:{})", name, self.interface, self.port),
            None => format!("{}:{}", self.interface, self.port),
        }
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn record_trigger(&mut self, channel: u8, level: TriggerLevel) {
        self.triggers.insert(channel, level);
    }

    pub(crate) fn clear_triggers(&mut self) {
        self.triggers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = InstrumentSession::new(Interface::Usb, "/dev/usbtmc0");
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.channel_count(), 2);
        assert_eq!(session.default_samples(), 1);
        assert_eq!(session.default_interval(), Duration::from_secs(1));
        assert!(!session.debug());
        assert!(session.trigger_config().is_empty());
    }

    #[test]
    fn test_closed_session_is_not_connected() {
        let session = InstrumentSession::new(Interface::Vxi11, "10.0.0.5");
        let err = session.ensure_open().unwrap_err();
        assert!(matches!(err, CounterError::NotConnected { ref port } if port == "10.0.0.5"));
    }

    #[test]
    fn test_from_settings() {
        let settings = CounterSettings {
            interface: Interface::UsbAcm,
            port: "/dev/ttyACM0".to_string(),
            name: Some("ch-counter".to_string()),
            channels: 3,
            samples: 8,
            ..CounterSettings::default()
        };
        let session = InstrumentSession::from_settings(&settings);
        assert_eq!(session.interface(), Interface::UsbAcm);
        assert_eq!(session.name(), Some("ch-counter"));
        assert_eq!(
            session.schema_context(),
            SchemaContext {
                channel_count: 3,
                default_samples: 8,
                default_impedance: 1_000_000,
            }
        );
        assert_eq!(session.label(), "ch-counter (usb_acm:/dev/ttyACM0)");
    }
}
