//! Contract-level tests against a recording driver.
//!
//! The driver records every hook call so tests can check that state and
//! validation errors never reach the instrument.

use counter_core::*;
use std::io;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Disconnect,
    Reset,
    Trigger(u8, TriggerLevel),
    Freq(FreqParams),
    Period(PeriodParams),
    TimeInterval(TimeIntervalParams),
    FreqRatio(FreqRatioParams),
    PkToPk(PkToPkParams),
}

struct RecordingCounter {
    session: InstrumentSession,
    calls: Vec<Call>,
    fail_hooks: bool,
}

impl RecordingCounter {
    fn new() -> Self {
        Self {
            session: InstrumentSession::new(Interface::Usb, "/dev/usbtmc0"),
            calls: Vec::new(),
            fail_hooks: false,
        }
    }

    fn opened() -> Self {
        let mut counter = Self::new();
        counter.open().unwrap();
        counter.calls.clear();
        counter
    }

    fn record(&mut self, call: Call) -> CounterResult<()> {
        self.calls.push(call);
        if self.fail_hooks {
            return Err(CounterError::transport(
                self.session.port(),
                io::Error::new(io::ErrorKind::TimedOut, "no response"),
            ));
        }
        Ok(())
    }

    fn data(&mut self, call: Call, kind: MeasurementKind, channels: Vec<u8>) -> CounterResult<MeasuredData> {
        self.record(call)?;
        Ok(MeasuredData::new(kind, channels, vec![Sample::new(1.0)]))
    }
}

impl FrequencyCounter for RecordingCounter {
    fn session(&self) -> &InstrumentSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    fn connect(&mut self) -> CounterResult<()> {
        self.record(Call::Connect)
    }

    fn disconnect(&mut self) -> CounterResult<()> {
        self.record(Call::Disconnect)
    }

    fn reset(&mut self) -> CounterResult<()> {
        self.record(Call::Reset)
    }

    fn apply_trigger(&mut self, channel: u8, level: TriggerLevel) -> CounterResult<()> {
        self.record(Call::Trigger(channel, level))
    }

    fn measure_freq(&mut self, p: &FreqParams) -> CounterResult<MeasuredData> {
        self.data(Call::Freq(p.clone()), MeasurementKind::Frequency, vec![p.channel])
    }

    fn measure_period(&mut self, p: &PeriodParams) -> CounterResult<MeasuredData> {
        self.data(Call::Period(p.clone()), MeasurementKind::Period, vec![p.channel])
    }

    fn measure_time_interval(&mut self, p: &TimeIntervalParams) -> CounterResult<MeasuredData> {
        self.data(
            Call::TimeInterval(p.clone()),
            MeasurementKind::TimeInterval,
            vec![p.reference, p.channel],
        )
    }

    fn measure_freq_ratio(&mut self, p: &FreqRatioParams) -> CounterResult<MeasuredData> {
        self.data(
            Call::FreqRatio(p.clone()),
            MeasurementKind::FrequencyRatio,
            vec![p.reference, p.channel],
        )
    }

    fn measure_pk_to_pk(&mut self, p: &PkToPkParams) -> CounterResult<MeasuredData> {
        self.data(Call::PkToPk(p.clone()), MeasurementKind::PeakToPeak, vec![p.channel])
    }
}

fn sentinel() -> MeasuredData {
    MeasuredData::new(MeasurementKind::Period, vec![9], vec![Sample::new(-1.0)])
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_open_close_cycle() {
    let mut counter = RecordingCounter::new();
    assert_eq!(counter.session().state(), SessionState::Closed);

    counter.open().unwrap();
    assert!(counter.session().is_open());

    counter.close().unwrap();
    assert_eq!(counter.session().state(), SessionState::Closed);
    assert_eq!(counter.calls, vec![Call::Connect, Call::Disconnect]);

    counter.open().unwrap();
    assert!(counter.session().is_open());
}

#[test]
fn test_open_twice_is_invalid_state() {
    let mut counter = RecordingCounter::opened();
    let err = counter.open().unwrap_err();
    assert!(matches!(
        err,
        CounterError::InvalidState { operation: "open", state: SessionState::Open }
    ));
    assert!(counter.calls.is_empty());
}

#[test]
fn test_close_while_closed_is_invalid_state() {
    let mut counter = RecordingCounter::new();
    let err = counter.close().unwrap_err();
    assert!(matches!(err, CounterError::InvalidState { operation: "close", .. }));
    assert!(counter.calls.is_empty());
}

#[test]
fn test_failed_connect_stays_closed() {
    let mut counter = RecordingCounter::new();
    counter.fail_hooks = true;
    let err = counter.open().unwrap_err();
    assert!(err.is_transport_failure());
    assert_eq!(counter.session().state(), SessionState::Closed);
}

#[test]
fn test_operations_on_closed_session_are_not_connected() {
    let mut counter = RecordingCounter::new();
    let mut data = sentinel();

    assert!(matches!(
        counter.freq(Some("ch:1 cou:dc"), &mut data),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(
        counter.period(Some("garbage"), &mut data),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(
        counter.time_interval(Some("ref:A ch:2"), &mut data),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(
        counter.freq_ratio(Some("ref:1"), &mut data),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(
        counter.pk_to_pk(Some("ch:1"), &mut data),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(
        counter.trig_level(Some("trig1:a50")),
        Err(CounterError::NotConnected { .. })
    ));
    assert!(matches!(counter.reset_device(), Err(CounterError::NotConnected { .. })));

    assert_eq!(data, sentinel());
    assert!(counter.calls.is_empty());
}

// =============================================================================
// Validation before I/O
// =============================================================================

#[test]
fn test_validation_failure_issues_no_command() {
    let mut counter = RecordingCounter::opened();
    let mut data = sentinel();

    let cases: Vec<(&str, CounterResult<()>)> = vec![
        ("freq res:20", counter.freq(Some("ch:1 cou:dc res:20"), &mut data)),
        ("freq missing cou", counter.freq(Some("ch:1"), &mut data)),
        ("period malformed", counter.period(Some("ch1"), &mut data)),
        ("interval inconsistent", counter.time_interval(Some("ref:A ch:1"), &mut data)),
        ("ratio bad ref", counter.freq_ratio(Some("ref:3"), &mut data)),
        ("pk missing ch", counter.pk_to_pk(None, &mut data)),
    ];

    for (name, result) in cases {
        let err = result.unwrap_err();
        assert!(err.is_validation_error(), "{}: {}", name, err);
    }
    assert!(counter.trig_level(Some("trig1:xyz")).unwrap_err().is_validation_error());

    assert!(counter.calls.is_empty());
    assert_eq!(data, sentinel());
}

#[test]
fn test_freq_passes_typed_params() {
    let mut counter = RecordingCounter::opened();
    let mut data = MeasuredData::default();
    counter.freq(Some("ch:1 cou:dc exp:125E6"), &mut data).unwrap();

    assert_eq!(
        counter.calls,
        vec![Call::Freq(FreqParams {
            channel: 1,
            coupling: Coupling::Dc,
            expected_hz: Some(125e6),
            resolution_digits: None,
            samples: 1,
        })]
    );
    assert_eq!(data.kind, Some(MeasurementKind::Frequency));
}

#[test]
fn test_time_interval_consistent_channels() {
    let mut counter = RecordingCounter::opened();
    let mut data = MeasuredData::default();
    counter.time_interval(Some("ref:A ch:2"), &mut data).unwrap();
    assert_eq!(data.channels, vec![1, 2]);
}

#[test]
fn test_hook_failure_leaves_container_untouched() {
    let mut counter = RecordingCounter::opened();
    counter.fail_hooks = true;
    let mut data = sentinel();

    let err = counter.freq(Some("ch:1 cou:ac"), &mut data).unwrap_err();
    assert!(err.is_transport_failure());
    assert_eq!(data, sentinel());
}

// =============================================================================
// Trigger configuration
// =============================================================================

#[test]
fn test_trig_level_merges_and_reset_clears() {
    let mut counter = RecordingCounter::opened();

    counter.trig_level(Some("trig1:a50")).unwrap();
    counter.trig_level(Some("trig2:0.25")).unwrap();
    counter.trig_level(Some("trig1:1.5")).unwrap();

    let config = counter.session().trigger_config();
    assert_eq!(config.get(&1), Some(&TriggerLevel::Volts(1.5)));
    assert_eq!(config.get(&2), Some(&TriggerLevel::Volts(0.25)));

    counter.reset_device().unwrap();
    assert!(counter.session().trigger_config().is_empty());
    assert!(counter.session().is_open());
    assert_eq!(counter.calls.last(), Some(&Call::Reset));
}

#[test]
fn test_measurements_do_not_change_trigger_config() {
    let mut counter = RecordingCounter::opened();
    counter.trig_level(Some("trig1:a30 trig2:a70")).unwrap();
    let before = counter.session().trigger_config().clone();

    let mut data = MeasuredData::default();
    counter.freq_ratio(Some("ref:1"), &mut data).unwrap();
    counter.pk_to_pk(Some("ch:2"), &mut data).unwrap();

    assert_eq!(counter.session().trigger_config(), &before);
}

#[test]
fn test_absent_config_string_degrades_to_missing_key() {
    let mut counter = RecordingCounter::opened();
    let err = counter.trig_level(None).unwrap_err();
    assert!(matches!(err, CounterError::MissingRequiredKey { operation: "trigLevel", .. }));
}
