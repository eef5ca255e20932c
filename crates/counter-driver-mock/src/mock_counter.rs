//! Simulated two-or-more channel frequency counter.
//!
//! Each channel carries an ideal periodic signal described by a
//! [`ChannelSignal`]. Readings are derived from the signal model with
//! seeded multiplicative noise, so runs with the same seed are identical.
//!
//! Trigger levels matter: a fixed level outside the signal swing never
//! produces an edge, and any measurement needing that channel times out.
//!
//! # Example
//!
//! ```
//! use counter_core::{FrequencyCounter, InstrumentSession, Interface, MeasuredData};
//! use counter_driver_mock::{ChannelSignal, MockCounter};
//!
//! let session = InstrumentSession::new(Interface::Usb, "/dev/usbtmc0");
//! let mut counter = MockCounter::builder(session)
//!     .signal(1, ChannelSignal::new(1e6))
//!     .noise(0.0)
//!     .build();
//!
//! counter.open().unwrap();
//! let mut data = MeasuredData::default();
//! counter.freq(Some("ch:1 cou:dc sampl:4"), &mut data).unwrap();
//! assert_eq!(data.len(), 4);
//! assert_eq!(data.mean(), Some(1e6));
//! ```

use crate::faults::FaultConfig;
use crate::rng::MockRng;
use counter_core::{
    CounterError, CounterResult, CounterSettings, FreqParams, FreqRatioParams, FrequencyCounter,
    InstrumentSession, MeasuredData, MeasurementKind, PeriodParams, PkToPkParams, Sample,
    TimeIntervalParams, TriggerLevel,
};
use std::collections::BTreeMap;
use std::io;
use tracing::{debug, instrument};

/// Ideal periodic signal on one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSignal {
    /// Frequency in hertz.
    pub frequency_hz: f64,
    /// Peak-to-peak amplitude in volts, centered on 0 V.
    pub amplitude_v: f64,
    /// Delay of the rising edge relative to channel time zero, in seconds.
    pub delay_s: f64,
}

impl ChannelSignal {
    /// 1 Vpp signal with no delay.
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            amplitude_v: 1.0,
            delay_s: 0.0,
        }
    }

    /// Set the peak-to-peak amplitude.
    pub fn with_amplitude(mut self, volts: f64) -> Self {
        self.amplitude_v = volts;
        self
    }

    /// Set the edge delay.
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay_s = seconds;
        self
    }

    fn period_s(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    /// True if an edge crosses the given trigger level.
    fn crosses(&self, level: &TriggerLevel) -> bool {
        match level {
            TriggerLevel::Auto { .. } => true,
            TriggerLevel::Volts(v) => v.abs() < self.amplitude_v / 2.0,
        }
    }
}

/// Hook invocations seen by the simulated instrument.
pub type CommandLog = Vec<&'static str>;

/// Simulated frequency counter.
#[derive(Debug)]
pub struct MockCounter {
    session: InstrumentSession,
    signals: BTreeMap<u8, ChannelSignal>,
    noise: f64,
    rng: MockRng,
    faults: FaultConfig,
    commands: CommandLog,
}

impl MockCounter {
    /// Counter with the default signal model.
    pub fn new(session: InstrumentSession) -> Self {
        Self::builder(session).build()
    }

    /// Counter configured from settings.
    pub fn from_settings(settings: &CounterSettings) -> Self {
        let mock = &settings.mock;
        Self::builder(InstrumentSession::from_settings(settings))
            .base_frequency(mock.base_frequency_hz)
            .amplitude(mock.amplitude_v)
            .noise(mock.noise)
            .seed(mock.seed)
            .build()
    }

    /// Start building a counter bound to `session`.
    pub fn builder(session: InstrumentSession) -> MockCounterBuilder {
        MockCounterBuilder::new(session)
    }

    /// Hooks issued so far, oldest first.
    pub fn commands(&self) -> &[&'static str] {
        &self.commands
    }

    /// Forget recorded hooks.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Signal model of `channel`.
    pub fn signal(&self, channel: u8) -> Option<&ChannelSignal> {
        self.signals.get(&channel)
    }

    /// Replace the signal on `channel`.
    pub fn set_signal(&mut self, channel: u8, signal: ChannelSignal) {
        self.signals.insert(channel, signal);
    }

    fn issue(&mut self, operation: &'static str) -> CounterResult<()> {
        self.commands.push(operation);
        self.faults.check(self.session.port(), operation)
    }

    /// Signal on `channel`, failing like a starved gate when no edge arrives.
    fn armed_signal(&self, channel: u8) -> CounterResult<ChannelSignal> {
        let signal = self.signals.get(&channel).copied().ok_or_else(|| no_edges(&self.session, channel))?;
        match self.session.trigger_config().get(&channel) {
            Some(level) if !signal.crosses(level) => Err(no_edges(&self.session, channel)),
            _ => Ok(signal),
        }
    }

    fn noisy(&mut self, value: f64) -> f64 {
        value * self.rng.jitter(self.noise)
    }

    fn series(&mut self, count: u32, value: f64, resolution: Option<u8>) -> Vec<Sample> {
        (0..count)
            .map(|_| {
                let v = self.noisy(value);
                Sample::new(resolution.map_or(v, |digits| round_to_digits(v, digits)))
            })
            .collect()
    }
}

fn no_edges(session: &InstrumentSession, channel: u8) -> CounterError {
    CounterError::transport(
        session.port(),
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no trigger edges on channel {}", channel),
        ),
    )
}

fn round_to_digits(value: f64, digits: u8) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let exponent = i32::from(digits) - 1 - magnitude;
    if exponent >= 0 {
        let scale = 10f64.powi(exponent);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-exponent);
        (value / scale).round() * scale
    }
}

impl FrequencyCounter for MockCounter {
    fn session(&self) -> &InstrumentSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    fn connect(&mut self) -> CounterResult<()> {
        self.issue("connect")?;
        debug!(port = self.session.port(), "Mock counter connected");
        Ok(())
    }

    fn disconnect(&mut self) -> CounterResult<()> {
        self.issue("disconnect")
    }

    fn reset(&mut self) -> CounterResult<()> {
        self.issue("reset")?;
        self.faults.reset();
        Ok(())
    }

    fn apply_trigger(&mut self, channel: u8, level: TriggerLevel) -> CounterResult<()> {
        self.issue("trigger")?;
        debug!(channel, %level, "Mock trigger level set");
        Ok(())
    }

    #[instrument(skip(self), err)]
    fn measure_freq(&mut self, params: &FreqParams) -> CounterResult<MeasuredData> {
        self.issue("freq")?;
        let signal = self.armed_signal(params.channel)?;
        let samples = self.series(params.samples, signal.frequency_hz, params.resolution_digits);
        Ok(MeasuredData::new(
            MeasurementKind::Frequency,
            vec![params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_period(&mut self, params: &PeriodParams) -> CounterResult<MeasuredData> {
        self.issue("period")?;
        let signal = self.armed_signal(params.channel)?;
        let count = self.session.default_samples();
        let samples = self.series(count, signal.period_s(), None);
        Ok(MeasuredData::new(
            MeasurementKind::Period,
            vec![params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_time_interval(&mut self, params: &TimeIntervalParams) -> CounterResult<MeasuredData> {
        self.issue("timeInterval")?;
        let start = self.armed_signal(params.reference)?;
        let stop = self.armed_signal(params.channel)?;

        let interval = (stop.delay_s - start.delay_s).rem_euclid(stop.period_s());

        let spacing = self.session.default_interval().as_secs_f64();
        let samples = (0..params.samples)
            .map(|i| {
                let value = self.noisy(interval);
                if params.timestamps {
                    Sample::with_timestamp(value, f64::from(i) * spacing)
                } else {
                    Sample::new(value)
                }
            })
            .collect();

        Ok(MeasuredData::new(
            MeasurementKind::TimeInterval,
            vec![params.reference, params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_freq_ratio(&mut self, params: &FreqRatioParams) -> CounterResult<MeasuredData> {
        self.issue("freqRatio")?;
        let reference = self.armed_signal(params.reference)?;
        let other = self.armed_signal(params.channel)?;
        let ratio = other.frequency_hz / reference.frequency_hz;
        let samples = self.series(params.samples, ratio, params.resolution_digits);
        Ok(MeasuredData::new(
            MeasurementKind::FrequencyRatio,
            vec![params.reference, params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_pk_to_pk(&mut self, params: &PkToPkParams) -> CounterResult<MeasuredData> {
        self.issue("pkToPk")?;
        let signal = self
            .signals
            .get(&params.channel)
            .copied()
            .ok_or_else(|| no_edges(&self.session, params.channel))?;
        let value = self.noisy(signal.amplitude_v);
        Ok(MeasuredData::new(
            MeasurementKind::PeakToPeak,
            vec![params.channel],
            vec![Sample::new(value)],
        ))
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MockCounter`].
#[derive(Debug)]
pub struct MockCounterBuilder {
    session: InstrumentSession,
    base_frequency_hz: f64,
    amplitude_v: f64,
    signals: BTreeMap<u8, ChannelSignal>,
    noise: f64,
    seed: Option<u64>,
    faults: FaultConfig,
}

impl MockCounterBuilder {
    fn new(session: InstrumentSession) -> Self {
        Self {
            session,
            base_frequency_hz: 10e6,
            amplitude_v: 1.0,
            signals: BTreeMap::new(),
            noise: 1e-6,
            seed: Some(42),
            faults: FaultConfig::none(),
        }
    }

    /// Frequency of channel 1; each further channel doubles it.
    pub fn base_frequency(mut self, hz: f64) -> Self {
        self.base_frequency_hz = hz;
        self
    }

    /// Amplitude of generated channel signals.
    pub fn amplitude(mut self, volts: f64) -> Self {
        self.amplitude_v = volts;
        self
    }

    /// Explicit signal for one channel.
    pub fn signal(mut self, channel: u8, signal: ChannelSignal) -> Self {
        self.signals.insert(channel, signal);
        self
    }

    /// Relative noise on every reading.
    pub fn noise(mut self, relative: f64) -> Self {
        self.noise = relative;
        self
    }

    /// Seed for the noise source.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seed the noise source from the OS.
    pub fn unseeded(mut self) -> Self {
        self.seed = None;
        self
    }

    /// Fault injection.
    pub fn faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    /// Build the counter. Channels without an explicit signal get a generated
    /// one; channel `n` is delayed by `(n - 1) / 10` of the channel 1 period.
    pub fn build(self) -> MockCounter {
        let mut signals = self.signals;
        let base_period = 1.0 / self.base_frequency_hz;
        for ch in 1..=self.session.channel_count() {
            signals.entry(ch).or_insert_with(|| {
                let n = ch - 1;
                ChannelSignal::new(self.base_frequency_hz * 2f64.powi(i32::from(n)))
                    .with_amplitude(self.amplitude_v)
                    .with_delay(f64::from(n) * base_period / 10.0)
            });
        }

        MockCounter {
            session: self.session,
            signals,
            noise: self.noise,
            rng: MockRng::new(self.seed),
            faults: self.faults,
            commands: CommandLog::new(),
        }
    }
}
