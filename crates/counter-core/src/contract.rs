//! The frequency-counter contract.
//!
//! [`FrequencyCounter`] is split in two layers:
//!
//! - **Operations** (provided methods): `open`, `close`, `reset_device`,
//!   `trig_level` and the five measurements. They enforce the session state
//!   machine, parse and validate the configuration string and replace the
//!   caller's [`MeasuredData`] only when the whole operation succeeded.
//! - **Hooks** (required methods): instrument-specific work such as
//!   connecting or issuing a measurement. Hooks receive already validated,
//!   typed parameters and are never called when validation fails.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut counter = MockCounter::new(InstrumentSession::new(Interface::Usb, "/dev/usbtmc0"));
//! counter.open()?;
//! let mut data = MeasuredData::default();
//! counter.freq(Some("ch:1 cou:dc sampl:10"), &mut data)?;
//! println!("{} {}", data.mean().unwrap_or_default(), data.unit);
//! counter.close()?;
//! ```

use crate::config_string::parse;
use crate::error::{CounterError, CounterResult, SessionState};
use crate::measurement::MeasuredData;
use crate::params::{
    FreqParams, FreqRatioParams, OperationParams, PeriodParams, PkToPkParams, TimeIntervalParams,
    TrigLevelParams,
};
use crate::schema::TriggerLevel;
use crate::session::InstrumentSession;
use tracing::{debug, info, warn};

/// Control contract of a frequency-counter/timer instrument.
pub trait FrequencyCounter: Send {
    /// Session this driver is bound to.
    fn session(&self) -> &InstrumentSession;

    /// Mutable access to the session.
    fn session_mut(&mut self) -> &mut InstrumentSession;

    // =========================================================================
    // Hooks
    // =========================================================================

    /// Establish the connection.
    fn connect(&mut self) -> CounterResult<()>;

    /// Release the connection.
    fn disconnect(&mut self) -> CounterResult<()>;

    /// Restore instrument defaults.
    fn reset(&mut self) -> CounterResult<()>;

    /// Apply one channel's trigger level.
    fn apply_trigger(&mut self, channel: u8, level: TriggerLevel) -> CounterResult<()>;

    /// Measure frequency.
    fn measure_freq(&mut self, params: &FreqParams) -> CounterResult<MeasuredData>;

    /// Measure period.
    fn measure_period(&mut self, params: &PeriodParams) -> CounterResult<MeasuredData>;

    /// Measure the interval from the reference edge to the measured edge.
    fn measure_time_interval(&mut self, params: &TimeIntervalParams) -> CounterResult<MeasuredData>;

    /// Measure the ratio of the measured to the reference frequency.
    fn measure_freq_ratio(&mut self, params: &FreqRatioParams) -> CounterResult<MeasuredData>;

    /// Measure peak-to-peak voltage.
    fn measure_pk_to_pk(&mut self, params: &PkToPkParams) -> CounterResult<MeasuredData>;

    // =========================================================================
    // Operations
    // =========================================================================

    /// Open the session. Legal only while closed.
    fn open(&mut self) -> CounterResult<()> {
        let state = self.session().state();
        if state != SessionState::Closed {
            return Err(CounterError::InvalidState {
                operation: "open",
                state,
            });
        }
        self.connect()?;
        self.session_mut().set_state(SessionState::Open);
        info!(instrument = %self.session().label(), "Counter session opened");
        Ok(())
    }

    /// Close the session. Legal only while open.
    ///
    /// The session is marked closed even if the disconnect hook fails; the
    /// hook's error is still returned.
    fn close(&mut self) -> CounterResult<()> {
        let state = self.session().state();
        if state != SessionState::Open {
            return Err(CounterError::InvalidState {
                operation: "close",
                state,
            });
        }
        let result = self.disconnect();
        self.session_mut().set_state(SessionState::Closed);
        match &result {
            Ok(()) => info!(instrument = %self.session().label(), "Counter session closed"),
            Err(e) => warn!(instrument = %self.session().label(), error = %e, "Counter session closed with error"),
        }
        result
    }

    /// Restore instrument defaults and forget applied trigger levels.
    fn reset_device(&mut self) -> CounterResult<()> {
        self.session().ensure_open()?;
        self.reset()?;
        self.session_mut().clear_triggers();
        info!(instrument = %self.session().label(), "Counter reset to defaults");
        Ok(())
    }

    /// Apply the trigger levels named by `trig<ch>` keys.
    ///
    /// Levels are applied in channel order and recorded in the session as each
    /// one succeeds.
    fn trig_level(&mut self, cfgstr: Option<&str>) -> CounterResult<()> {
        self.session().ensure_open()?;
        let params: TrigLevelParams = validated(self.session(), cfgstr)?;
        for (channel, level) in params.levels {
            self.apply_trigger(channel, level)?;
            self.session_mut().record_trigger(channel, level);
            debug!(channel, %level, "Trigger level applied");
        }
        Ok(())
    }

    /// Measure frequency.
    fn freq(&mut self, cfgstr: Option<&str>, out: &mut MeasuredData) -> CounterResult<()> {
        measure(self, cfgstr, out, |c, p: &FreqParams| c.measure_freq(p))
    }

    /// Measure period.
    fn period(&mut self, cfgstr: Option<&str>, out: &mut MeasuredData) -> CounterResult<()> {
        measure(self, cfgstr, out, |c, p: &PeriodParams| c.measure_period(p))
    }

    /// Measure the interval between the reference and measured channels.
    fn time_interval(&mut self, cfgstr: Option<&str>, out: &mut MeasuredData) -> CounterResult<()> {
        measure(self, cfgstr, out, |c, p: &TimeIntervalParams| {
            c.measure_time_interval(p)
        })
    }

    /// Measure the frequency ratio of the other channel to the reference.
    fn freq_ratio(&mut self, cfgstr: Option<&str>, out: &mut MeasuredData) -> CounterResult<()> {
        measure(self, cfgstr, out, |c, p: &FreqRatioParams| c.measure_freq_ratio(p))
    }

    /// Measure peak-to-peak voltage.
    fn pk_to_pk(&mut self, cfgstr: Option<&str>, out: &mut MeasuredData) -> CounterResult<()> {
        measure(self, cfgstr, out, |c, p: &PkToPkParams| c.measure_pk_to_pk(p))
    }
}

fn validated<P: OperationParams>(session: &InstrumentSession, cfgstr: Option<&str>) -> CounterResult<P> {
    let map = parse(cfgstr)?;
    P::from_config(&map, &session.schema_context())
}

fn measure<C, P, F>(counter: &mut C, cfgstr: Option<&str>, out: &mut MeasuredData, hook: F) -> CounterResult<()>
where
    C: FrequencyCounter + ?Sized,
    P: OperationParams + std::fmt::Debug,
    F: FnOnce(&mut C, &P) -> CounterResult<MeasuredData>,
{
    counter.session().ensure_open()?;
    let params: P = validated(counter.session(), cfgstr)?;
    debug!(operation = P::OPERATION, ?params, "Running measurement");
    let data = hook(counter, &params)?;
    *out = data;
    Ok(())
}
