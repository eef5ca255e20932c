//! SCPI frequency counter driver.
//!
//! Translates validated operation parameters into SCPI command text for
//! universal counters of the 53200 family and compatibles, and parses their
//! comma-separated readings.
//!
//! ## Command map
//!
//! | Operation      | Commands                                                                 |
//! |----------------|--------------------------------------------------------------------------|
//! | reset          | `*RST;*CLS`                                                              |
//! | trigger        | `INP<ch>:LEV:AUTO OFF`, `INP<ch>:LEV <v>` or `INP<ch>:LEV:AUTO ON`, `INP<ch>:LEV:REL <pct>` |
//! | freq           | `INP<ch>:COUP`, `CONF:FREQ <exp>,<res>,(@ch)`, `SAMP:COUN`, `READ?`      |
//! | period         | `CONF:PER (@ch)`, `SAMP:COUN`, `READ?`                                   |
//! | time interval  | `INP<n>:COUP`, `INP<n>:IMP`, `CONF:TINT (@ref),(@ch)`, `SAMP:COUN`, `FORM:TINF`, `READ?` |
//! | freq ratio     | `CONF:FREQ:RAT DEF,<res>,(@ch),(@ref)`, `SAMP:COUN`, `READ?`             |
//! | peak-to-peak   | `INP<ch>:LEV:MAX?`, `INP<ch>:LEV:MIN?`                                   |

use crate::transport::open_transport;
use counter_core::{
    CounterError, CounterResult, CounterSettings, FreqParams, FreqRatioParams, FrequencyCounter,
    InstrumentSession, MeasuredData, MeasurementKind, PeriodParams, PkToPkParams, Sample,
    TimeIntervalParams, Transport, TriggerLevel,
};
use std::fmt;
use std::io;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Opens a transport for a session.
pub type Connector = Box<dyn FnMut(&InstrumentSession) -> io::Result<Box<dyn Transport>> + Send>;

/// SCPI counter bound to one session.
pub struct ScpiCounter {
    session: InstrumentSession,
    connector: Connector,
    transport: Option<Box<dyn Transport>>,
    identity: Option<String>,
}

impl ScpiCounter {
    /// Counter that opens the transport matching the session interface.
    pub fn new(session: InstrumentSession, timeout: Duration) -> Self {
        Self::with_connector(session, move |s: &InstrumentSession| {
            open_transport(s.interface(), s.port(), timeout)
        })
    }

    /// Counter configured from settings.
    pub fn from_settings(settings: &CounterSettings) -> Self {
        Self::new(
            InstrumentSession::from_settings(settings),
            Duration::from_millis(settings.timeout_ms),
        )
    }

    /// Counter using a custom transport factory.
    pub fn with_connector<F>(session: InstrumentSession, connector: F) -> Self
    where
        F: FnMut(&InstrumentSession) -> io::Result<Box<dyn Transport>> + Send + 'static,
    {
        Self {
            session,
            connector: Box::new(connector),
            transport: None,
            identity: None,
        }
    }

    /// `*IDN?` response captured on connect.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn transport_error(&self, source: io::Error) -> CounterError {
        CounterError::transport(self.session.port(), source)
    }

    fn link(&mut self) -> CounterResult<&mut Box<dyn Transport>> {
        let port = self.session.port();
        self.transport.as_mut().ok_or_else(|| CounterError::NotConnected {
            port: port.to_string(),
        })
    }

    fn log_traffic(&self, direction: &str, line: &str) {
        if self.session.debug() {
            info!(port = self.session.port(), "SCPI {} {:?}", direction, line);
        } else {
            debug!(port = self.session.port(), "SCPI {} {:?}", direction, line);
        }
    }

    fn write(&mut self, command: &str) -> CounterResult<()> {
        self.log_traffic("write", command);
        let result = self.link()?.write_line(command);
        result.map_err(|e| self.transport_error(e))
    }

    fn query(&mut self, command: &str) -> CounterResult<String> {
        self.log_traffic("query", command);
        let result = self.link()?.query(command);
        let response = result.map_err(|e| self.transport_error(e))?;
        self.log_traffic("response", &response);
        Ok(response)
    }

    fn query_f64(&mut self, command: &str) -> CounterResult<f64> {
        let response = self.query(command)?;
        parse_number(command, &response)
    }

    fn read(&mut self, timestamps: bool) -> CounterResult<Vec<Sample>> {
        let response = self.query("READ?")?;
        parse_readings("READ?", &response, timestamps)
    }
}

impl fmt::Debug for ScpiCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScpiCounter")
            .field("session", &self.session)
            .field("connected", &self.transport.is_some())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Format a number the way SCPI numeric parameters are usually written.
fn scpi_number(value: f64) -> String {
    format!("{:E}", value)
}

/// Absolute resolution for `digits` significant digits of `expected`.
fn absolute_resolution(expected: f64, digits: u8) -> f64 {
    let magnitude = expected.abs().log10().floor() as i32;
    let exponent = magnitude + 1 - i32::from(digits);
    if exponent >= 0 {
        10f64.powi(exponent)
    } else {
        1.0 / 10f64.powi(-exponent)
    }
}

fn parse_number(command: &str, text: &str) -> CounterResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| CounterError::InvalidResponse {
            command: command.to_string(),
            response: text.to_string(),
        })
}

/// Parse a comma-separated reading list.
///
/// With `timestamps` the list alternates value and timestamp.
pub fn parse_readings(command: &str, response: &str, timestamps: bool) -> CounterResult<Vec<Sample>> {
    let invalid = || CounterError::InvalidResponse {
        command: command.to_string(),
        response: response.to_string(),
    };

    if response.trim().is_empty() {
        return Err(invalid());
    }
    let numbers = response
        .split(',')
        .map(|field| parse_number(command, field).map_err(|_| invalid()))
        .collect::<CounterResult<Vec<f64>>>()?;

    if !timestamps {
        return Ok(numbers.into_iter().map(Sample::new).collect());
    }
    if numbers.len() % 2 != 0 {
        return Err(invalid());
    }
    Ok(numbers
        .chunks_exact(2)
        .map(|pair| Sample::with_timestamp(pair[0], pair[1]))
        .collect())
}

impl FrequencyCounter for ScpiCounter {
    fn session(&self) -> &InstrumentSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut InstrumentSession {
        &mut self.session
    }

    #[instrument(skip(self), fields(port = %self.session.port()), err)]
    fn connect(&mut self) -> CounterResult<()> {
        let transport = (self.connector)(&self.session).map_err(|e| self.transport_error(e))?;
        self.transport = Some(transport);

        match self.query("*IDN?") {
            Ok(idn) => {
                info!(identity = %idn, "SCPI counter identified");
                self.identity = Some(idn);
                Ok(())
            }
            Err(e) => {
                self.transport = None;
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) -> CounterResult<()> {
        self.transport = None;
        self.identity = None;
        Ok(())
    }

    #[instrument(skip(self), err)]
    fn reset(&mut self) -> CounterResult<()> {
        self.write("*RST;*CLS")
    }

    #[instrument(skip(self), err)]
    fn apply_trigger(&mut self, channel: u8, level: TriggerLevel) -> CounterResult<()> {
        match level {
            TriggerLevel::Volts(volts) => {
                self.write(&format!("INP{}:LEV:AUTO OFF", channel))?;
                self.write(&format!("INP{}:LEV {}", channel, scpi_number(volts)))
            }
            TriggerLevel::Auto { percent } => {
                self.write(&format!("INP{}:LEV:AUTO ON", channel))?;
                self.write(&format!("INP{}:LEV:REL {}", channel, percent))
            }
        }
    }

    #[instrument(skip(self), err)]
    fn measure_freq(&mut self, params: &FreqParams) -> CounterResult<MeasuredData> {
        let expected = params.expected_hz.map_or_else(|| "DEF".to_string(), scpi_number);
        let resolution = match (params.expected_hz, params.resolution_digits) {
            (Some(hz), Some(digits)) => scpi_number(absolute_resolution(hz, digits)),
            (None, Some(digits)) => {
                warn!(digits, "Resolution needs an expected frequency, using instrument default");
                "DEF".to_string()
            }
            _ => "DEF".to_string(),
        };

        self.write(&format!("INP{}:COUP {}", params.channel, params.coupling))?;
        self.write(&format!(
            "CONF:FREQ {},{},(@{})",
            expected, resolution, params.channel
        ))?;
        self.write(&format!("SAMP:COUN {}", params.samples))?;
        let samples = self.read(false)?;

        Ok(MeasuredData::new(
            MeasurementKind::Frequency,
            vec![params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_period(&mut self, params: &PeriodParams) -> CounterResult<MeasuredData> {
        let count = self.session.default_samples();
        self.write(&format!("CONF:PER (@{})", params.channel))?;
        self.write(&format!("SAMP:COUN {}", count))?;
        let samples = self.read(false)?;

        Ok(MeasuredData::new(
            MeasurementKind::Period,
            vec![params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_time_interval(&mut self, params: &TimeIntervalParams) -> CounterResult<MeasuredData> {
        for ch in [params.reference, params.channel] {
            self.write(&format!("INP{}:COUP {}", ch, params.coupling))?;
            self.write(&format!("INP{}:IMP {}", ch, params.impedance_ohms))?;
        }
        self.write(&format!(
            "CONF:TINT (@{}),(@{})",
            params.reference, params.channel
        ))?;
        self.write(&format!("SAMP:COUN {}", params.samples))?;
        self.write(if params.timestamps {
            "FORM:TINF ON"
        } else {
            "FORM:TINF OFF"
        })?;
        let samples = self.read(params.timestamps)?;

        Ok(MeasuredData::new(
            MeasurementKind::TimeInterval,
            vec![params.reference, params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_freq_ratio(&mut self, params: &FreqRatioParams) -> CounterResult<MeasuredData> {
        let resolution = params
            .resolution_digits
            .map_or_else(|| "DEF".to_string(), |digits| scpi_number(absolute_resolution(1.0, digits)));

        self.write(&format!(
            "CONF:FREQ:RAT DEF,{},(@{}),(@{})",
            resolution, params.channel, params.reference
        ))?;
        self.write(&format!("SAMP:COUN {}", params.samples))?;
        let samples = self.read(false)?;

        Ok(MeasuredData::new(
            MeasurementKind::FrequencyRatio,
            vec![params.reference, params.channel],
            samples,
        ))
    }

    #[instrument(skip(self), err)]
    fn measure_pk_to_pk(&mut self, params: &PkToPkParams) -> CounterResult<MeasuredData> {
        let max = self.query_f64(&format!("INP{}:LEV:MAX?", params.channel))?;
        let min = self.query_f64(&format!("INP{}:LEV:MIN?", params.channel))?;

        Ok(MeasuredData::new(
            MeasurementKind::PeakToPeak,
            vec![params.channel],
            vec![Sample::new(max - min)],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scpi_number() {
        assert_eq!(scpi_number(125e6), "1.25E8");
        assert_eq!(scpi_number(-0.5), "-5E-1");
    }

    #[test]
    fn test_absolute_resolution() {
        assert!((absolute_resolution(10e6, 5) - 1000.0).abs() < 1e-9);
        assert!((absolute_resolution(1.0, 10) - 1e-9).abs() < 1e-21);
    }

    #[test]
    fn test_parse_readings_plain() {
        let samples = parse_readings("READ?", "+1.00000000000000E+07,+1.00000010000000E+07", false).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 1e7);
        assert_eq!(samples[1].timestamp, None);
    }

    #[test]
    fn test_parse_readings_with_timestamps() {
        let samples = parse_readings("READ?", "1.5E-7,0.0,1.6E-7,1.0E-3", true).unwrap();
        assert_eq!(samples, vec![Sample::with_timestamp(1.5e-7, 0.0), Sample::with_timestamp(1.6e-7, 1e-3)]);
    }

    #[test]
    fn test_parse_readings_rejects_garbage() {
        for bad in ["", "abc", "1.0,,2.0", "9.9E37,oops"] {
            assert!(
                matches!(
                    parse_readings("READ?", bad, false),
                    Err(CounterError::InvalidResponse { .. })
                ),
                "{:?}",
                bad
            );
        }
        assert!(parse_readings("READ?", "1.0,2.0,3.0", true).is_err());
    }
}
