//! Parameter contracts of the counter operations.
//!
//! Each operation owns a [`Schema`] and a typed record built from the
//! validated values:
//!
//! | Operation      | Required        | Optional (default)                                     |
//! |----------------|-----------------|--------------------------------------------------------|
//! | `trigLevel`    | `trig<ch>`      |                                                        |
//! | `freq`         | `ch`, `cou`     | `exp` (none), `res` (device), `sampl` (session)        |
//! | `period`       | `ch`            |                                                        |
//! | `timeInterval` | `ref`, `ch`     | `tstamp` (N), `sampl` (1), `coup` (dc), `imp` (session)|
//! | `freqRatio`    | `ref`           | `sampl` (session), `res` (device)                      |
//! | `pkToPk`       | `ch`            |                                                        |

use crate::config_string::ConfigMap;
use crate::error::{CounterError, CounterResult};
use crate::schema::{
    Coupling, Domain, KeySpec, ParamValue, Schema, SchemaContext, TriggerLevel, ValidatedParams,
    RESOLUTION_DIGITS, SAMPLE_COUNT,
};
use std::collections::BTreeMap;

const TIMESTAMP_FLAGS: &[&str] = &["Y", "N"];
const INTERVAL_REFERENCES: &[&str] = &["A", "B", "1", "2"];

fn sample_domain() -> Domain {
    Domain::Integer {
        min: SAMPLE_COUNT.0,
        max: SAMPLE_COUNT.1,
    }
}

fn resolution_domain() -> Domain {
    Domain::Integer {
        min: RESOLUTION_DIGITS.0,
        max: RESOLUTION_DIGITS.1,
    }
}

fn required<T>(value: Option<T>, operation: &'static str, key: &str) -> CounterResult<T> {
    value.ok_or_else(|| CounterError::MissingRequiredKey {
        operation,
        key: key.to_string(),
    })
}

/// The channel compared against `reference` in two-channel measurements.
pub fn counterpart_channel(reference: u8) -> u8 {
    if reference == 1 {
        2
    } else {
        1
    }
}

/// Schema and typed record of one operation.
pub trait OperationParams: Sized {
    /// Operation name as used in configuration errors.
    const OPERATION: &'static str;

    /// Keys accepted by the operation.
    fn schema(ctx: &SchemaContext) -> Schema;

    /// Build the typed record, applying cross-key checks.
    fn from_validated(params: &ValidatedParams) -> CounterResult<Self>;

    /// Validate a raw map and build the typed record.
    fn from_config(map: &ConfigMap, ctx: &SchemaContext) -> CounterResult<Self> {
        let validated = Self::schema(ctx).validate(map, ctx)?;
        Self::from_validated(&validated)
    }
}

// =============================================================================
// trigLevel
// =============================================================================

/// Trigger levels to apply, one per channel named in the string.
#[derive(Debug, Clone, PartialEq)]
pub struct TrigLevelParams {
    /// Channel to threshold.
    pub levels: BTreeMap<u8, TriggerLevel>,
}

impl OperationParams for TrigLevelParams {
    const OPERATION: &'static str = "trigLevel";

    fn schema(_ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION).key(KeySpec::per_channel("trig", Domain::TriggerLevel))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        Ok(Self {
            levels: params.triggers("trig"),
        })
    }
}

// =============================================================================
// freq
// =============================================================================

/// Frequency measurement parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FreqParams {
    /// Input channel.
    pub channel: u8,
    /// Input coupling.
    pub coupling: Coupling,
    /// Expected frequency in hertz, if given.
    pub expected_hz: Option<f64>,
    /// Resolution in digits; `None` keeps the instrument setting.
    pub resolution_digits: Option<u8>,
    /// Number of samples.
    pub samples: u32,
}

impl OperationParams for FreqParams {
    const OPERATION: &'static str = "freq";

    fn schema(ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION)
            .key(KeySpec::required("ch", Domain::Channel))
            .key(KeySpec::required("cou", Domain::Choice(Coupling::VALUES)))
            .key(KeySpec::device_default("exp", Domain::PositiveFloat))
            .key(KeySpec::device_default("res", resolution_domain()))
            .key(KeySpec::optional(
                "sampl",
                sample_domain(),
                ParamValue::Integer(u64::from(ctx.default_samples)),
            ))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        Ok(Self {
            channel: required(params.channel("ch"), Self::OPERATION, "ch")?,
            coupling: required(params.coupling("cou"), Self::OPERATION, "cou")?,
            expected_hz: params.float("exp"),
            resolution_digits: params.integer("res").map(|r| r as u8),
            samples: required(params.integer("sampl"), Self::OPERATION, "sampl")? as u32,
        })
    }
}

// =============================================================================
// period
// =============================================================================

/// Period measurement parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodParams {
    /// Input channel.
    pub channel: u8,
}

impl OperationParams for PeriodParams {
    const OPERATION: &'static str = "period";

    fn schema(_ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION).key(KeySpec::required("ch", Domain::Channel))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        Ok(Self {
            channel: required(params.channel("ch"), Self::OPERATION, "ch")?,
        })
    }
}

// =============================================================================
// timeInterval
// =============================================================================

/// Time-interval measurement parameters.
///
/// `ref:A` (or `ref:1`) makes channel 1 the reference and channel 2 the
/// measured channel; any other reference swaps them. The explicit `ch` must
/// match the measured channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeIntervalParams {
    /// Reference (start) channel.
    pub reference: u8,
    /// Measured (stop) channel.
    pub channel: u8,
    /// Return instrument timestamps with each sample.
    pub timestamps: bool,
    /// Number of samples.
    pub samples: u32,
    /// Input coupling of both channels.
    pub coupling: Coupling,
    /// Input impedance of both channels, in ohms.
    pub impedance_ohms: u32,
}

impl OperationParams for TimeIntervalParams {
    const OPERATION: &'static str = "timeInterval";

    fn schema(ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION)
            .key(KeySpec::required("ref", Domain::Choice(INTERVAL_REFERENCES)))
            .key(KeySpec::required("ch", Domain::Channel))
            .key(KeySpec::optional(
                "tstamp",
                Domain::Choice(TIMESTAMP_FLAGS),
                ParamValue::Choice("N"),
            ))
            .key(KeySpec::optional("sampl", sample_domain(), ParamValue::Integer(1)))
            .key(KeySpec::optional(
                "coup",
                Domain::Choice(Coupling::VALUES),
                ParamValue::Choice("dc"),
            ))
            .key(KeySpec::optional(
                "imp",
                Domain::Impedance,
                ParamValue::Impedance(ctx.default_impedance),
            ))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        let op = Self::OPERATION;
        let reference = match required(params.choice("ref"), op, "ref")? {
            "A" | "1" => 1,
            _ => 2,
        };
        let measured = counterpart_channel(reference);
        let channel = required(params.channel("ch"), op, "ch")?;
        if channel != measured {
            return Err(CounterError::InconsistentChannelSelection {
                reason: format!(
                    "reference channel {} implies measured channel {}, but ch:{} was given",
                    reference, measured, channel
                ),
            });
        }

        Ok(Self {
            reference,
            channel,
            timestamps: required(params.choice("tstamp"), op, "tstamp")? == "Y",
            samples: required(params.integer("sampl"), op, "sampl")? as u32,
            coupling: required(params.coupling("coup"), op, "coup")?,
            impedance_ohms: required(params.impedance("imp"), op, "imp")?,
        })
    }
}

// =============================================================================
// freqRatio
// =============================================================================

/// Frequency-ratio measurement parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FreqRatioParams {
    /// Reference (denominator) channel.
    pub reference: u8,
    /// Other (numerator) channel.
    pub channel: u8,
    /// Number of samples.
    pub samples: u32,
    /// Resolution in digits; `None` keeps the instrument setting.
    pub resolution_digits: Option<u8>,
}

impl OperationParams for FreqRatioParams {
    const OPERATION: &'static str = "freqRatio";

    fn schema(ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION)
            .key(KeySpec::required("ref", Domain::Channel))
            .key(KeySpec::optional(
                "sampl",
                sample_domain(),
                ParamValue::Integer(u64::from(ctx.default_samples)),
            ))
            .key(KeySpec::device_default("res", resolution_domain()))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        let reference = required(params.channel("ref"), Self::OPERATION, "ref")?;
        Ok(Self {
            reference,
            channel: counterpart_channel(reference),
            samples: required(params.integer("sampl"), Self::OPERATION, "sampl")? as u32,
            resolution_digits: params.integer("res").map(|r| r as u8),
        })
    }
}

// =============================================================================
// pkToPk
// =============================================================================

/// Peak-to-peak amplitude parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PkToPkParams {
    /// Input channel.
    pub channel: u8,
}

impl OperationParams for PkToPkParams {
    const OPERATION: &'static str = "pkToPk";

    fn schema(_ctx: &SchemaContext) -> Schema {
        Schema::new(Self::OPERATION).key(KeySpec::required("ch", Domain::Channel))
    }

    fn from_validated(params: &ValidatedParams) -> CounterResult<Self> {
        Ok(Self {
            channel: required(params.channel("ch"), Self::OPERATION, "ch")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_string::parse;

    fn build<P: OperationParams>(s: &str) -> CounterResult<P> {
        let ctx = SchemaContext {
            channel_count: 2,
            default_samples: 4,
            default_impedance: 1_000_000,
        };
        P::from_config(&parse(Some(s))?, &ctx)
    }

    #[test]
    fn test_freq_defaults() {
        let p: FreqParams = build("ch:1 cou:dc").unwrap();
        assert_eq!(p.channel, 1);
        assert_eq!(p.coupling, Coupling::Dc);
        assert_eq!(p.expected_hz, None);
        assert_eq!(p.resolution_digits, None);
        assert_eq!(p.samples, 4);
    }

    #[test]
    fn test_freq_all_keys() {
        let p: FreqParams = build("ch:2 cou:ac exp:125E6 res:12 sampl:100").unwrap();
        assert_eq!(p.channel, 2);
        assert_eq!(p.coupling, Coupling::Ac);
        assert_eq!(p.expected_hz, Some(125e6));
        assert_eq!(p.resolution_digits, Some(12));
        assert_eq!(p.samples, 100);
    }

    #[test]
    fn test_freq_missing_channel() {
        let err = build::<FreqParams>("cou:dc").unwrap_err();
        assert!(matches!(
            err,
            CounterError::MissingRequiredKey { operation: "freq", ref key } if key == "ch"
        ));
    }

    #[test]
    fn test_freq_missing_coupling() {
        let err = build::<FreqParams>("ch:1").unwrap_err();
        assert!(matches!(err, CounterError::MissingRequiredKey { ref key, .. } if key == "cou"));
    }

    #[test]
    fn test_freq_rejects_zero_samples() {
        let err = build::<FreqParams>("ch:1 cou:dc sampl:0").unwrap_err();
        assert!(matches!(err, CounterError::OutOfRangeValue { .. }));
    }

    #[test]
    fn test_freq_rejects_negative_expected() {
        let err = build::<FreqParams>("ch:1 cou:dc exp:-10").unwrap_err();
        assert!(matches!(err, CounterError::OutOfRangeValue { .. }));
    }

    #[test]
    fn test_trig_level_shapes() {
        let p: TrigLevelParams = build("trig1:a50").unwrap();
        assert_eq!(p.levels.get(&1), Some(&TriggerLevel::Auto { percent: 50 }));

        let p: TrigLevelParams = build("trig1:2.5").unwrap();
        assert_eq!(p.levels.get(&1), Some(&TriggerLevel::Volts(2.5)));

        let err = build::<TrigLevelParams>("trig1:xyz").unwrap_err();
        assert!(matches!(err, CounterError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_trig_level_requires_a_trigger_key() {
        let err = build::<TrigLevelParams>("").unwrap_err();
        assert!(matches!(
            err,
            CounterError::MissingRequiredKey { operation: "trigLevel", .. }
        ));
    }

    #[test]
    fn test_trig_level_rejects_same_channel_twice() {
        let err = build::<TrigLevelParams>("trig1:1.0 trig01:a50").unwrap_err();
        assert!(matches!(err, CounterError::DuplicateKey { ref key } if key == "trig01" || key == "trig1"));
    }

    #[test]
    fn test_oversized_values_are_out_of_range() {
        let huge = "99999999999999999999";
        for cfg in [
            format!("ch:1 cou:dc sampl:{}", huge),
            format!("ch:1 cou:dc res:{}", huge),
        ] {
            let err = build::<FreqParams>(&cfg).unwrap_err();
            assert!(matches!(err, CounterError::OutOfRangeValue { .. }), "{}", cfg);
        }
        let err = build::<TimeIntervalParams>(&format!("ref:A ch:2 imp:{}", huge)).unwrap_err();
        assert!(matches!(err, CounterError::OutOfRangeValue { ref key, .. } if key == "imp"));
    }

    #[test]
    fn test_period_and_pk_to_pk() {
        let p: PeriodParams = build("ch:2").unwrap();
        assert_eq!(p.channel, 2);
        let p: PkToPkParams = build("ch:1").unwrap();
        assert_eq!(p.channel, 1);
        assert!(build::<PkToPkParams>("").is_err());
    }

    #[test]
    fn test_time_interval_reference_a() {
        let p: TimeIntervalParams = build("ref:A ch:2").unwrap();
        assert_eq!(p.reference, 1);
        assert_eq!(p.channel, 2);
        assert!(!p.timestamps);
        assert_eq!(p.samples, 1);
        assert_eq!(p.coupling, Coupling::Dc);
        assert_eq!(p.impedance_ohms, 1_000_000);
    }

    #[test]
    fn test_time_interval_reference_b() {
        let p: TimeIntervalParams = build("ref:B ch:1 tstamp:Y sampl:1000000 coup:ac imp:50").unwrap();
        assert_eq!(p.reference, 2);
        assert_eq!(p.channel, 1);
        assert!(p.timestamps);
        assert_eq!(p.samples, 1_000_000);
        assert_eq!(p.coupling, Coupling::Ac);
        assert_eq!(p.impedance_ohms, 50);
    }

    #[test]
    fn test_time_interval_inconsistent_channel() {
        let err = build::<TimeIntervalParams>("ref:A ch:1").unwrap_err();
        assert!(matches!(err, CounterError::InconsistentChannelSelection { .. }));

        let err = build::<TimeIntervalParams>("ref:B ch:2").unwrap_err();
        assert!(matches!(err, CounterError::InconsistentChannelSelection { .. }));
    }

    #[test]
    fn test_time_interval_enumerations() {
        let err = build::<TimeIntervalParams>("ref:A ch:2 tstamp:maybe").unwrap_err();
        assert!(matches!(err, CounterError::InvalidEnumValue { ref key, .. } if key == "tstamp"));

        let err = build::<TimeIntervalParams>("ref:C ch:2").unwrap_err();
        assert!(matches!(err, CounterError::InvalidEnumValue { ref key, .. } if key == "ref"));

        let err = build::<TimeIntervalParams>("ref:A ch:2 sampl:1000001").unwrap_err();
        assert!(matches!(err, CounterError::OutOfRangeValue { .. }));
    }

    #[test]
    fn test_freq_ratio() {
        let p: FreqRatioParams = build("ref:2").unwrap();
        assert_eq!(p.reference, 2);
        assert_eq!(p.channel, 1);
        assert_eq!(p.samples, 4);
        assert_eq!(p.resolution_digits, None);

        let err = build::<FreqRatioParams>("ref:1 res:3").unwrap_err();
        assert!(matches!(err, CounterError::OutOfRangeValue { .. }));
    }
}
