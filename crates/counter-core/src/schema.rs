//! Per-operation schema validation.
//!
//! The second phase of the configuration language. A [`Schema`] lists the keys
//! one operation understands, whether each is required, the value domain and
//! the default applied when an optional key is absent. [`Schema::validate`]
//! turns a raw [`ConfigMap`] into [`ValidatedParams`] holding typed values.
//!
//! Keys outside the schema are ignored: the tokenizer is a superset extractor
//! and several operations share one grammar.
//!
//! Domains that depend on the session (channel count, default sample count,
//! default impedance) are resolved through a [`SchemaContext`].

use crate::config_string::ConfigMap;
use crate::error::{CounterError, CounterResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Resolution bounds, in significant digits.
pub const RESOLUTION_DIGITS: (u64, u64) = (5, 15);

/// Sample-count bounds shared by every operation.
pub const SAMPLE_COUNT: (u64, u64) = (1, 1_000_000);

/// Input impedance bounds in ohms.
pub const IMPEDANCE_OHMS: (u64, u64) = (50, 1_000_000);

/// Auto-trigger percentage bounds.
pub const AUTO_TRIGGER_PERCENT: (u64, u64) = (0, 100);

const IMPEDANCE_SYMBOLS: &[&str] = &["50-1000000", "min", "max", "def"];
const TRIGGER_SHAPES: &[&str] = &["<volts>", "a<percent>"];

// =============================================================================
// Value Types
// =============================================================================

/// Input coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coupling {
    /// AC coupled input.
    Ac,
    /// DC coupled input.
    Dc,
}

impl Coupling {
    /// Accepted spellings in configuration strings.
    pub const VALUES: &'static [&'static str] = &["ac", "dc"];

    fn from_canonical(value: &str) -> Self {
        if value == "ac" {
            Coupling::Ac
        } else {
            Coupling::Dc
        }
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coupling::Ac => write!(f, "AC"),
            Coupling::Dc => write!(f, "DC"),
        }
    }
}

/// Trigger threshold for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerLevel {
    /// Fixed threshold in volts.
    Volts(f64),
    /// Automatic threshold at a percentage of the signal amplitude.
    Auto {
        /// Percentage of peak-to-peak amplitude (0 to 100).
        percent: u8,
    },
}

impl fmt::Display for TriggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerLevel::Volts(v) => write!(f, "{} V", v),
            TriggerLevel::Auto { percent } => write!(f, "auto {}%", percent),
        }
    }
}

/// Typed value produced by schema validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Input channel number (1-based).
    Channel(u8),
    /// Bounded integer.
    Integer(u64),
    /// Floating point number.
    Float(f64),
    /// Canonical member of an enumerated set.
    Choice(&'static str),
    /// Input impedance in ohms.
    Impedance(u32),
    /// Trigger threshold.
    Trigger(TriggerLevel),
}

// =============================================================================
// Schema Definition
// =============================================================================

/// Session-dependent inputs to validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaContext {
    /// Number of input channels; channels are `1..=channel_count`.
    pub channel_count: u8,
    /// Default number of samples.
    pub default_samples: u32,
    /// Default input impedance in ohms.
    pub default_impedance: u32,
}

impl Default for SchemaContext {
    fn default() -> Self {
        Self {
            channel_count: 2,
            default_samples: 1,
            default_impedance: 1_000_000,
        }
    }
}

/// Value domain of a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    /// Channel number in `1..=channel_count`.
    Channel,
    /// Integer within inclusive bounds.
    Integer {
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },
    /// Strictly positive finite number.
    PositiveFloat,
    /// Case-insensitive member of a fixed set; validated to the listed spelling.
    Choice(&'static [&'static str]),
    /// Ohms within [`IMPEDANCE_OHMS`] or one of `min`, `max`, `def`.
    Impedance,
    /// Bare volts or `a<percent>`.
    TriggerLevel,
}

/// Default applied to an absent optional key.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Leave the key absent; the instrument keeps its own setting.
    Device,
    /// Insert this value.
    Value(ParamValue),
}

/// Whether a key must be supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// Absence fails with [`CounterError::MissingRequiredKey`].
    Required,
    /// Absence applies the default.
    Optional(DefaultValue),
}

/// How a key is matched in the raw map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    /// Exactly this key.
    Exact(&'static str),
    /// This prefix followed by a channel number, e.g. `trig1`.
    PerChannel(&'static str),
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyName::Exact(key) => write!(f, "{}", key),
            KeyName::PerChannel(prefix) => write!(f, "{}<ch>", prefix),
        }
    }
}

/// One recognized key of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    /// Key or key pattern.
    pub name: KeyName,
    /// Required or optional with default.
    pub requirement: Requirement,
    /// Value domain.
    pub domain: Domain,
}

impl KeySpec {
    /// A required key.
    pub fn required(key: &'static str, domain: Domain) -> Self {
        Self {
            name: KeyName::Exact(key),
            requirement: Requirement::Required,
            domain,
        }
    }

    /// An optional key with an explicit default value.
    pub fn optional(key: &'static str, domain: Domain, default: ParamValue) -> Self {
        Self {
            name: KeyName::Exact(key),
            requirement: Requirement::Optional(DefaultValue::Value(default)),
            domain,
        }
    }

    /// An optional key that defers to the instrument when absent.
    pub fn device_default(key: &'static str, domain: Domain) -> Self {
        Self {
            name: KeyName::Exact(key),
            requirement: Requirement::Optional(DefaultValue::Device),
            domain,
        }
    }

    /// A family of `<prefix><ch>` keys of which at least one is required.
    pub fn per_channel(prefix: &'static str, domain: Domain) -> Self {
        Self {
            name: KeyName::PerChannel(prefix),
            requirement: Requirement::Required,
            domain,
        }
    }
}

/// Keys accepted by one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    operation: &'static str,
    keys: Vec<KeySpec>,
}

impl Schema {
    /// Start an empty schema for `operation`.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            keys: Vec::new(),
        }
    }

    /// Add a key.
    pub fn key(mut self, spec: KeySpec) -> Self {
        self.keys.push(spec);
        self
    }

    /// Operation name used in error messages.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Recognized keys.
    pub fn keys(&self) -> &[KeySpec] {
        &self.keys
    }

    /// Validate a raw map against this schema.
    ///
    /// Keys are checked in schema order, so the first failing key in the
    /// schema determines the error.
    pub fn validate(&self, map: &ConfigMap, ctx: &SchemaContext) -> CounterResult<ValidatedParams> {
        let mut values = BTreeMap::new();

        for spec in &self.keys {
            match spec.name {
                KeyName::Exact(key) => match map.get(key) {
                    Some(raw) => {
                        let value = check_domain(key, raw, spec.domain, ctx)?;
                        values.insert(key.to_string(), value);
                    }
                    None => match &spec.requirement {
                        Requirement::Required => {
                            return Err(CounterError::MissingRequiredKey {
                                operation: self.operation,
                                key: key.to_string(),
                            })
                        }
                        Requirement::Optional(DefaultValue::Value(default)) => {
                            values.insert(key.to_string(), default.clone());
                        }
                        Requirement::Optional(DefaultValue::Device) => {}
                    },
                },
                KeyName::PerChannel(prefix) => {
                    // `trig1` and `trig01` name the same channel.
                    let mut seen = BTreeSet::new();
                    for (key, raw) in map.iter() {
                        let Some(suffix) = channel_suffix(key, prefix) else {
                            continue;
                        };
                        if let ParamValue::Channel(ch) = check_domain(key, suffix, Domain::Channel, ctx)? {
                            if !seen.insert(ch) {
                                return Err(CounterError::DuplicateKey {
                                    key: key.to_string(),
                                });
                            }
                        }
                        let value = check_domain(key, raw, spec.domain, ctx)?;
                        values.insert(key.to_string(), value);
                    }
                    if seen.is_empty() && spec.requirement == Requirement::Required {
                        return Err(CounterError::MissingRequiredKey {
                            operation: self.operation,
                            key: spec.name.to_string(),
                        });
                    }
                }
            }
        }

        for key in map.keys() {
            if !values.contains_key(key) && !self.recognizes(key) {
                debug!(operation = self.operation, key, "Ignoring unrecognized key");
            }
        }

        Ok(ValidatedParams {
            operation: self.operation,
            values,
        })
    }

    fn recognizes(&self, key: &str) -> bool {
        self.keys.iter().any(|spec| match spec.name {
            KeyName::Exact(k) => k == key,
            KeyName::PerChannel(prefix) => channel_suffix(key, prefix).is_some(),
        })
    }
}

/// Digits following `prefix` in a per-channel key such as `trig2`.
fn channel_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

fn check_domain(key: &str, raw: &str, domain: Domain, ctx: &SchemaContext) -> CounterResult<ParamValue> {
    match domain {
        Domain::Channel => {
            let max = u64::from(ctx.channel_count);
            let n = parse_integer(key, raw, 1, max)?;
            if !(1..=max).contains(&n) {
                return Err(CounterError::out_of_range(key, raw, 1.0, max as f64));
            }
            Ok(ParamValue::Channel(n as u8))
        }
        Domain::Integer { min, max } => {
            let n = parse_integer(key, raw, min, max)?;
            if !(min..=max).contains(&n) {
                return Err(CounterError::out_of_range(key, raw, min as f64, max as f64));
            }
            Ok(ParamValue::Integer(n))
        }
        Domain::PositiveFloat => {
            let v: f64 = raw
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| CounterError::invalid_number(key, raw))?;
            if v <= 0.0 {
                return Err(CounterError::out_of_range(key, raw, f64::MIN_POSITIVE, f64::MAX));
            }
            Ok(ParamValue::Float(v))
        }
        Domain::Choice(choices) => choices
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(raw))
            .map(ParamValue::Choice)
            .ok_or_else(|| CounterError::invalid_enum(key, raw, choices)),
        Domain::Impedance => check_impedance(key, raw, ctx),
        Domain::TriggerLevel => check_trigger_level(key, raw),
    }
}

/// Parse an integer bounded by `min..=max`; well-formed integers too large to
/// represent are out of range, not malformed.
fn parse_integer(key: &str, raw: &str, min: u64, max: u64) -> CounterResult<u64> {
    let out_of_range = || CounterError::out_of_range(key, raw, min as f64, max as f64);
    match raw.parse::<i64>() {
        Ok(n) if n < 0 => Err(out_of_range()),
        Ok(n) => Ok(n as u64),
        Err(_) if is_integer_text(raw) => Err(out_of_range()),
        Err(_) => Err(CounterError::invalid_number(key, raw)),
    }
}

/// Optional sign followed by one or more ASCII digits.
fn is_integer_text(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn check_impedance(key: &str, raw: &str, ctx: &SchemaContext) -> CounterResult<ParamValue> {
    let (min, max) = IMPEDANCE_OHMS;
    let ohms = match raw.to_ascii_lowercase().as_str() {
        "min" => min,
        "max" => max,
        "def" => u64::from(ctx.default_impedance),
        _ => {
            if !is_integer_text(raw) {
                return Err(CounterError::invalid_enum(key, raw, IMPEDANCE_SYMBOLS));
            }
            let n = parse_integer(key, raw, min, max)?;
            if !(min..=max).contains(&n) {
                return Err(CounterError::out_of_range(key, raw, min as f64, max as f64));
            }
            n
        }
    };
    Ok(ParamValue::Impedance(ohms as u32))
}

/// Interpret a trigger value: `a<digits>` is auto-trigger, anything else must
/// be a finite voltage.
pub fn check_trigger_level(key: &str, raw: &str) -> CounterResult<ParamValue> {
    let invalid = || CounterError::invalid_enum(key, raw, TRIGGER_SHAPES);

    if let Some(pct) = raw.strip_prefix(|c: char| c == 'a' || c == 'A') {
        if pct.is_empty() || !pct.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let (min, max) = AUTO_TRIGGER_PERCENT;
        let percent = pct
            .parse::<u64>()
            .ok()
            .filter(|p| (min..=max).contains(p))
            .ok_or_else(|| CounterError::out_of_range(key, raw, min as f64, max as f64))?;
        return Ok(ParamValue::Trigger(TriggerLevel::Auto {
            percent: percent as u8,
        }));
    }

    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| ParamValue::Trigger(TriggerLevel::Volts(v)))
        .ok_or_else(invalid)
}

// =============================================================================
// Validated Parameters
// =============================================================================

/// Typed parameters for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    operation: &'static str,
    values: BTreeMap<String, ParamValue>,
}

impl ValidatedParams {
    /// Operation the parameters were validated for.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Typed value for `key`, if present after defaults.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// True if `key` is present after defaults.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Channel value of `key`.
    pub fn channel(&self, key: &str) -> Option<u8> {
        match self.values.get(key) {
            Some(ParamValue::Channel(ch)) => Some(*ch),
            _ => None,
        }
    }

    /// Integer value of `key`.
    pub fn integer(&self, key: &str) -> Option<u64> {
        match self.values.get(key) {
            Some(ParamValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// Float value of `key`.
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ParamValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Enumerated value of `key`, in its canonical spelling.
    pub fn choice(&self, key: &str) -> Option<&'static str> {
        match self.values.get(key) {
            Some(ParamValue::Choice(c)) => Some(c),
            _ => None,
        }
    }

    /// Coupling value of `key`.
    pub fn coupling(&self, key: &str) -> Option<Coupling> {
        self.choice(key).map(Coupling::from_canonical)
    }

    /// Impedance value of `key` in ohms.
    pub fn impedance(&self, key: &str) -> Option<u32> {
        match self.values.get(key) {
            Some(ParamValue::Impedance(ohms)) => Some(*ohms),
            _ => None,
        }
    }

    /// All `<prefix><ch>` trigger values, keyed by channel.
    pub fn triggers(&self, prefix: &str) -> BTreeMap<u8, TriggerLevel> {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                let ch = key.strip_prefix(prefix)?.parse::<u8>().ok()?;
                match value {
                    ParamValue::Trigger(level) => Some((ch, *level)),
                    _ => None,
                }
            })
            .collect()
    }
}
