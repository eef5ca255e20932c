//! `counter-core`
//!
//! Vendor-neutral control contract for frequency-counter/timer instruments.
//!
//! Application code measuring a signal talks to a [`FrequencyCounter`] and
//! passes per-call parameters as short `key:value` configuration strings; it
//! does not need to know which instrument or transport is behind the trait.
//!
//! ## Layers
//!
//! - **Configuration language**: [`config_string::parse`] tokenizes, then a
//!   per-operation [`schema::Schema`] validates and applies defaults, and
//!   [`params`] turns the result into typed records.
//! - **Contract**: [`FrequencyCounter`] enforces the session state machine
//!   and all-or-nothing result writes; drivers implement its hooks.
//! - **Collaborators**: [`Transport`] for line-oriented instrument I/O and
//!   [`CounterSettings`] for layered session settings.
//!
//! ## Example
//!
//! ```
//! use counter_core::config_string::parse;
//! use counter_core::params::{FreqParams, OperationParams};
//! use counter_core::schema::{Coupling, SchemaContext};
//!
//! let map = parse(Some("ch:1 cou:ac exp:125E6")).unwrap();
//! let params = FreqParams::from_config(&map, &SchemaContext::default()).unwrap();
//! assert_eq!(params.coupling, Coupling::Ac);
//! assert_eq!(params.samples, 1);
//! ```

pub mod config_string;
pub mod contract;
pub mod error;
pub mod interface;
pub mod measurement;
pub mod params;
pub mod schema;
pub mod session;
pub mod settings;
pub mod transport;

pub use config_string::{parse, ConfigMap};
pub use contract::FrequencyCounter;
pub use error::{CounterError, CounterResult, SessionState};
pub use interface::Interface;
pub use measurement::{MeasuredData, MeasurementKind, Sample};
pub use params::{
    FreqParams, FreqRatioParams, OperationParams, PeriodParams, PkToPkParams, TimeIntervalParams,
    TrigLevelParams,
};
pub use schema::{Coupling, SchemaContext, TriggerLevel};
pub use session::InstrumentSession;
pub use settings::{CounterSettings, MockSettings};
pub use transport::Transport;
