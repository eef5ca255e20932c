//! Simulated frequency counter for testing and demos.
//!
//! [`MockCounter`] implements the full [`counter_core::FrequencyCounter`]
//! contract without hardware. Readings come from a per-channel signal model
//! with seeded noise, every issued hook is recorded, and [`FaultConfig`]
//! injects transport failures on demand.

pub mod faults;
pub mod mock_counter;
pub mod rng;

pub use faults::{FaultConfig, FaultScenario};
pub use mock_counter::{ChannelSignal, MockCounter, MockCounterBuilder};
pub use rng::MockRng;
