//! Fault injection for the simulated counter.
//!
//! Injected faults surface as [`CounterError::TransportFailure`], the same
//! way a real transport reports I/O trouble.

use crate::rng::MockRng;
use counter_core::{CounterError, CounterResult};
use std::collections::HashMap;
use std::io;

/// A specific failure to inject.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultScenario {
    /// Fail every call of `operation` after `count` successful ones.
    FailAfterN {
        /// Hook name, e.g. `freq` or `connect`.
        operation: &'static str,
        /// Calls that succeed before failures start.
        count: u32,
    },
    /// Every call of `operation` times out.
    Timeout {
        /// Hook name.
        operation: &'static str,
    },
    /// Every call fails as if the cable were pulled.
    CommunicationLoss,
}

/// Fault injection configuration.
#[derive(Debug, Default)]
pub struct FaultConfig {
    scenarios: Vec<FaultScenario>,
    failure_rate: f64,
    rng: Option<MockRng>,
    counts: HashMap<&'static str, u32>,
}

impl FaultConfig {
    /// No injected faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single scenario.
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self {
            scenarios,
            ..Self::default()
        }
    }

    /// Uniform random failures on every operation.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self {
            failure_rate: rate,
            rng: Some(MockRng::new(seed)),
            ..Self::default()
        }
    }

    /// Decide whether `operation` fails now.
    pub fn check(&mut self, port: &str, operation: &'static str) -> CounterResult<()> {
        for scenario in &self.scenarios {
            match scenario {
                FaultScenario::CommunicationLoss => {
                    return Err(injected(port, io::ErrorKind::BrokenPipe, "communication lost"));
                }
                FaultScenario::Timeout { operation: op } if *op == operation => {
                    return Err(injected(
                        port,
                        io::ErrorKind::TimedOut,
                        format!("operation '{}' timed out", operation),
                    ));
                }
                FaultScenario::FailAfterN { operation: op, count } if *op == operation => {
                    let current = self.counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(injected(
                            port,
                            io::ErrorKind::Other,
                            format!("injected failure after {} operations", count),
                        ));
                    }
                }
                _ => {}
            }
        }

        if let Some(rng) = self.rng.as_mut() {
            if rng.should_fail(self.failure_rate) {
                return Err(injected(
                    port,
                    io::ErrorKind::Other,
                    format!("random failure on operation '{}'", operation),
                ));
            }
        }
        Ok(())
    }

    /// Clear call counters.
    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

fn injected(port: &str, kind: io::ErrorKind, message: impl Into<String>) -> CounterError {
    CounterError::transport(port, io::Error::new(kind, message.into()))
}
