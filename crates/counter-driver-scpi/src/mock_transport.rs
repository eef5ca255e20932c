//! Scripted transport for testing SCPI drivers without hardware.
//!
//! A [`MockTransport`] is given to the driver; clones share state, so the
//! test keeps one clone to script responses and inspect what was written.
//!
//! ```
//! use counter_core::Transport;
//! use counter_driver_scpi::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.respond("*IDN?", "ACME,CNT-100,0,1.0");
//!
//! let mut port = mock.clone();
//! assert_eq!(port.query("*IDN?").unwrap(), "ACME,CNT-100,0,1.0");
//! assert_eq!(mock.writes(), vec!["*IDN?"]);
//! ```

use counter_core::Transport;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    /// Lines written by the driver, oldest first.
    writes: Vec<String>,
    /// Scripted responses per query, consumed in order.
    responses: HashMap<String, VecDeque<String>>,
    /// Responses waiting to be read.
    pending: VecDeque<String>,
    /// Writes containing this text fail.
    fail_on: Option<String>,
}

/// In-memory [`Transport`] with scripted query responses.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for the next write of `query`.
    pub fn respond(&self, query: &str, response: &str) -> &Self {
        self.state
            .lock()
            .responses
            .entry(query.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    /// Fail every write whose text contains `pattern`.
    pub fn fail_writes_containing(&self, pattern: &str) {
        self.state.lock().fail_on = Some(pattern.to_string());
    }

    /// Stop failing writes.
    pub fn heal(&self) {
        self.state.lock().fail_on = None;
    }

    /// Lines written so far.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Forget recorded writes.
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }
}

impl Transport for MockTransport {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        if let Some(pattern) = &state.fail_on {
            if line.contains(pattern.as_str()) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected write failure"));
            }
        }
        state.writes.push(line.to_string());
        if line.ends_with('?') {
            let scripted = state.responses.get_mut(line).and_then(|queue| queue.pop_front());
            if let Some(response) = scripted {
                state.pending.push_back(response);
            }
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<String> {
        self.state
            .lock()
            .pending
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no scripted response"))
    }
}
