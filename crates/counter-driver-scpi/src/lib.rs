//! SCPI frequency counter driver.
//!
//! [`ScpiCounter`] implements [`counter_core::FrequencyCounter`] by writing
//! SCPI command text to a [`counter_core::Transport`]. The transport is
//! chosen from the session interface:
//!
//! - `vxi11`: [`TcpTransport`] to the instrument's raw SCPI socket
//! - `usb`: [`UsbTmcTransport`] on a USBTMC character device
//! - `usb_acm`: `SerialTransport` (cargo feature `serial`)
//!
//! [`MockTransport`] scripts instrument responses for tests.

pub mod mock_transport;
pub mod scpi_counter;
pub mod transport;

pub use mock_transport::MockTransport;
pub use scpi_counter::{parse_readings, Connector, ScpiCounter};
#[cfg(feature = "serial")]
pub use transport::SerialTransport;
pub use transport::{open_transport, split_host_port, TcpTransport, UsbTmcTransport, DEFAULT_SCPI_PORT};
