//! Physical interface kinds a counter session can be bound to.

use crate::error::CounterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interface used to reach the instrument.
///
/// The port identifier is interpreted per interface: a device node for
/// [`Interface::Usb`] and [`Interface::UsbAcm`], `host[:port]` for
/// [`Interface::Vxi11`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    /// USB test and measurement class device.
    Usb,
    /// USB CDC-ACM virtual serial port.
    UsbAcm,
    /// LAN instrument.
    Vxi11,
}

impl Interface {
    /// Accepted spellings.
    pub const VALUES: &'static [&'static str] = &["usb", "usb_acm", "vxi11"];

    /// Example port identifier for this interface.
    pub fn example_port(&self) -> &'static str {
        match self {
            Interface::Usb => "/dev/usbtmc0",
            Interface::UsbAcm => "/dev/ttyACM0",
            Interface::Vxi11 => "192.168.1.50",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interface::Usb => "usb",
            Interface::UsbAcm => "usb_acm",
            Interface::Vxi11 => "vxi11",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Interface {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usb" => Ok(Interface::Usb),
            "usb_acm" | "usb-acm" => Ok(Interface::UsbAcm),
            "vxi11" => Ok(Interface::Vxi11),
            _ => Err(CounterError::invalid_enum("interface", s, Self::VALUES)),
        }
    }
}
