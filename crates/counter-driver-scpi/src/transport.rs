//! Concrete line transports.
//!
//! | Interface | Transport            | Port identifier            |
//! |-----------|----------------------|----------------------------|
//! | `vxi11`   | [`TcpTransport`]     | `host[:port]`, port 5025   |
//! | `usb`     | [`UsbTmcTransport`]  | `/dev/usbtmc<N>`           |
//! | `usb_acm` | `SerialTransport`    | `/dev/ttyACM<N>` (feature `serial`) |
//!
//! LAN instruments are reached through their raw SCPI socket; VXI-11 RPC
//! framing is not spoken.

use counter_core::{Interface, Transport};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::info;

/// Default raw SCPI socket port.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

const LINE_TERMINATOR: &str = "\n";

/// Open the transport matching `interface`.
pub fn open_transport(interface: Interface, port: &str, timeout: Duration) -> io::Result<Box<dyn Transport>> {
    match interface {
        Interface::Vxi11 => Ok(Box::new(TcpTransport::connect(port, timeout)?)),
        Interface::Usb => Ok(Box::new(UsbTmcTransport::open(port)?)),
        Interface::UsbAcm => open_serial(port, timeout),
    }
}

#[cfg(feature = "serial")]
fn open_serial(port: &str, timeout: Duration) -> io::Result<Box<dyn Transport>> {
    Ok(Box::new(SerialTransport::open(port, timeout)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(port: &str, _timeout: Duration) -> io::Result<Box<dyn Transport>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("serial support not compiled in (enable feature 'serial') for {}", port),
    ))
}

/// Split `host[:port]`, defaulting to [`DEFAULT_SCPI_PORT`].
pub fn split_host_port(addr: &str) -> (String, u16) {
    if let Some((host, port)) = addr.rsplit_once(':') {
        let bare_ipv6 = host.contains(':') && !host.starts_with('[');
        if !bare_ipv6 {
            if let Ok(port) = port.parse::<u16>() {
                return (host.to_string(), port);
            }
        }
    }
    (addr.to_string(), DEFAULT_SCPI_PORT)
}

fn strip_terminator(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

// =============================================================================
// TCP
// =============================================================================

/// Raw SCPI socket.
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    /// Connect to `host[:port]` with the given connect and I/O timeout.
    pub fn connect(addr: &str, timeout: Duration) -> io::Result<Self> {
        let (host, port) = split_host_port(addr);
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let target = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", addr)))?;

        let stream = TcpStream::connect_timeout(&target, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        info!("Connected to SCPI socket at {}", target);
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }
}

impl Transport for TcpTransport {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(LINE_TERMINATOR.as_bytes())?;
        stream.flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by instrument"));
        }
        Ok(strip_terminator(line))
    }
}

// =============================================================================
// USBTMC
// =============================================================================

/// USB test and measurement class character device.
///
/// The kernel driver frames messages; the read timeout is the driver's own.
#[derive(Debug)]
pub struct UsbTmcTransport {
    device: File,
}

impl UsbTmcTransport {
    const CHUNK: usize = 4096;

    /// Open a device node such as `/dev/usbtmc0`.
    pub fn open(path: &str) -> io::Result<Self> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;
        info!("Opened USBTMC device {}", path);
        Ok(Self { device })
    }
}

impl Transport for UsbTmcTransport {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut message = String::with_capacity(line.len() + 1);
        message.push_str(line);
        message.push_str(LINE_TERMINATOR);
        self.device.write_all(message.as_bytes())
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        let mut chunk = [0u8; Self::CHUNK];
        loop {
            let n = self.device.read(&mut chunk)?;
            bytes.extend_from_slice(&chunk[..n]);
            if n < Self::CHUNK || bytes.ends_with(b"\n") {
                break;
            }
        }
        if bytes.is_empty() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty USBTMC response"));
        }
        let text = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(strip_terminator(text))
    }
}

// =============================================================================
// Serial
// =============================================================================

/// USB CDC-ACM virtual serial port.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    reader: BufReader<Box<dyn serialport::SerialPort>>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    /// Baud rate; CDC-ACM devices ignore it.
    pub const BAUD_RATE: u32 = 115_200;

    /// Open `path` with the given read timeout.
    pub fn open(path: &str, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, Self::BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        info!("Opened serial port {}", path);
        Ok(Self {
            reader: BufReader::new(port),
        })
    }
}

#[cfg(feature = "serial")]
impl Transport for SerialTransport {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let port = self.reader.get_mut();
        port.write_all(line.as_bytes())?;
        port.write_all(LINE_TERMINATOR.as_bytes())?;
        port.flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port closed"));
        }
        Ok(strip_terminator(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("192.168.1.50"), ("192.168.1.50".to_string(), 5025));
        assert_eq!(split_host_port("counter.lab:5555"), ("counter.lab".to_string(), 5555));
        assert_eq!(split_host_port("[::1]:5025"), ("[::1]".to_string(), 5025));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1".to_string(), 5025));
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("1.0E+07\r\n".to_string()), "1.0E+07");
        assert_eq!(strip_terminator("plain".to_string()), "plain");
    }

    #[test]
    fn test_tcp_round_trip_with_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            reader
                .get_mut()
                .write_all(b"ACME,CNT-100,0,1.0\r\n")
                .unwrap();
        });

        let mut transport = TcpTransport::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();
        assert_eq!(transport.query("*IDN?").unwrap(), "ACME,CNT-100,0,1.0");
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_eof_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr.to_string(), Duration::from_secs(2)).unwrap();
        server.join().unwrap();
        let err = transport.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_missing_usbtmc_device() {
        let err = UsbTmcTransport::open("/nonexistent/usbtmc99").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn test_serial_requires_feature() {
        match open_transport(Interface::UsbAcm, "/dev/ttyACM0", Duration::from_millis(10)) {
            Ok(_) => panic!("serial transport opened without the feature"),
            Err(err) => assert_eq!(err.kind(), io::ErrorKind::Unsupported),
        }
    }
}
