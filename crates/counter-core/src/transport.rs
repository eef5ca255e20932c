//! Line-oriented transport seam used by command-driven drivers.
//!
//! Transports move text lines to and from the instrument and nothing more.
//! They own the I/O timeout; an expired read surfaces as an
//! [`std::io::ErrorKind::TimedOut`] error which drivers wrap in
//! [`crate::CounterError::TransportFailure`].

use std::io;

/// Blocking line transport.
pub trait Transport: Send {
    /// Send one command line. The terminator is appended by the transport.
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Read one response line without its terminator.
    fn read_line(&mut self) -> io::Result<String>;

    /// Send a query and read its response.
    fn query(&mut self, line: &str) -> io::Result<String> {
        self.write_line(line)?;
        self.read_line()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> io::Result<String> {
        (**self).read_line()
    }

    fn query(&mut self, line: &str) -> io::Result<String> {
        (**self).query(line)
    }
}
