//! Common error types for the BM32S3021-1 driver.
//!
//! This module provides a centralized Error enum using thiserror, covering
//! link failures (I/O, serial port), frame exchange failures (timeout,
//! checksum, rejection by the device) and caller mistakes caught before any
//! byte is written.

use thiserror::Error;

use crate::protocol::Register;

/// Main error type for sensor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No byte arrived within the per-byte timeout
    #[error("Timed out after {received} of {expected} response bytes")]
    Timeout { received: usize, expected: usize },

    /// Response frame corrupted, misaligned, or read from a dead line
    #[error("Checksum mismatch: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    /// Device answered, but not with the echo-success byte
    #[error("Device rejected command (status 0x{status:02X})")]
    DeviceRejected { status: u8 },

    /// Value outside the documented range of a register
    #[error("Value {value} out of range for {register} ({min}..={max})")]
    OutOfRange {
        register: Register,
        value: u8,
        min: u8,
        max: u8,
    },

    /// Write attempted on a read-only register
    #[error("Register {0} is read-only")]
    ReadOnly(Register),

    /// Malformed frames or misuse of the frame layer
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether the failure happened during a frame exchange, as opposed to
    /// being rejected before any byte went out.
    pub fn is_exchange_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Serial(_)
                | Error::Timeout { .. }
                | Error::Checksum { .. }
                | Error::DeviceRejected { .. }
        )
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_failures() {
        assert!(Error::Timeout { received: 2, expected: 6 }.is_exchange_failure());
        assert!(Error::Checksum { expected: 0xDC, actual: 0 }.is_exchange_failure());
        assert!(Error::DeviceRejected { status: 0x7E }.is_exchange_failure());
        assert!(Error::Io(std::io::ErrorKind::UnexpectedEof.into()).is_exchange_failure());
    }

    #[test]
    fn test_caller_mistakes() {
        assert!(!Error::ReadOnly(Register::IrStatus).is_exchange_failure());
        assert!(!Error::OutOfRange {
            register: Register::IrThreshold,
            value: 5,
            min: 10,
            max: 200,
        }
        .is_exchange_failure());
        assert!(!Error::Config("bad".into()).is_exchange_failure());
        assert!(!Error::Protocol("short".into()).is_exchange_failure());
    }
}
