//! Command and response frames.
//!
//! Every exchange with the sensor is one command frame followed by one
//! fixed-length response frame:
//!
//! ```text
//! command:  55 <opcode> [<register> <length> <payload>...] <checksum>
//! response: 55 <...> <checksum>
//! ```
//!
//! The checksum is the sum of all preceding bytes, truncated to eight bits.

use bytes::{BufMut, BytesMut};
use strum::{Display, EnumIter, EnumString};
use tokio_util::codec::Encoder;

use crate::error::{Error, Result};

/// First byte of every frame, in both directions.
pub const HEADER: u8 = 0x55;

/// Byte at index 1 of a response when the device accepted a write or command.
pub const ECHO_SUCCESS: u8 = 0x7F;

/// Length of an acknowledgement response: header, status, checksum.
pub const ACK_LEN: usize = 3;

/// Bytes surrounding the register values in a read response.
const READ_OVERHEAD: usize = 5;

/// Offset of the first register value in a read response.
pub const VALUE_OFFSET: usize = 4;

/// Smallest response the frame layer accepts.
pub const MIN_RESPONSE_LEN: usize = 3;

/// Sensor registers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[repr(u8)]
pub enum Register {
    FirmwareVersionLow = 0x00,
    FirmwareVersionHigh = 0x01,
    IrStatus = 0x02,
    IrGestureCount = 0x03,
    Ir1Reference = 0x04,
    Ir2Reference = 0x05,
    IrDebounce = 0x06,
    IrThreshold = 0x07,
    IrqTriggerTime = 0x08,
    ContinuityGestureTime = 0x09,
    FastestGestureTime = 0x0A,
    SlowestGestureTime = 0x0B,
    IrOpa = 0x21,
    Ir1Current = 0x22,
    Ir2Current = 0x23,
}

impl Register {
    pub fn address(self) -> u8 {
        self as u8
    }

    pub fn from_address(address: u8) -> Option<Self> {
        use Register::*;
        Some(match address {
            0x00 => FirmwareVersionLow,
            0x01 => FirmwareVersionHigh,
            0x02 => IrStatus,
            0x03 => IrGestureCount,
            0x04 => Ir1Reference,
            0x05 => Ir2Reference,
            0x06 => IrDebounce,
            0x07 => IrThreshold,
            0x08 => IrqTriggerTime,
            0x09 => ContinuityGestureTime,
            0x0A => FastestGestureTime,
            0x0B => SlowestGestureTime,
            0x21 => IrOpa,
            0x22 => Ir1Current,
            0x23 => Ir2Current,
            _ => return None,
        })
    }

    /// Whether the host may write this register.
    pub fn is_writable(self) -> bool {
        use Register::*;
        !matches!(
            self,
            FirmwareVersionHigh | IrStatus | IrGestureCount | Ir1Reference | Ir2Reference
        )
    }

    /// Documented value range for writes.
    pub fn range(self) -> (u8, u8) {
        use Register::*;
        match self {
            IrThreshold => (10, 200),
            FastestGestureTime | SlowestGestureTime => (0, 200),
            Ir1Current | Ir2Current => (0, 31),
            _ => (0, u8::MAX),
        }
    }

    /// Check that `value` may be written to this register.
    pub fn check_write(self, value: u8) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::ReadOnly(self));
        }
        let (min, max) = self.range();
        if value < min || value > max {
            return Err(Error::OutOfRange {
                register: self,
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    Reset = 0x10,
    DistanceLearning = 0x19,
    Read = 0x80,
    Write = 0xC0,
}

/// Commands understood by the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read `count` consecutive registers starting at `start`.
    ReadRegisters { start: Register, count: u8 },
    WriteRegister { register: Register, value: u8 },
    Reset,
    DistanceLearning,
}

impl Command {
    pub fn read(register: Register) -> Self {
        Command::ReadRegisters {
            start: register,
            count: 1,
        }
    }

    pub fn write(register: Register, value: u8) -> Self {
        Command::WriteRegister { register, value }
    }

    fn opcode(&self) -> Opcode {
        match self {
            Command::ReadRegisters { .. } => Opcode::Read,
            Command::WriteRegister { .. } => Opcode::Write,
            Command::Reset => Opcode::Reset,
            Command::DistanceLearning => Opcode::DistanceLearning,
        }
    }

    /// Length of the response frame this command provokes.
    pub fn response_len(&self) -> usize {
        match self {
            Command::ReadRegisters { count, .. } => READ_OVERHEAD + *count as usize,
            _ => ACK_LEN,
        }
    }

    /// Serialize into a complete frame, checksum included.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut dst = BytesMut::with_capacity(6);
        self.put_frame(&mut dst);
        dst.to_vec()
    }

    fn put_frame(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.put_u8(HEADER);
        dst.put_u8(self.opcode() as u8);

        match self {
            Command::ReadRegisters { start, count } => {
                dst.put_u8(start.address());
                dst.put_u8(*count);
            }
            Command::WriteRegister { register, value } => {
                const LENGTH: u8 = 1;
                dst.put_u8(register.address());
                dst.put_u8(LENGTH);
                dst.put_u8(*value);
            }
            Command::Reset | Command::DistanceLearning => {}
        }

        let sum = checksum(&dst[start..]);
        dst.put_u8(sum);
    }

    /// Parse a command frame, as seen on the wire.
    ///
    /// Returns the command and whether its checksum was valid.
    pub fn try_parse_frame(data: &[u8]) -> Result<(Self, bool)> {
        if data.len() < 3 {
            return Err(Error::Protocol(format!(
                "command frame too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != HEADER {
            return Err(Error::Protocol(format!(
                "bad header 0x{:02X}",
                data[0]
            )));
        }

        let register_at = |index: usize| {
            Register::from_address(data[index]).ok_or_else(|| {
                Error::Protocol(format!("unknown register 0x{:02X}", data[index]))
            })
        };

        let (command, len) = match data[1] {
            op if op == Opcode::Reset as u8 => (Command::Reset, 3),
            op if op == Opcode::DistanceLearning as u8 => (Command::DistanceLearning, 3),
            op if op == Opcode::Read as u8 => {
                expect_len(data, 5)?;
                let command = Command::ReadRegisters {
                    start: register_at(2)?,
                    count: data[3],
                };
                (command, 5)
            }
            op if op == Opcode::Write as u8 => {
                expect_len(data, 6)?;
                if data[3] != 1 {
                    return Err(Error::Protocol(format!(
                        "write length {} not supported",
                        data[3]
                    )));
                }
                (Command::write(register_at(2)?, data[4]), 6)
            }
            op => {
                return Err(Error::Protocol(format!("unknown opcode 0x{:02X}", op)));
            }
        };

        expect_len(data, len)?;
        let valid = checksum(&data[..len - 1]) == data[len - 1];
        Ok((command, valid))
    }
}

fn expect_len(data: &[u8], len: usize) -> Result<()> {
    if data.len() != len {
        return Err(Error::Protocol(format!(
            "expected {}-byte frame, got {} bytes",
            len,
            data.len()
        )));
    }
    Ok(())
}

/// Additive checksum: sum of all bytes modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Check a complete response frame.
///
/// The last byte must equal the checksum of the others. A frame of nothing
/// but zero bytes is what a disconnected line reads as; its sum matches
/// trivially, so it is rejected explicitly.
pub fn verify_response(frame: &[u8]) -> Result<()> {
    let Some((&actual, body)) = frame.split_last() else {
        return Err(Error::Protocol("empty response".into()));
    };
    let expected = checksum(body);
    if expected != actual || frame.iter().all(|b| *b == 0) {
        return Err(Error::Checksum { expected, actual });
    }
    Ok(())
}

/// A response frame whose checksum has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Vec<u8>,
}

impl Response {
    /// Validate raw bytes received for a command.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_RESPONSE_LEN {
            return Err(Error::Protocol(format!(
                "response too short: {} bytes",
                bytes.len()
            )));
        }
        verify_response(&bytes)?;
        Ok(Self { bytes })
    }

    /// Status byte of an acknowledgement.
    pub fn status(&self) -> u8 {
        self.bytes[1]
    }

    /// Succeeds if the device echoed [`ECHO_SUCCESS`].
    pub fn check_ack(&self) -> Result<()> {
        match self.status() {
            ECHO_SUCCESS => Ok(()),
            status => Err(Error::DeviceRejected { status }),
        }
    }

    /// Register values of a read response.
    pub fn values(&self) -> &[u8] {
        let end = self.bytes.len() - 1;
        if end <= VALUE_OFFSET {
            return &[];
        }
        &self.bytes[VALUE_OFFSET..end]
    }

    /// First register value of a read response.
    pub fn value(&self) -> Result<u8> {
        self.values()
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol("response carries no register value".into()))
    }
}

/// Encoder for command frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Command> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        command.put_frame(dst);
        Ok(())
    }
}
