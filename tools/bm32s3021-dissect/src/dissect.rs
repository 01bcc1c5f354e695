//! Protocol dissection engine.
//!
//! Commands decode on their own. Responses carry no opcode worth trusting,
//! so each one is read in the light of the last command sent.

use crate::capture::{Direction, SerialFrame};
use bm32s3021::protocol::frame::{verify_response, ECHO_SUCCESS, VALUE_OFFSET};
use bm32s3021::protocol::{checksum, Command, Register};
use bm32s3021::Error;
use colored::Colorize;
use std::fmt;

/// Dissected frame with decoded content
#[derive(Debug)]
pub struct DissectedFrame {
    pub timestamp: f64,
    pub direction: Direction,
    pub raw_data: Vec<u8>,
    pub content: FrameContent,
    pub checksum: ChecksumStatus,
}

/// Decoded frame content
#[derive(Debug, PartialEq)]
pub enum FrameContent {
    Command(Command),
    Values { start: Register, values: Vec<u8> },
    Ack { status: u8 },
    Unknown(String),
    Invalid(String),
}

/// Checksum validation status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    Valid,
    Invalid,
    NotChecked,
}

impl fmt::Display for ChecksumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumStatus::Valid => write!(f, "{}", "SUM OK".green()),
            ChecksumStatus::Invalid => write!(f, "{}", "SUM FAIL".red()),
            ChecksumStatus::NotChecked => write!(f, ""),
        }
    }
}

impl fmt::Display for FrameContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameContent::Command(Command::ReadRegisters { start, count }) => {
                write!(f, "{} {}", "READ".cyan(), start)?;
                if *count > 1 {
                    write!(f, " x{}", count)?;
                }
                Ok(())
            }
            FrameContent::Command(Command::WriteRegister { register, value }) => {
                write!(f, "{} {}={}", "WRITE".yellow(), register, value)
            }
            FrameContent::Command(Command::Reset) => write!(f, "{}", "RESET".magenta()),
            FrameContent::Command(Command::DistanceLearning) => {
                write!(f, "{}", "DISTANCE LEARNING".magenta())
            }
            FrameContent::Values { start, values } => {
                let mut first = true;
                for (offset, value) in values.iter().enumerate() {
                    if !first {
                        write!(f, " ")?;
                    }
                    first = false;
                    match start
                        .address()
                        .checked_add(offset as u8)
                        .and_then(Register::from_address)
                    {
                        Some(register) => write!(f, "{}=0x{:02X}", register, value)?,
                        None => write!(f, "[0x{:02X}]=0x{:02X}", start.address() as usize + offset, value)?,
                    }
                }
                Ok(())
            }
            FrameContent::Ack { status } if *status == ECHO_SUCCESS => {
                write!(f, "{}", "ACK".green())
            }
            FrameContent::Ack { status } => write!(f, "{} 0x{:02X}", "REJECTED".red(), status),
            FrameContent::Unknown(text) => write!(f, "{}", text.dimmed()),
            FrameContent::Invalid(text) => write!(f, "{}", text.red()),
        }
    }
}

impl fmt::Display for DissectedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::HostToSensor => "⟶",
            Direction::SensorToHost => "⟵",
        };
        write!(
            f,
            "{:>12.6} {} {} {:<20} {} {}",
            self.timestamp,
            self.direction,
            arrow,
            hex::encode_upper(&self.raw_data),
            self.content,
            self.checksum
        )
    }
}

/// Stateful dissector pairing responses with the command before them.
#[derive(Debug, Default)]
pub struct Dissector {
    pending: Option<Command>,
}

impl Dissector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dissect a serial frame
    pub fn dissect(&mut self, frame: &SerialFrame) -> DissectedFrame {
        let (content, checksum) = match frame.direction {
            Direction::HostToSensor => self.dissect_command(&frame.data),
            Direction::SensorToHost => self.dissect_response(&frame.data),
        };

        DissectedFrame {
            timestamp: frame.start_time,
            direction: frame.direction,
            raw_data: frame.data.clone(),
            content,
            checksum,
        }
    }

    fn dissect_command(&mut self, data: &[u8]) -> (FrameContent, ChecksumStatus) {
        match Command::try_parse_frame(data) {
            Ok((command, valid)) => {
                self.pending = Some(command.clone());
                (FrameContent::Command(command), status(valid))
            }
            Err(e) => {
                self.pending = None;
                (
                    FrameContent::Invalid(format!("Parse error: {}", e)),
                    ChecksumStatus::NotChecked,
                )
            }
        }
    }

    fn dissect_response(&mut self, data: &[u8]) -> (FrameContent, ChecksumStatus) {
        let Some(command) = self.pending.take() else {
            let valid = data.len() > 1 && checksum(&data[..data.len() - 1]) == data[data.len() - 1];
            return (
                FrameContent::Unknown(format!("Response without request ({} bytes)", data.len())),
                if data.len() > 1 {
                    status(valid)
                } else {
                    ChecksumStatus::NotChecked
                },
            );
        };

        let expected = command.response_len();
        if data.len() != expected {
            return (
                FrameContent::Invalid(format!(
                    "Expected {} bytes, got {}",
                    expected,
                    data.len()
                )),
                ChecksumStatus::NotChecked,
            );
        }

        let checksum = match verify_response(data) {
            Ok(()) => ChecksumStatus::Valid,
            Err(Error::Checksum { .. }) => ChecksumStatus::Invalid,
            Err(e) => return (FrameContent::Invalid(e.to_string()), ChecksumStatus::NotChecked),
        };

        let content = match command {
            Command::ReadRegisters { start, .. } => FrameContent::Values {
                start,
                values: data[VALUE_OFFSET..data.len() - 1].to_vec(),
            },
            _ => FrameContent::Ack { status: data[1] },
        };
        (content, checksum)
    }
}

fn status(valid: bool) -> ChecksumStatus {
    if valid {
        ChecksumStatus::Valid
    } else {
        ChecksumStatus::Invalid
    }
}
