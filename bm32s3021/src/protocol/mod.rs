//! BM32S3021-1 UART protocol.
//!
//! This module provides the frame format (commands, responses, checksum)
//! and the request/response channel every sensor operation goes through.

pub mod channel;
pub mod frame;

pub use channel::FrameChannel;
pub use frame::{checksum, Command, FrameCodec, Register, Response};

/// The sensor only talks at this rate.
pub const BAUD_RATE: u32 = 9600;
