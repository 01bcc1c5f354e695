//! Request/response channel for the sensor protocol.
//!
//! One exchange is: drop stale input, write the command frame, collect the
//! fixed-length response byte by byte under a per-byte deadline, verify the
//! checksum. Nothing survives from one exchange to the next.

use std::time::Duration;

use bytes::BytesMut;
use tokio::time;
use tokio_util::codec::Encoder;

use super::frame::{Command, FrameCodec, Response, MIN_RESPONSE_LEN};
use crate::error::{Error, Result};
use crate::hw_trait::SerialLink;
use crate::tracing::prelude::*;

/// Longest wait for any single response byte.
pub const DEFAULT_BYTE_TIMEOUT: Duration = Duration::from_millis(10);

/// Quiet time the sensor needs after each exchange.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(10);

/// Frame-level channel over a serial link.
///
/// Exchanges take `&mut self`; two interleaved exchanges would corrupt the
/// framing, and exclusive borrows rule that out.
pub struct FrameChannel<L> {
    link: L,
    codec: FrameCodec,
    byte_timeout: Duration,
    settle: Duration,
}

impl<L: SerialLink> FrameChannel<L> {
    /// Create a channel with the default timing.
    pub fn new(link: L) -> Self {
        Self {
            link,
            codec: FrameCodec,
            byte_timeout: DEFAULT_BYTE_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Override the per-byte timeout and the post-exchange settle delay.
    pub fn with_timing(mut self, byte_timeout: Duration, settle: Duration) -> Self {
        self.byte_timeout = byte_timeout;
        self.settle = settle;
        self
    }

    /// Discard pending input, then write `frame` verbatim.
    pub async fn send_command(&mut self, frame: &[u8]) -> Result<()> {
        self.link.discard_input().await?;
        trace!("TX {:02X?}", frame);
        self.link.write_all(frame).await
    }

    /// Collect `expected_len` bytes and verify the checksum.
    ///
    /// Each byte gets its own `byte_timeout`, so a silent device is given up
    /// on after `expected_len * byte_timeout` at the latest.
    pub async fn receive_response(
        &mut self,
        expected_len: usize,
        byte_timeout: Duration,
    ) -> Result<Response> {
        if expected_len < MIN_RESPONSE_LEN {
            return Err(Error::Protocol(format!(
                "response length {} below minimum of {}",
                expected_len, MIN_RESPONSE_LEN
            )));
        }

        let mut bytes = Vec::with_capacity(expected_len);
        while bytes.len() < expected_len {
            match time::timeout(byte_timeout, self.link.read_byte()).await {
                Ok(byte) => bytes.push(byte?),
                Err(_) => {
                    debug!(
                        "No response byte within {:?} ({} of {} received: {:02X?})",
                        byte_timeout,
                        bytes.len(),
                        expected_len,
                        bytes
                    );
                    return Err(Error::Timeout {
                        received: bytes.len(),
                        expected: expected_len,
                    });
                }
            }
        }

        trace!("RX {:02X?}", bytes);
        Response::from_bytes(bytes)
    }

    /// Run one full exchange for `command`.
    ///
    /// The settle delay is observed whether or not the exchange succeeded.
    pub async fn transact(&mut self, command: Command) -> Result<Response> {
        let expected_len = command.response_len();
        trace!("Exchange {:?}", command);

        let mut frame = BytesMut::with_capacity(6);
        self.codec.encode(command, &mut frame)?;

        let result = match self.send_command(&frame).await {
            Ok(()) => self.receive_response(expected_len, self.byte_timeout).await,
            Err(e) => Err(e),
        };

        if !self.settle.is_zero() {
            time::sleep(self.settle).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::mock::{ack_reply, read_reply, ScriptedLink};
    use crate::protocol::Register;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_read_exchange() {
        let (link, log) = ScriptedLink::new([read_reply(0x06, &[0x10])]);
        let mut channel = FrameChannel::new(link);

        let response = channel
            .transact(Command::read(Register::IrDebounce))
            .await
            .unwrap();
        assert_eq!(response.value().unwrap(), 0x10);

        let log = log.lock().unwrap();
        assert_eq!(log.writes, vec![vec![0x55, 0x80, 0x06, 0x01, 0xDC]]);
        assert_eq!(log.discards, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_input_discarded() {
        let (link, _log) = ScriptedLink::new([ack_reply(0x7F)]);
        let link = link.with_stale_input(&[0x01, 0x02, 0x03]);
        let mut channel = FrameChannel::new(link);

        let response = channel
            .transact(Command::write(Register::IrDebounce, 16))
            .await
            .unwrap();
        assert!(response.check_ack().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let (link, _log) = ScriptedLink::new([]);
        let mut channel = FrameChannel::new(link).with_timing(DEFAULT_BYTE_TIMEOUT, Duration::ZERO);

        let start = Instant::now();
        let err = channel
            .transact(Command::read(Register::IrStatus))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                received: 0,
                expected: 6
            }
        ));
        assert!(start.elapsed() <= 6 * DEFAULT_BYTE_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_response_times_out() {
        let (link, _log) = ScriptedLink::new([vec![0x55, 0x80]]);
        let mut channel = FrameChannel::new(link);

        let err = channel
            .transact(Command::read(Register::IrStatus))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                received: 2,
                expected: 6
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_per_byte() {
        use crate::transport::StreamLink;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        const GAP: Duration = Duration::from_millis(8);
        let (host, mut device) = tokio::io::duplex(64);
        let device = tokio::spawn(async move {
            let mut command = [0u8; 5];
            device.read_exact(&mut command).await.unwrap();
            for byte in read_reply(0x06, &[0x10]) {
                time::sleep(GAP).await;
                device.write_all(&[byte]).await.unwrap();
            }
            command
        });

        let mut channel =
            FrameChannel::new(StreamLink::new(host)).with_timing(DEFAULT_BYTE_TIMEOUT, Duration::ZERO);
        let start = Instant::now();
        let response = channel
            .transact(Command::read(Register::IrDebounce))
            .await
            .unwrap();

        // Six bytes 8 ms apart: well past one byte timeout in total.
        assert!(start.elapsed() >= 6 * GAP);
        assert!(start.elapsed() > DEFAULT_BYTE_TIMEOUT);
        assert_eq!(response.value().unwrap(), 0x10);
        assert_eq!(device.await.unwrap(), [0x55, 0x80, 0x06, 0x01, 0xDC]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_response_rejected() {
        let mut reply = read_reply(0x07, &[42]);
        reply[4] ^= 0x01;
        let (link, _log) = ScriptedLink::new([reply]);
        let mut channel = FrameChannel::new(link);

        let err = channel
            .transact(Command::read(Register::IrThreshold))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Checksum { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_line_rejected() {
        let (link, _log) = ScriptedLink::new([vec![0; 6]]);
        let mut channel = FrameChannel::new(link);

        let err = channel
            .transact(Command::read(Register::IrThreshold))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Checksum {
                expected: 0,
                actual: 0
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_observed() {
        let (link, _log) = ScriptedLink::new([ack_reply(0x7F)]);
        let mut channel = FrameChannel::new(link);

        let start = Instant::now();
        channel.transact(Command::Reset).await.unwrap();
        assert!(start.elapsed() >= DEFAULT_SETTLE);
    }

    #[tokio::test]
    async fn test_response_length_below_minimum() {
        let (link, log) = ScriptedLink::new([]);
        let mut channel = FrameChannel::new(link);

        for len in [0, 1, 2] {
            let err = channel
                .receive_response(len, DEFAULT_BYTE_TIMEOUT)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }
        assert!(log.lock().unwrap().writes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_is_stateless() {
        let (link, _log) = ScriptedLink::new([vec![0x55, 0x7F, 0x00], ack_reply(0x7F)]);
        let mut channel = FrameChannel::new(link);

        let command = Command::write(Register::IrThreshold, 20);
        assert!(channel.transact(command.clone()).await.is_err());
        assert!(channel.transact(command).await.is_ok());
    }
}
