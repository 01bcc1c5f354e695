//! Byte-stream link for emulated or bridged serial lines.
//!
//! Anything that reads and writes bytes can stand in for the UART: a TCP
//! serial server (ser2net and friends), a pty, or an in-memory pipe.

use std::io;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;
use crate::hw_trait::SerialLink;
use crate::tracing::prelude::*;

pub struct StreamLink<S> {
    stream: S,
}

impl<S> StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl StreamLink<TcpStream> {
    /// Connect to a TCP serial bridge in raw mode.
    pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

/// Read exactly one byte; a dropped call consumes nothing.
pub(crate) async fn read_one<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    match reader.read(&mut byte).await? {
        0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial link closed").into()),
        _ => Ok(byte[0]),
    }
}

#[async_trait]
impl<S> SerialLink for StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn discard_input(&mut self) -> Result<()> {
        let mut scratch = [0u8; 64];
        let mut dropped = 0;
        // Drain only what is already buffered; never wait for more.
        while let Some(read) = self.stream.read(&mut scratch).now_or_never() {
            match read? {
                0 => break,
                n => dropped += n,
            }
        }
        if dropped > 0 {
            debug!("Discarded {} stale bytes", dropped);
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8> {
        read_one(&mut self.stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{checksum, Command, FrameChannel, Register};
    use tokio::io::{duplex, DuplexStream};

    // Minimal device on the far end of a pipe: answers reads of the debounce
    // register with `value` and acknowledges everything else.
    async fn fake_sensor(mut port: DuplexStream, value: u8) {
        let mut frame = [0u8; 6];
        loop {
            if port.read_exact(&mut frame[..3]).await.is_err() {
                return;
            }
            let reply = match frame[1] {
                0x80 => {
                    port.read_exact(&mut frame[3..5]).await.unwrap();
                    let mut reply = vec![0x55, 0x80, frame[2], frame[3], value];
                    reply.push(checksum(&reply));
                    reply
                }
                0xC0 => {
                    port.read_exact(&mut frame[3..6]).await.unwrap();
                    vec![0x55, 0x7F, 0xD4]
                }
                _ => vec![0x55, 0x7F, 0xD4],
            };
            port.write_all(&reply).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exchange_over_pipe() {
        let (host, device) = duplex(64);
        tokio::spawn(fake_sensor(device, 16));

        let mut channel = FrameChannel::new(StreamLink::new(host));
        let response = channel
            .transact(Command::read(Register::IrDebounce))
            .await
            .unwrap();
        assert_eq!(response.value().unwrap(), 16);

        let response = channel
            .transact(Command::write(Register::IrDebounce, 16))
            .await
            .unwrap();
        assert!(response.check_ack().is_ok());
    }

    #[tokio::test]
    async fn test_discard_drops_buffered_bytes() {
        let (host, mut device) = duplex(64);
        device.write_all(&[0xAA, 0xBB, 0xCC]).await.unwrap();

        let mut link = StreamLink::new(host);
        link.discard_input().await.unwrap();

        device.write_all(&[0x55]).await.unwrap();
        assert_eq!(link.read_byte().await.unwrap(), 0x55);
    }

    #[tokio::test]
    async fn test_discard_on_empty_line_does_not_block() {
        let (host, _device) = duplex(64);
        let mut link = StreamLink::new(host);
        link.discard_input().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_line_reports_eof() {
        let (host, device) = duplex(64);
        drop(device);
        let mut link = StreamLink::new(host);
        assert!(matches!(link.read_byte().await, Err(Error::Io(_))));
    }
}
