//! Hardware UART link.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use super::stream::read_one;
use crate::error::Result;
use crate::hw_trait::SerialLink;
use crate::protocol::BAUD_RATE;
use crate::tracing::prelude::*;

/// Serial port opened at the sensor's fixed 9600 8N1.
pub struct SerialPortLink {
    port: SerialStream,
}

impl SerialPortLink {
    pub fn open(path: &str) -> Result<Self> {
        let port = tokio_serial::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        debug!("Opened {} at {} baud", path, BAUD_RATE);
        Ok(Self { port })
    }
}

#[async_trait]
impl SerialLink for SerialPortLink {
    async fn discard_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data).await?;
        self.port.flush().await?;
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8> {
        read_one(&mut self.port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{Command, FrameChannel, Register};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_open_missing_port() {
        let result = SerialPortLink::open("/dev/does-not-exist-bm32s3021");
        assert!(matches!(result, Err(Error::Serial(_)) | Err(Error::Io(_))));
    }

    #[tokio::test]
    #[cfg_attr(feature = "skip-pty-tests", ignore)]
    async fn test_exchange_over_pty() {
        let (host, mut device) = SerialStream::pair().unwrap();
        let device = tokio::spawn(async move {
            let mut command = [0u8; 6];
            device.read_exact(&mut command).await.unwrap();
            device.write_all(&[0x55, 0x7F, 0xD4]).await.unwrap();
            command
        });

        let mut channel = FrameChannel::new(SerialPortLink { port: host })
            .with_timing(Duration::from_millis(500), Duration::ZERO);
        let response = channel
            .transact(Command::write(Register::IrDebounce, 16))
            .await
            .unwrap();
        response.check_ack().unwrap();
        assert_eq!(device.await.unwrap(), [0x55, 0xC0, 0x06, 0x01, 0x10, 0x2C]);
    }
}
