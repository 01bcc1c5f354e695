//! Physical transport layer for the sensor connection.
//!
//! This module provides the concrete links behind the `hw_trait`
//! capabilities: a hardware UART, a generic byte stream (TCP serial bridge,
//! pty, in-memory pipe) and the sysfs GPIO line for the INT output. None of
//! them know anything about frames.

pub mod gpio;
pub mod serial;
pub mod stream;

pub use gpio::SysfsPin;
pub use serial::SerialPortLink;
pub use stream::StreamLink;

use crate::config::{Endpoint, IntPinConfig};
use crate::error::Result;
use crate::hw_trait::{InputPin, NoPin, SerialLink};
use crate::tracing::prelude::*;

/// Open the link selected by configuration.
///
/// The choice is made once; the driver keeps the link for its lifetime.
pub async fn open_link(endpoint: &Endpoint) -> Result<Box<dyn SerialLink>> {
    match endpoint {
        Endpoint::Uart(path) => {
            info!("Opening serial port {}", path);
            Ok(Box::new(SerialPortLink::open(path)?))
        }
        Endpoint::Tcp(addr) => {
            info!("Connecting to serial bridge at {}", addr);
            Ok(Box::new(StreamLink::connect_tcp(addr).await?))
        }
    }
}

/// Open the INT input, or a stand-in that always reads idle.
pub async fn open_int_pin(config: Option<&IntPinConfig>) -> Result<Box<dyn InputPin>> {
    match config {
        Some(pin) => Ok(Box::new(SysfsPin::open(&pin.sysfs_root, pin.gpio).await?)),
        None => {
            debug!("No INT pin configured");
            Ok(Box::new(NoPin))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{Command, FrameChannel, Register};
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_no_int_pin_reads_idle() {
        let mut pin = open_int_pin(None).await.unwrap();
        assert!(pin.is_high().await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_int_pin() {
        let root = std::env::temp_dir().join(format!("bm32s3021-open-pin-{}", std::process::id()));
        let dir = root.join("gpio5");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("value"), "0\n").await.unwrap();

        let config = IntPinConfig {
            gpio: 5,
            sysfs_root: PathBuf::from(&root),
        };
        let mut pin = open_int_pin(Some(&config)).await.unwrap();
        assert!(!pin.is_high().await.unwrap());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut command = [0u8; 5];
            socket.read_exact(&mut command).await.unwrap();
            socket
                .write_all(&[0x55, 0x80, 0x07, 0x01, 0x14, 0xF1])
                .await
                .unwrap();
            command
        });

        let link = open_link(&Endpoint::Tcp(addr.to_string())).await.unwrap();
        let mut channel =
            FrameChannel::new(link).with_timing(std::time::Duration::from_millis(500), Default::default());
        let response = channel
            .transact(Command::read(Register::IrThreshold))
            .await
            .unwrap();
        assert_eq!(response.value().unwrap(), 20);
        assert_eq!(bridge.await.unwrap(), [0x55, 0x80, 0x07, 0x01, 0xDD]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints() {
        let uart = open_link(&Endpoint::Uart("/dev/does-not-exist-bm32s3021".into())).await;
        assert!(matches!(uart, Err(Error::Serial(_)) | Err(Error::Io(_))));

        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let tcp = open_link(&Endpoint::Tcp(addr.to_string())).await;
        assert!(matches!(tcp, Err(Error::Io(_))));
    }
}
