//! Driver for the BM32S3021-1 IR gesture/proximity sensor.
//!
//! The sensor speaks a checksum-framed command/response protocol over a
//! 9600 bps UART. Layers, bottom up:
//!
//! - [`hw_trait`]: the capabilities the driver needs (a serial link, an
//!   input pin);
//! - [`transport`]: concrete links (hardware UART, byte stream, sysfs GPIO);
//! - [`protocol`]: frames, checksum and the request/response channel;
//! - [`peripheral`]: the sensor driver proper;
//! - [`monitor`]: a polling task that logs gestures.

pub mod config;
pub mod error;
pub mod hw_trait;
pub mod monitor;
pub mod peripheral;
pub mod protocol;
pub mod tracing;
pub mod transport;

pub use error::{Error, Result};
pub use peripheral::Bm32s3021;
