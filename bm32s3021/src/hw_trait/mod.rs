//! Hardware abstraction layer traits.
//!
//! The frame layer and the sensor driver only see these capabilities, never
//! a concrete port, so the same driver runs over a hardware UART, a bridged
//! or emulated serial line, or an in-memory link in tests.

use async_trait::async_trait;

use crate::error::Result;

/// Byte-oriented serial link to the sensor.
#[async_trait]
pub trait SerialLink: Send {
    /// Throw away any received bytes not yet read.
    async fn discard_input(&mut self) -> Result<()>;

    /// Write all of `data` and flush it to the line.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next received byte.
    ///
    /// Waits indefinitely; callers bound the wait with a deadline. Must be
    /// cancel safe: a byte is never consumed by a dropped call.
    async fn read_byte(&mut self) -> Result<u8>;
}

/// Digital input line, sampled on demand.
#[async_trait]
pub trait InputPin: Send {
    async fn is_high(&mut self) -> Result<bool>;
}

#[async_trait]
impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    async fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input().await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data).await
    }

    async fn read_byte(&mut self) -> Result<u8> {
        (**self).read_byte().await
    }
}

#[async_trait]
impl<T: InputPin + ?Sized> InputPin for Box<T> {
    async fn is_high(&mut self) -> Result<bool> {
        (**self).is_high().await
    }
}

/// Stand-in for boards where the INT line is not wired.
///
/// Always reads high, the idle level.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPin;

#[async_trait]
impl InputPin for NoPin {
    async fn is_high(&mut self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod mock;
