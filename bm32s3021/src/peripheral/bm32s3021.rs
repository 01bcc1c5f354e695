//! BM32S3021-1 IR Gesture Sensor Driver
//!
//! This module provides a driver for the BestModules BM32S3021-1, a two
//! channel IR proximity and slide-gesture sensor with a UART interface and
//! an INT output that goes low while an object is in range.
//!
//! Getters named after a register (`ir_debounce()` and friends) follow the
//! vendor library: a failed exchange reads as zero and is only logged. Use
//! [`Bm32s3021::read_register`] and the other `read_*` methods to see
//! the error instead.

use std::time::Duration;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::error::Result;
use crate::hw_trait::{InputPin, NoPin, SerialLink};
use crate::protocol::{Command, FrameChannel, Register};
use crate::tracing::prelude::*;

/// Low version byte that unlocks the OPA and emitter current registers.
const ANALOG_UNLOCK: u8 = 0xAA;

/// How long the sensor needs to learn a distance.
pub const LEARNING_PERIOD: Duration = Duration::from_secs(2);

bitflags! {
    /// IR status register.
    ///
    /// The slide and approach bits only mean something once the sensor
    /// reports itself calibrated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct IrStatus: u8 {
        const APPROACH = 0x01;
        const A_TO_B = 0x02;
        const B_TO_A = 0x04;
        const CALIBRATED = 0x08;
    }
}

/// Events encoded in an [`IrStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Approach,
    SlideAToB,
    SlideBToA,
}

impl IrStatus {
    pub fn is_calibrated(self) -> bool {
        self.contains(IrStatus::CALIBRATED)
    }

    /// Gestures currently reported, empty while uncalibrated.
    pub fn gestures(self) -> Vec<Gesture> {
        if !self.is_calibrated() {
            return Vec::new();
        }
        [
            (IrStatus::APPROACH, Gesture::Approach),
            (IrStatus::A_TO_B, Gesture::SlideAToB),
            (IrStatus::B_TO_A, Gesture::SlideBToA),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, gesture)| gesture)
        .collect()
    }
}

/// Firmware version as the two bytes the sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub low: u8,
    pub high: u8,
}

impl FirmwareVersion {
    /// Version number the way the vendor library reports it: the sum of
    /// both bytes.
    pub fn as_sum(self) -> u16 {
        self.low as u16 + self.high as u16
    }

    /// Both bytes combined as a 16-bit word. Unconfirmed against hardware.
    pub fn as_word(self) -> u16 {
        u16::from_le_bytes([self.low, self.high])
    }
}

/// Live readings, fetched in one burst (registers 0x02..=0x05).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrState {
    pub status: IrStatus,
    /// Left/right slide count, signed
    pub gesture_count: i8,
    pub ir1_reference: u8,
    pub ir2_reference: u8,
}

/// Gesture timing configuration, fetched in one burst (registers
/// 0x06..=0x0B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureConfig {
    pub debounce: u8,
    pub threshold: u8,
    pub irq_trigger_time: u8,
    pub continuity_gesture_time: u8,
    pub fastest_gesture_time: u8,
    pub slowest_gesture_time: u8,
}

impl GestureConfig {
    /// INT hold time after a valid gesture (4 ms units).
    pub fn irq_trigger(&self) -> Duration {
        Duration::from_millis(self.irq_trigger_time as u64 * 4)
    }

    /// Accumulated continuous slide time (64 ms units).
    pub fn continuity(&self) -> Duration {
        Duration::from_millis(self.continuity_gesture_time as u64 * 64)
    }

    /// Fastest slide still counted (20 ms + 4 ms units).
    pub fn fastest(&self) -> Duration {
        Duration::from_millis(20 + self.fastest_gesture_time as u64 * 4)
    }

    /// Slowest slide still counted (64 ms units).
    pub fn slowest(&self) -> Duration {
        Duration::from_millis(self.slowest_gesture_time as u64 * 64)
    }
}

/// Register values to write; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GestureSettings {
    pub debounce: Option<u8>,
    pub threshold: Option<u8>,
    pub irq_trigger_time: Option<u8>,
    pub continuity_gesture_time: Option<u8>,
    pub fastest_gesture_time: Option<u8>,
    pub slowest_gesture_time: Option<u8>,
    pub opa: Option<u8>,
    pub ir1_current: Option<u8>,
    pub ir2_current: Option<u8>,
}

impl GestureSettings {
    fn writes(&self) -> impl Iterator<Item = (Register, u8)> + '_ {
        [
            (Register::IrDebounce, self.debounce),
            (Register::IrThreshold, self.threshold),
            (Register::IrqTriggerTime, self.irq_trigger_time),
            (Register::ContinuityGestureTime, self.continuity_gesture_time),
            (Register::FastestGestureTime, self.fastest_gesture_time),
            (Register::SlowestGestureTime, self.slowest_gesture_time),
            (Register::IrOpa, self.opa),
            (Register::Ir1Current, self.ir1_current),
            (Register::Ir2Current, self.ir2_current),
        ]
        .into_iter()
        .filter_map(|(register, value)| value.map(|v| (register, v)))
    }

    fn touches_analog(&self) -> bool {
        self.opa.is_some() || self.ir1_current.is_some() || self.ir2_current.is_some()
    }

    /// Check every set value against its register's range.
    pub fn validate(&self) -> Result<()> {
        self.writes()
            .try_for_each(|(register, value)| register.check_write(value))
    }
}

impl From<GestureConfig> for GestureSettings {
    fn from(config: GestureConfig) -> Self {
        Self {
            debounce: Some(config.debounce),
            threshold: Some(config.threshold),
            irq_trigger_time: Some(config.irq_trigger_time),
            continuity_gesture_time: Some(config.continuity_gesture_time),
            fastest_gesture_time: Some(config.fastest_gesture_time),
            slowest_gesture_time: Some(config.slowest_gesture_time),
            ..Default::default()
        }
    }
}

/// BM32S3021-1 driver
pub struct Bm32s3021<L, P = NoPin> {
    channel: FrameChannel<L>,
    int_pin: P,
    learning_period: Duration,
}

impl<L: SerialLink> Bm32s3021<L, NoPin> {
    /// Create a driver for a sensor whose INT line is not connected.
    pub fn new(channel: FrameChannel<L>) -> Self {
        Self::with_int_pin(channel, NoPin)
    }
}

impl<L: SerialLink, P: InputPin> Bm32s3021<L, P> {
    /// Create a driver that also samples the INT line.
    pub fn with_int_pin(channel: FrameChannel<L>, int_pin: P) -> Self {
        Self {
            channel,
            int_pin,
            learning_period: LEARNING_PERIOD,
        }
    }

    /// Level of the INT output: 0 while an object is detected, 1 when idle.
    pub async fn int_level(&mut self) -> Result<u8> {
        Ok(self.int_pin.is_high().await? as u8)
    }

    /// Read one register.
    pub async fn read_register(&mut self, register: Register) -> Result<u8> {
        let response = self.channel.transact(Command::read(register)).await?;
        response.value()
    }

    /// Write one register after checking access and range.
    pub async fn write_register(&mut self, register: Register, value: u8) -> Result<()> {
        register.check_write(value)?;
        let response = self
            .channel
            .transact(Command::write(register, value))
            .await?;
        response.check_ack()?;
        debug!("{} set to {}", register, value);
        Ok(())
    }

    async fn read_or_zero(&mut self, register: Register) -> u8 {
        match self.read_register(register).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Reading {} failed: {}", register, e);
                0
            }
        }
    }

    async fn read_block(&mut self, start: Register, count: u8) -> Result<Vec<u8>> {
        let response = self
            .channel
            .transact(Command::ReadRegisters { start, count })
            .await?;
        Ok(response.values().to_vec())
    }

    async fn command(&mut self, command: Command) -> Result<()> {
        self.channel.transact(command).await?.check_ack()
    }

    /// Reset the sensor.
    pub async fn reset(&mut self) -> Result<()> {
        self.command(Command::Reset).await?;
        info!("Sensor reset");
        Ok(())
    }

    /// Learn the current object distance as the trigger distance.
    ///
    /// Place the object first. Returns after the learning period, whether
    /// or not the sensor accepted the command.
    pub async fn distance_learning(&mut self) -> Result<()> {
        let result = self.command(Command::DistanceLearning).await;
        time::sleep(self.learning_period).await;
        match &result {
            Ok(()) => info!("Distance learned"),
            Err(e) => warn!("Distance learning failed: {}", e),
        }
        result
    }

    /// IR status; empty on failure.
    pub async fn ir_status(&mut self) -> IrStatus {
        IrStatus::from_bits_retain(self.read_or_zero(Register::IrStatus).await)
    }

    /// Left/right slide count, as the raw register byte.
    pub async fn ir_gesture_num(&mut self) -> u8 {
        self.read_or_zero(Register::IrGestureCount).await
    }

    /// Firmware version as the vendor library reports it: the sum of both
    /// bytes. Both bytes are always read; a failed read counts as 0.
    pub async fn firmware_version(&mut self) -> u16 {
        let version = FirmwareVersion {
            low: self.read_or_zero(Register::FirmwareVersionLow).await,
            high: self.read_or_zero(Register::FirmwareVersionHigh).await,
        };
        version.as_sum()
    }

    pub async fn read_firmware_version(&mut self) -> Result<FirmwareVersion> {
        let low = self.read_register(Register::FirmwareVersionLow).await?;
        let high = self.read_register(Register::FirmwareVersionHigh).await?;
        Ok(FirmwareVersion { low, high })
    }

    pub async fn ir_debounce(&mut self) -> u8 {
        self.read_or_zero(Register::IrDebounce).await
    }

    pub async fn ir_threshold(&mut self) -> u8 {
        self.read_or_zero(Register::IrThreshold).await
    }

    pub async fn irq_trigger_time(&mut self) -> u8 {
        self.read_or_zero(Register::IrqTriggerTime).await
    }

    pub async fn continuity_gesture_time(&mut self) -> u8 {
        self.read_or_zero(Register::ContinuityGestureTime).await
    }

    pub async fn fastest_gesture_time(&mut self) -> u8 {
        self.read_or_zero(Register::FastestGestureTime).await
    }

    pub async fn slowest_gesture_time(&mut self) -> u8 {
        self.read_or_zero(Register::SlowestGestureTime).await
    }

    pub async fn ir_opa(&mut self) -> u8 {
        self.read_or_zero(Register::IrOpa).await
    }

    pub async fn ir1_current(&mut self) -> u8 {
        self.read_or_zero(Register::Ir1Current).await
    }

    pub async fn ir2_current(&mut self) -> u8 {
        self.read_or_zero(Register::Ir2Current).await
    }

    pub async fn ir1_reference(&mut self) -> u8 {
        self.read_or_zero(Register::Ir1Reference).await
    }

    pub async fn ir2_reference(&mut self) -> u8 {
        self.read_or_zero(Register::Ir2Reference).await
    }

    /// Debounce count, 0..=255.
    pub async fn set_ir_debounce(&mut self, debounce: u8) -> Result<()> {
        self.write_register(Register::IrDebounce, debounce).await
    }

    /// Trigger threshold, 10..=200.
    pub async fn set_ir_threshold(&mut self, threshold: u8) -> Result<()> {
        self.write_register(Register::IrThreshold, threshold).await
    }

    /// INT hold time in 4 ms units.
    pub async fn set_irq_trigger_time(&mut self, irq_time: u8) -> Result<()> {
        self.write_register(Register::IrqTriggerTime, irq_time).await
    }

    /// Continuous slide time in 64 ms units.
    pub async fn set_continuity_gesture_time(&mut self, ir_time: u8) -> Result<()> {
        self.write_register(Register::ContinuityGestureTime, ir_time)
            .await
    }

    /// Fastest slide, 20 ms + 4 ms units, 0..=200.
    pub async fn set_fastest_gesture_time(&mut self, ir_time: u8) -> Result<()> {
        self.write_register(Register::FastestGestureTime, ir_time).await
    }

    /// Slowest slide in 64 ms units, 0..=200.
    pub async fn set_slowest_gesture_time(&mut self, ir_time: u8) -> Result<()> {
        self.write_register(Register::SlowestGestureTime, ir_time).await
    }

    /// Amplifier gain. Needs [`Self::unlock_analog_settings`] first.
    pub async fn set_ir_opa(&mut self, opa: u8) -> Result<()> {
        self.write_register(Register::IrOpa, opa).await
    }

    /// IR1 emitter current, `current + 1` mA. Needs the analog unlock.
    pub async fn set_ir1_current(&mut self, current: u8) -> Result<()> {
        self.write_register(Register::Ir1Current, current).await
    }

    /// IR2 emitter current, `current + 1` mA. Needs the analog unlock.
    pub async fn set_ir2_current(&mut self, current: u8) -> Result<()> {
        self.write_register(Register::Ir2Current, current).await
    }

    pub async fn write_version_low(&mut self, value: u8) -> Result<()> {
        self.write_register(Register::FirmwareVersionLow, value).await
    }

    /// Allow writes to the OPA and emitter current registers.
    pub async fn unlock_analog_settings(&mut self) -> Result<()> {
        self.write_version_low(ANALOG_UNLOCK).await
    }

    /// Status, slide count and both references in one exchange.
    pub async fn read_ir_state(&mut self) -> Result<IrState> {
        let values = self.read_block(Register::IrStatus, 4).await?;
        Ok(IrState {
            status: IrStatus::from_bits_retain(values[0]),
            gesture_count: values[1] as i8,
            ir1_reference: values[2],
            ir2_reference: values[3],
        })
    }

    /// All six gesture timing registers in one exchange.
    pub async fn read_gesture_config(&mut self) -> Result<GestureConfig> {
        let values = self.read_block(Register::IrDebounce, 6).await?;
        Ok(GestureConfig {
            debounce: values[0],
            threshold: values[1],
            irq_trigger_time: values[2],
            continuity_gesture_time: values[3],
            fastest_gesture_time: values[4],
            slowest_gesture_time: values[5],
        })
    }

    /// Write every set field, unlocking the analog registers when needed.
    ///
    /// All values are range checked before the first write. Stops at the
    /// first failed write.
    pub async fn apply_settings(&mut self, settings: &GestureSettings) -> Result<()> {
        settings.validate()?;
        if settings.touches_analog() {
            self.unlock_analog_settings().await?;
        }
        for (register, value) in settings.writes() {
            self.write_register(register, value).await?;
        }
        Ok(())
    }

    /// Log every register at debug level.
    pub async fn dump_configuration(&mut self) -> Result<()> {
        debug!("=== BM32S3021-1 Configuration Dump ===");

        let version = self.read_firmware_version().await?;
        debug!(
            "Firmware: low 0x{:02X}, high 0x{:02X} (reported {})",
            version.low,
            version.high,
            version.as_sum()
        );

        let config = self.read_gesture_config().await?;
        debug!("IR_DEBOUNCE: {}", config.debounce);
        debug!("IR_THRESHOLD: {}", config.threshold);
        debug!("IRQ_TRIGGER_TIME: {} ({:?})", config.irq_trigger_time, config.irq_trigger());
        debug!(
            "CONTINUITY_GESTURE_TIME: {} ({:?})",
            config.continuity_gesture_time,
            config.continuity()
        );
        debug!(
            "FASTEST_GESTURE_TIME: {} ({:?})",
            config.fastest_gesture_time,
            config.fastest()
        );
        debug!(
            "SLOWEST_GESTURE_TIME: {} ({:?})",
            config.slowest_gesture_time,
            config.slowest()
        );

        let opa = self.read_register(Register::IrOpa).await?;
        debug!("IR_OPA: {}", opa);
        for register in [Register::Ir1Current, Register::Ir2Current] {
            let current = self.read_register(register).await?;
            debug!("{}: {} ({} mA)", register, current, current as u16 + 1);
        }

        let state = self.read_ir_state().await?;
        debug!("IR_STATUS: 0x{:02X} ({:?})", state.status.bits(), state.status);
        debug!("IR_GESTURE_COUNT: {}", state.gesture_count);
        debug!(
            "IR references: {} / {}",
            state.ir1_reference, state.ir2_reference
        );

        debug!("=== End Configuration Dump ===");
        Ok(())
    }

    #[cfg(test)]
    fn with_learning_period(mut self, period: Duration) -> Self {
        self.learning_period = period;
        self
    }
}
