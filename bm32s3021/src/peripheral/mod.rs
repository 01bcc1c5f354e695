//! Peripheral device drivers.

pub mod bm32s3021;

pub use bm32s3021::Bm32s3021;
