//! INT line through the Linux sysfs GPIO interface.
//!
//! The sensor pulls INT low while an object is in range.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Error, Result};
use crate::hw_trait::InputPin;
use crate::tracing::prelude::*;

/// Default mount point of the sysfs GPIO class.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

pub struct SysfsPin {
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `gpio` if necessary and configure it as an input.
    pub async fn open(root: &Path, gpio: u32) -> Result<Self> {
        let dir = root.join(format!("gpio{}", gpio));
        if fs::metadata(&dir).await.is_err() {
            debug!("Exporting GPIO {}", gpio);
            fs::write(root.join("export"), gpio.to_string()).await?;
        }

        if let Err(e) = fs::write(dir.join("direction"), "in").await {
            // Some boards pin-mux the line as input and lock the attribute.
            warn!("Could not set GPIO {} direction: {}", gpio, e);
        }

        Ok(Self {
            value_path: dir.join("value"),
        })
    }
}

#[async_trait]
impl InputPin for SysfsPin {
    async fn is_high(&mut self) -> Result<bool> {
        let value = fs::read_to_string(&self.value_path).await?;
        match value.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(Error::Protocol(format!(
                "unexpected GPIO value {:?} in {}",
                other,
                self.value_path.display()
            ))),
        }
    }
}
