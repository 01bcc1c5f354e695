//! Configuration management for the sensor daemon and CLI.
//!
//! Configuration is read from a TOML file. Every section is optional; a
//! missing file means built-in defaults.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"        # or: tcp = "10.0.0.7:4001"
//! byte_timeout_ms = 10
//! settle_ms = 10
//!
//! [int_pin]
//! gpio = 17
//!
//! [daemon]
//! log_level = "info"
//! poll_interval_ms = 100
//!
//! [gesture]
//! debounce = 16
//! threshold = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::peripheral::bm32s3021::GestureSettings;
use crate::transport::gpio::SYSFS_GPIO_ROOT;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "BM32S3021_CONFIG";

/// System-wide configuration file.
pub const SYSTEM_CONFIG: &str = "/etc/bm32s3021/bm32s3021.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Serial link configuration
    pub serial: SerialConfig,

    /// INT output wiring, if connected
    pub int_pin: Option<IntPinConfig>,

    /// Daemon behaviour
    pub daemon: DaemonConfig,

    /// Register values written at daemon start
    pub gesture: Option<GestureSettings>,
}

/// Serial link configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Serial device path
    pub port: Option<String>,

    /// Address of a TCP serial bridge, used instead of `port`
    pub tcp: Option<String>,

    /// Per-byte response timeout
    pub byte_timeout_ms: u64,

    /// Pause after each exchange
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            tcp: None,
            byte_timeout_ms: 10,
            settle_ms: 10,
        }
    }
}

/// Where the sensor is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Uart(String),
    Tcp(String),
}

impl SerialConfig {
    pub const DEFAULT_PORT: &'static str = "/dev/ttyUSB0";

    pub fn endpoint(&self) -> Endpoint {
        match (&self.port, &self.tcp) {
            (_, Some(addr)) => Endpoint::Tcp(addr.clone()),
            (Some(port), None) => Endpoint::Uart(port.clone()),
            (None, None) => Endpoint::Uart(Self::DEFAULT_PORT.to_string()),
        }
    }

    pub fn byte_timeout(&self) -> Duration {
        Duration::from_millis(self.byte_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// INT pin wiring.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntPinConfig {
    /// GPIO line number
    pub gpio: u32,

    /// sysfs GPIO class directory
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(SYSFS_GPIO_ROOT)
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Log level when RUST_LOG is unset
    pub log_level: String,

    /// Time between status polls
    pub poll_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            poll_interval_ms: 100,
        }
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// `BM32S3021_CONFIG` wins over the system file; with neither present
    /// the defaults apply.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }
        let system = Path::new(SYSTEM_CONFIG);
        if system.exists() {
            return Self::load_from(system);
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.serial.port.is_some() && self.serial.tcp.is_some() {
            return Err(Error::Config(
                "serial.port and serial.tcp are mutually exclusive".into(),
            ));
        }
        if self.serial.byte_timeout_ms == 0 {
            return Err(Error::Config("serial.byte_timeout_ms must be positive".into()));
        }
        if self.daemon.poll_interval_ms == 0 {
            return Err(Error::Config("daemon.poll_interval_ms must be positive".into()));
        }
        if let Some(gesture) = &self.gesture {
            gesture
                .validate()
                .map_err(|e| Error::Config(format!("gesture: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(
            config.serial.endpoint(),
            Endpoint::Uart("/dev/ttyUSB0".into())
        );
        assert_eq!(config.serial.byte_timeout(), Duration::from_millis(10));
        assert_eq!(config.daemon.poll_interval(), Duration::from_millis(100));
        assert!(config.int_pin.is_none());
        assert!(config.gesture.is_none());
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            [serial]
            tcp = "10.0.0.7:4001"
            byte_timeout_ms = 50

            [int_pin]
            gpio = 17

            [daemon]
            log_level = "debug"

            [gesture]
            debounce = 16
            threshold = 20
            ir1_current = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.endpoint(), Endpoint::Tcp("10.0.0.7:4001".into()));
        assert_eq!(config.serial.settle_ms, 10);
        let pin = config.int_pin.unwrap();
        assert_eq!(pin.gpio, 17);
        assert_eq!(pin.sysfs_root, PathBuf::from("/sys/class/gpio"));
        assert_eq!(config.daemon.log_level, "debug");
        let gesture = config.gesture.unwrap();
        assert_eq!(gesture.debounce, Some(16));
        assert_eq!(gesture.threshold, Some(20));
        assert_eq!(gesture.ir1_current, Some(25));
        assert_eq!(gesture.slowest_gesture_time, None);
    }

    #[test]
    fn test_rejects_both_endpoints() {
        let err = Config::parse(
            r#"
            [serial]
            port = "/dev/ttyS1"
            tcp = "localhost:4001"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(Config::parse("[serial]\nbyte_timeout_ms = 0").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_gesture() {
        let err = Config::parse("[gesture]\nthreshold = 5").unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(Config::parse("[serial]\nbaud = 115200").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bm32s3021-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[daemon]\npoll_interval_ms = 250\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.daemon.poll_interval(), Duration::from_millis(250));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
