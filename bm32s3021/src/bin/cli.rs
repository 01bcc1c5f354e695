//! Command-line interface for the BM32S3021-1 sensor.
//!
//! Talks to the sensor directly over the configured serial link, so the
//! daemon must not be running against the same port.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use bm32s3021::config::{Config, SerialConfig};
use bm32s3021::hw_trait::{InputPin, SerialLink};
use bm32s3021::peripheral::bm32s3021::{FirmwareVersion, GestureConfig, IrState};
use bm32s3021::protocol::{FrameChannel, Register};
use bm32s3021::{tracing, transport, Bm32s3021};

#[derive(Debug, Parser)]
#[command(name = "bm32s3021-cli", version, about = "Inspect and configure a BM32S3021-1 gesture sensor")]
struct Cli {
    /// Configuration file (default: $BM32S3021_CONFIG or the system file)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overriding the configuration
    #[arg(short, long, conflicts_with = "tcp")]
    port: Option<String>,

    /// TCP serial bridge address, overriding the configuration
    #[arg(long)]
    tcp: Option<String>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show live status, slide count and INT level
    Status,
    /// Show the firmware version
    Version,
    /// Read one register by name (e.g. ir-threshold)
    Get { register: Register },
    /// Write one register by name
    Set { register: Register, value: u8 },
    /// Read every register
    Dump {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the [gesture] section of the configuration
    Apply,
    /// Run distance learning with the target held in place
    Learn,
    /// Reset the sensor
    Reset,
    /// Allow writes to the OPA and emitter current registers
    Unlock,
}

#[derive(Debug, Serialize)]
struct Snapshot {
    firmware: FirmwareVersion,
    state: IrState,
    gesture: GestureConfig,
    opa: u8,
    ir1_current: u8,
    ir2_current: u8,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.port.is_some() || cli.tcp.is_some() {
        config.serial = SerialConfig {
            port: cli.port.clone(),
            tcp: cli.tcp.clone(),
            ..config.serial
        };
    }
    Ok(config)
}

async fn snapshot<L: SerialLink, P: InputPin>(sensor: &mut Bm32s3021<L, P>) -> Result<Snapshot> {
    Ok(Snapshot {
        firmware: sensor.read_firmware_version().await?,
        state: sensor.read_ir_state().await?,
        gesture: sensor.read_gesture_config().await?,
        opa: sensor.read_register(Register::IrOpa).await?,
        ir1_current: sensor.read_register(Register::Ir1Current).await?,
        ir2_current: sensor.read_register(Register::Ir2Current).await?,
    })
}

fn print_snapshot(s: &Snapshot) {
    println!(
        "firmware                 {:02X}.{:02X} (reported {})",
        s.firmware.high,
        s.firmware.low,
        s.firmware.as_sum()
    );
    println!("status                   {:?}", s.state.status);
    println!("gesture count            {}", s.state.gesture_count);
    println!("ir1 reference            {}", s.state.ir1_reference);
    println!("ir2 reference            {}", s.state.ir2_reference);
    println!("debounce                 {}", s.gesture.debounce);
    println!("threshold                {}", s.gesture.threshold);
    println!(
        "irq trigger time         {} ({:?})",
        s.gesture.irq_trigger_time,
        s.gesture.irq_trigger()
    );
    println!(
        "continuity gesture time  {} ({:?})",
        s.gesture.continuity_gesture_time,
        s.gesture.continuity()
    );
    println!(
        "fastest gesture time     {} ({:?})",
        s.gesture.fastest_gesture_time,
        s.gesture.fastest()
    );
    println!(
        "slowest gesture time     {} ({:?})",
        s.gesture.slowest_gesture_time,
        s.gesture.slowest()
    );
    println!("opa                      {}", s.opa);
    println!("ir1 current              {}", s.ir1_current);
    println!("ir2 current              {}", s.ir2_current);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing::init_journald_or_stdout(log_level(cli.verbose));

    let config = load_config(&cli)?;
    let endpoint = config.serial.endpoint();
    let link = transport::open_link(&endpoint)
        .await
        .with_context(|| format!("opening {:?}", endpoint))?;
    let int_pin = transport::open_int_pin(config.int_pin.as_ref()).await?;
    let channel =
        FrameChannel::new(link).with_timing(config.serial.byte_timeout(), config.serial.settle());
    let mut sensor = Bm32s3021::with_int_pin(channel, int_pin);

    match cli.command {
        Command::Status => {
            let state = sensor.read_ir_state().await?;
            let level = sensor.int_level().await?;
            println!("status         {:?}", state.status);
            println!("calibrated     {}", state.status.is_calibrated());
            println!("gestures       {:?}", state.status.gestures());
            println!("gesture count  {}", state.gesture_count);
            println!("INT            {}", level);
        }
        Command::Version => {
            let version = sensor.read_firmware_version().await?;
            println!(
                "{:02X}.{:02X} (reported {}, word 0x{:04X})",
                version.high,
                version.low,
                version.as_sum(),
                version.as_word()
            );
        }
        Command::Get { register } => {
            let value = sensor.read_register(register).await?;
            println!("{} = {} (0x{:02X})", register, value, value);
        }
        Command::Set { register, value } => {
            sensor.write_register(register, value).await?;
            println!("{} <- {}", register, value);
        }
        Command::Dump { json } => {
            let snapshot = snapshot(&mut sensor).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Command::Apply => {
            let settings = config
                .gesture
                .context("no [gesture] section in the configuration")?;
            sensor.apply_settings(&settings).await?;
            println!("Gesture settings applied.");
        }
        Command::Learn => {
            println!("Learning distance, keep the target still...");
            sensor.distance_learning().await?;
            println!("Done.");
        }
        Command::Reset => {
            sensor.reset().await?;
            println!("Reset.");
        }
        Command::Unlock => {
            sensor.unlock_analog_settings().await?;
            println!("Analog settings unlocked.");
        }
    }

    Ok(())
}
