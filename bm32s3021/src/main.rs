use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use bm32s3021::config::Config;
use bm32s3021::monitor;
use bm32s3021::protocol::FrameChannel;
use bm32s3021::tracing::{self, prelude::*};
use bm32s3021::{transport, Bm32s3021};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    tracing::init_journald_or_stdout(tracing::parse_level(&config.daemon.log_level));

    let endpoint = config.serial.endpoint();
    let link = transport::open_link(&endpoint)
        .await
        .with_context(|| format!("opening {:?}", endpoint))?;
    let int_pin = transport::open_int_pin(config.int_pin.as_ref()).await?;
    let channel =
        FrameChannel::new(link).with_timing(config.serial.byte_timeout(), config.serial.settle());
    let mut sensor = Bm32s3021::with_int_pin(channel, int_pin);

    match sensor.read_firmware_version().await {
        Ok(version) => info!(
            "Sensor firmware {:02X}.{:02X} on {:?}",
            version.high, version.low, endpoint
        ),
        Err(e) => warn!("Sensor not answering on {:?}: {}", endpoint, e),
    }

    if let Some(settings) = &config.gesture {
        sensor
            .apply_settings(settings)
            .await
            .context("applying gesture settings")?;
        info!("Gesture settings applied.");
    }
    if let Err(e) = sensor.dump_configuration().await {
        debug!("Configuration dump failed: {}", e);
    }

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(monitor::task(
        sensor,
        config.daemon.poll_interval(),
        running.clone(),
    ));
    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    info!("Exiting.");
    Ok(())
}
