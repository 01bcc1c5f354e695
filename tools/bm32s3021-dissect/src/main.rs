//! Decode captured BM32S3021-1 UART traffic.

mod capture;
mod dissect;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dissect::{ChecksumStatus, Dissector, FrameContent};

#[derive(Debug, Parser)]
#[command(name = "bm32s3021-dissect", version, about)]
struct Args {
    /// Capture file (CSV: timestamp,direction,bytes)
    capture: PathBuf,

    /// Join same-direction records closer than this many milliseconds
    #[arg(long, default_value_t = 5.0)]
    gap_ms: f64,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Only print frames that failed to decode or verify
    #[arg(long)]
    errors_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let text = std::fs::read_to_string(&args.capture)
        .with_context(|| format!("reading {}", args.capture.display()))?;
    let records = capture::parse_capture(&text)?;
    let frames = capture::group_frames(records, args.gap_ms / 1000.0);

    let mut dissector = Dissector::new();
    let mut failures = 0;
    for frame in &frames {
        let dissected = dissector.dissect(frame);
        let failed = dissected.checksum == ChecksumStatus::Invalid
            || matches!(dissected.content, FrameContent::Invalid(_));
        if failed {
            failures += 1;
        }
        if failed || !args.errors_only {
            println!("{}", dissected);
        }
    }

    println!();
    println!("{} frames, {} with errors", frames.len(), failures);
    Ok(())
}
