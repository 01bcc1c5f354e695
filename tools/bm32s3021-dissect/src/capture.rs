//! Capture file reader.
//!
//! Captures are CSV text, one record per line:
//!
//! ```text
//! # timestamp (s), direction, bytes
//! 0.000000,tx,55 80 06 01 DC
//! 0.006250,rx,55 80 06 01 10 EC
//! ```
//!
//! `tx` is host to sensor, `rx` sensor to host. Blank lines, `#` comments
//! and a leading `timestamp,...` header are skipped. Logic analyzers often
//! export one byte per record; [`group_frames`] joins those back up.

use anyhow::{bail, Context, Result};
use std::fmt;

/// Direction of a capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToSensor,
    SensorToHost,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::HostToSensor => write!(f, "TX"),
            Direction::SensorToHost => write!(f, "RX"),
        }
    }
}

/// Bytes seen on the line in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialFrame {
    pub start_time: f64,
    pub end_time: f64,
    pub direction: Direction,
    pub data: Vec<u8>,
}

/// Parse a whole capture.
pub fn parse_capture(text: &str) -> Result<Vec<SerialFrame>> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if index == 0 && line.to_ascii_lowercase().starts_with("timestamp") {
            continue;
        }
        let frame = parse_record(line).with_context(|| format!("line {}", index + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

fn parse_record(line: &str) -> Result<SerialFrame> {
    let mut fields = line.splitn(3, ',').map(str::trim);
    let (Some(time), Some(direction), Some(bytes)) = (fields.next(), fields.next(), fields.next())
    else {
        bail!("expected timestamp,direction,bytes");
    };

    let time: f64 = time
        .parse()
        .with_context(|| format!("bad timestamp {:?}", time))?;
    let direction = match direction.to_ascii_lowercase().as_str() {
        "tx" => Direction::HostToSensor,
        "rx" => Direction::SensorToHost,
        other => bail!("bad direction {:?}", other),
    };
    let digits: String = bytes
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace("0x", "");
    let data = hex::decode(&digits).with_context(|| format!("bad bytes {:?}", bytes))?;
    if data.is_empty() {
        bail!("record carries no bytes");
    }

    Ok(SerialFrame {
        start_time: time,
        end_time: time,
        direction,
        data,
    })
}

/// Join consecutive records in the same direction that are at most `gap`
/// seconds apart.
pub fn group_frames(records: Vec<SerialFrame>, gap: f64) -> Vec<SerialFrame> {
    let mut frames: Vec<SerialFrame> = Vec::new();
    for record in records {
        match frames.last_mut() {
            Some(last)
                if last.direction == record.direction
                    && record.start_time - last.end_time <= gap =>
            {
                last.data.extend_from_slice(&record.data);
                last.end_time = record.end_time;
            }
            _ => frames.push(record),
        }
    }
    frames
}
