//! Scripted hardware for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{InputPin, SerialLink};
use crate::error::Result;

/// What the test can inspect after the driver is done with the link.
#[derive(Debug, Default)]
pub struct LinkLog {
    /// Every write, in order.
    pub writes: Vec<Vec<u8>>,
    /// Number of input discards.
    pub discards: usize,
}

/// Link that answers each write with the next scripted reply.
///
/// An empty script makes the device silent: reads never complete.
pub struct ScriptedLink {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    log: Arc<Mutex<LinkLog>>,
}

impl ScriptedLink {
    pub fn new<I>(replies: I) -> (Self, Arc<Mutex<LinkLog>>)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let log = Arc::new(Mutex::new(LinkLog::default()));
        let link = Self {
            rx: VecDeque::new(),
            replies: replies.into_iter().collect(),
            log: log.clone(),
        };
        (link, log)
    }

    /// Bytes sitting in the receive buffer before the first command.
    pub fn with_stale_input(mut self, bytes: &[u8]) -> Self {
        self.rx.extend(bytes);
        self
    }
}

#[async_trait]
impl SerialLink for ScriptedLink {
    async fn discard_input(&mut self) -> Result<()> {
        self.rx.clear();
        self.log.lock().unwrap().discards += 1;
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.log.lock().unwrap().writes.push(data.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8> {
        match self.rx.pop_front() {
            Some(byte) => Ok(byte),
            None => std::future::pending().await,
        }
    }
}

/// Input pin with a level the test controls.
#[derive(Clone, Default)]
pub struct MockPin {
    pub high: Arc<Mutex<bool>>,
}

#[async_trait]
impl InputPin for MockPin {
    async fn is_high(&mut self) -> Result<bool> {
        Ok(*self.high.lock().unwrap())
    }
}

/// Read response carrying `values`, checksum included.
pub fn read_reply(start: u8, values: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x55, 0x80, start, values.len() as u8];
    frame.extend_from_slice(values);
    frame.push(crate::protocol::checksum(&frame));
    frame
}

/// Acknowledgement with the given status byte.
pub fn ack_reply(status: u8) -> Vec<u8> {
    vec![0x55, status, 0x55u8.wrapping_add(status)]
}
