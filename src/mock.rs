//! Simulated dimmer for testing.
//!
//! [`MockDimmer`] answers the command protocol the way the hardware does and
//! records every transport call, which allows testing code built on
//! [`DimmerController`](crate::DimmerController) without a device attached.
//!
//! ```
//! use spikeaflat::mock::{MockBus, MockDimmer};
//! use spikeaflat::{DimmerController, DimmerOptions};
//!
//! let dimmer = MockDimmer::new();
//! let bus = MockBus::new(vec![dimmer.clone()]);
//!
//! let controller = DimmerController::discover(&bus, DimmerOptions::default())?;
//! controller.connect()?;
//! controller.set_brightness(512)?;
//! assert_eq!(controller.get_brightness()?, 512);
//! # Ok::<(), spikeaflat::DimmerError>(())
//! ```

use std::convert::TryFrom;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hidapi::{HidError, HidResult};
use parking_lot::Mutex;

use crate::protocol::{Opcode, FRAME_SIZE, STATE_COMMIT};
use crate::transport::{DeviceDiscovery, HidTransport};

/// Raw state of a fresh mock. Arbitrary, it only differs from the commit state.
pub const INITIAL_STATE: u8 = 1;

/// Transport call observed by the mock.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum MockEvent {
    Open,
    Close,
    Write(Vec<u8>),
    Read(usize),
}

impl MockEvent {
    /// Opcode of a written report.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Self::Write(report) => report.first().copied(),
            _ => None,
        }
    }
}

/// How the mock answers reads.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ReplyMode {
    /// Full length replies.
    Normal,
    /// Replies truncated to two bytes.
    Short,
    /// Nothing arrives before the timeout.
    Silent,
}

impl Default for ReplyMode {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Default, Debug)]
struct MockState {
    open: bool,
    intensity: u16,
    pending: u16,
    state: u8,
    reply: Option<[u8; FRAME_SIZE]>,
    reply_mode: ReplyMode,
    reply_delay: Duration,
    fail_writes: bool,
    fail_opcode: Option<u8>,
    fail_open: bool,
    events: Vec<MockEvent>,
}

/// Simulated Spike-a-Flat.
///
/// Clones share the same device, so a test can keep one handle for
/// inspection while the controller owns another.
#[derive(Clone, Debug)]
pub struct MockDimmer {
    state: Arc<Mutex<MockState>>,
}

impl MockDimmer {
    pub fn new() -> Self {
        let state = MockState { state: INITIAL_STATE, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// All transport calls so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Written reports, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Write(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Committed lamp intensity.
    pub fn intensity(&self) -> u16 {
        self.state.lock().intensity
    }

    pub fn set_intensity(&self, intensity: u16) {
        let mut state = self.state.lock();
        state.intensity = intensity;
        state.pending = intensity;
    }

    pub fn set_state(&self, raw: u8) {
        self.state.lock().state = raw;
    }

    pub fn set_reply_mode(&self, mode: ReplyMode) {
        self.state.lock().reply_mode = mode;
    }

    /// Delay every read by `delay`.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.state.lock().reply_delay = delay;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Fail only writes of reports starting with `opcode`.
    pub fn set_fail_opcode(&self, opcode: Option<u8>) {
        self.state.lock().fail_opcode = opcode;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn session_open(&self) -> bool {
        self.state.lock().open
    }
}

impl Default for MockDimmer {
    fn default() -> Self {
        Self::new()
    }
}

impl HidTransport for MockDimmer {
    fn open(&mut self) -> HidResult<()> {
        let mut state = self.state.lock();
        state.events.push(MockEvent::Open);

        if state.fail_open {
            return Err(mock_error("open failed"));
        }

        state.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.events.push(MockEvent::Close);
        state.open = false;
        state.reply = None;
    }

    fn is_open(&self) -> bool {
        self.session_open()
    }

    fn write(&mut self, report: &[u8]) -> HidResult<usize> {
        let mut state = self.state.lock();
        state.events.push(MockEvent::Write(report.to_vec()));

        let opcode_fails =
            state.fail_opcode.is_some() && state.fail_opcode == report.first().copied();
        if state.fail_writes || opcode_fails || !state.open {
            return Err(mock_error("write failed"));
        }

        let mut frame = [0; FRAME_SIZE];
        let len = report.len().min(FRAME_SIZE);
        frame[..len].copy_from_slice(&report[..len]);

        let mut reply = [0; FRAME_SIZE];
        reply[0] = frame[0];

        match Opcode::try_from(frame[0]) {
            Ok(Opcode::SetIntensity) => state.pending = u16::from_le_bytes([frame[1], frame[2]]),
            Ok(Opcode::SetState) => {
                if frame[1] == STATE_COMMIT {
                    state.intensity = state.pending;
                }
                state.state = frame[1];
            },
            Ok(Opcode::GetIntensity) => reply[1..3].copy_from_slice(&state.intensity.to_le_bytes()),
            Ok(Opcode::GetState) => reply[1] = state.state,
            Err(_) => (),
        }

        state.reply = Some(reply);

        Ok(report.len())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> HidResult<usize> {
        // Sleep outside the lock so inspection from tests doesn't block.
        let delay = self.state.lock().reply_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state.lock();
        let reply = state.reply.take();
        let mode = state.reply_mode;

        let len = match (mode, reply) {
            (ReplyMode::Silent, _) | (_, None) => {
                drop(state);
                thread::sleep(timeout);
                state = self.state.lock();
                0
            },
            (ReplyMode::Short, Some(reply)) => copy_reply(buf, &reply[..2]),
            (ReplyMode::Normal, Some(reply)) => copy_reply(buf, &reply),
        };

        state.events.push(MockEvent::Read(len));

        Ok(len)
    }
}

/// Simulated HID bus holding a fixed set of dimmers.
#[derive(Default, Clone, Debug)]
pub struct MockBus {
    devices: Vec<MockDimmer>,
}

impl MockBus {
    pub fn new(devices: Vec<MockDimmer>) -> Self {
        Self { devices }
    }
}

impl DeviceDiscovery for MockBus {
    type Device = MockDimmer;

    fn enumerate(&self, _vendor_id: u16, _product_id: u16) -> Vec<MockDimmer> {
        self.devices.clone()
    }
}

fn copy_reply(buf: &mut [u8], reply: &[u8]) -> usize {
    let len = reply.len().min(buf.len());
    buf[..len].copy_from_slice(&reply[..len]);
    len
}

fn mock_error(message: &str) -> HidError {
    HidError::HidApiError { message: message.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self, Brightness};

    #[test]
    fn intensity_pending_until_commit() {
        let mut dimmer = MockDimmer::new();
        dimmer.set_intensity(100);
        dimmer.open().unwrap();

        let report = protocol::set_intensity(Brightness::new(900).unwrap());
        dimmer.write(&report).unwrap();
        assert_eq!(dimmer.intensity(), 100);

        dimmer.write(&protocol::set_state(STATE_COMMIT)).unwrap();
        assert_eq!(dimmer.intensity(), 900);
    }

    #[test]
    fn closed_session_rejects_writes() {
        let mut dimmer = MockDimmer::new();
        assert!(dimmer.write(&protocol::query(Opcode::GetState)).is_err());
    }

    #[test]
    fn unanswered_read_times_out() {
        let mut dimmer = MockDimmer::new();
        dimmer.open().unwrap();

        let mut buf = [0; FRAME_SIZE];
        assert_eq!(dimmer.read_timeout(&mut buf, Duration::from_millis(1)).unwrap(), 0);
        assert_eq!(dimmer.events().last(), Some(&MockEvent::Read(0)));
    }
}
