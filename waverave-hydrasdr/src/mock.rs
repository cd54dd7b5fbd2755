//! Stand-in hardware for unit tests.
//!
//! Every call into the mock endpoint is logged, and any operation can be made
//! to fail. The [`Probe`] stays with the test to inspect the log after the
//! endpoint has been moved into a device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use nusb::transfer::TransferError;

use crate::Error;
use crate::endpoint::{Backend, Endpoint, GainStage, RxQueue};

pub(crate) const MOCK_SERIAL: u64 = 0x1234_5678_9abc_def0;
pub(crate) const MOCK_RATES: [u32; 5] = [10_000_000, 6_000_000, 3_000_000, 2_500_000, 2_000_000];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    SetFreq(u32),
    SampleRates,
    SetSampleRate(u32),
    SetGain(GainStage, u8),
    SetAgc(GainStage, bool),
    SetRfBias(bool),
    SetPacking(bool),
    ReceiverMode(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    List,
    SetFreq,
    SampleRates,
    SetSampleRate,
    SetGain,
    SetAgc(GainStage),
    SetRfBias,
    SetPacking,
    ReceiverMode,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failing: Vec<Op>,
    closed: usize,
    submitted: usize,
    cancelled: usize,
}

#[derive(Clone, Default)]
pub(crate) struct Probe(Arc<Mutex<State>>);

impl Probe {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.0
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().calls.clear();
    }

    pub fn fail(&self, op: Op) {
        self.0.lock().unwrap().failing.push(op);
    }

    pub fn heal(&self) {
        self.0.lock().unwrap().failing.clear();
    }

    pub fn closed(&self) -> usize {
        self.0.lock().unwrap().closed
    }

    pub fn submitted(&self) -> usize {
        self.0.lock().unwrap().submitted
    }

    pub fn cancelled(&self) -> usize {
        self.0.lock().unwrap().cancelled
    }

    fn failing(&self, op: Op) -> bool {
        self.0.lock().unwrap().failing.contains(&op)
    }

    fn record(&self, call: Call, op: Op) -> Result<(), Error> {
        let mut state = self.0.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(&op) {
            Err(Error::Io(std::io::Error::other("injected failure")))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct MockEndpoint {
    serial: u64,
    probe: Probe,
}

impl MockEndpoint {
    pub fn new() -> (Self, Probe) {
        Self::with_serial(MOCK_SERIAL)
    }

    pub fn with_serial(serial: u64) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                serial,
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.probe.0.lock().unwrap().closed += 1;
    }
}

impl Endpoint for MockEndpoint {
    type Rx = MockRx;

    fn serial(&self) -> u64 {
        self.serial
    }

    async fn set_freq(&self, freq_hz: u32) -> Result<(), Error> {
        self.probe.record(Call::SetFreq(freq_hz), Op::SetFreq)
    }

    async fn sample_rates(&self) -> Result<Vec<u32>, Error> {
        self.probe.record(Call::SampleRates, Op::SampleRates)?;
        Ok(MOCK_RATES.to_vec())
    }

    async fn set_sample_rate(&self, index: u32) -> Result<(), Error> {
        let rate = MOCK_RATES
            .get(index as usize)
            .copied()
            .ok_or(Error::InvalidParameter("Sample rate index is out of range"))?;
        self.probe.record(Call::SetSampleRate(rate), Op::SetSampleRate)
    }

    async fn set_gain(&self, stage: GainStage, value: u8) -> Result<(), Error> {
        self.probe.record(Call::SetGain(stage, value), Op::SetGain)
    }

    async fn set_agc(&self, stage: GainStage, enable: bool) -> Result<(), Error> {
        if stage == GainStage::Vga {
            return Err(Error::InvalidParameter("VGA stage has no AGC"));
        }
        self.probe.record(Call::SetAgc(stage, enable), Op::SetAgc(stage))
    }

    async fn set_rf_bias(&self, enable: bool) -> Result<(), Error> {
        self.probe.record(Call::SetRfBias(enable), Op::SetRfBias)
    }

    async fn set_packing(&self, enable: bool) -> Result<(), Error> {
        self.probe.record(Call::SetPacking(enable), Op::SetPacking)
    }

    async fn set_receiver_mode(&self, on: bool) -> Result<(), Error> {
        self.probe.record(Call::ReceiverMode(on), Op::ReceiverMode)
    }

    fn rx_queue(&self) -> MockRx {
        MockRx {
            probe: self.probe.clone(),
            pending: VecDeque::new(),
            next_word: 0,
        }
    }
}

struct Pending {
    len: usize,
    cancelled: bool,
}

/// Completes every transfer with little-endian 16-bit words counting up from
/// zero, continuing across transfers.
pub(crate) struct MockRx {
    probe: Probe,
    pending: VecDeque<Pending>,
    next_word: u16,
}

impl RxQueue for MockRx {
    fn submit(&mut self, len: usize) {
        self.probe.0.lock().unwrap().submitted += 1;
        self.pending.push_back(Pending {
            len,
            cancelled: false,
        });
    }

    async fn next_complete(&mut self) -> Result<Vec<u8>, Error> {
        let p = self.pending.pop_front().ok_or(Error::ReturnData)?;
        if p.cancelled {
            return Err(Error::Transfer(TransferError::Cancelled));
        }
        let mut buf = Vec::with_capacity(p.len);
        for _ in 0..p.len / 2 {
            buf.extend_from_slice(&self.next_word.to_le_bytes());
            self.next_word = self.next_word.wrapping_add(1);
        }
        buf.resize(p.len, 0);
        Ok(buf)
    }

    fn recycle(&mut self, _buf: Vec<u8>) {}

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn cancel_all(&mut self) {
        let mut n = 0;
        for p in self.pending.iter_mut().filter(|p| !p.cancelled) {
            p.cancelled = true;
            n += 1;
        }
        self.probe.0.lock().unwrap().cancelled += n;
    }
}

pub(crate) struct MockBackend {
    serials: Vec<u64>,
    busy: Vec<u64>,
    probe: Probe,
}

impl MockBackend {
    pub fn new(serials: &[u64]) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                serials: serials.to_vec(),
                busy: Vec::new(),
                probe: probe.clone(),
            },
            probe,
        )
    }

    pub fn with_busy(mut self, serial: u64) -> Self {
        self.busy.push(serial);
        self
    }
}

impl Backend for MockBackend {
    type Endpoint = MockEndpoint;

    fn list_serials(&self) -> Result<Vec<u64>, Error> {
        if self.probe.failing(Op::List) {
            return Err(Error::Io(std::io::Error::other("injected failure")));
        }
        Ok(self.serials.clone())
    }

    fn open(&self, serial: Option<u64>) -> Result<MockEndpoint, Error> {
        let serial = match serial {
            Some(s) if self.serials.contains(&s) => s,
            Some(s) => return Err(Error::NotFound(s)),
            None => *self.serials.first().ok_or(Error::NoDevice)?,
        };
        if self.busy.contains(&serial) {
            return Err(Error::Busy(serial));
        }
        Ok(MockEndpoint {
            serial,
            probe: self.probe.clone(),
        })
    }
}
