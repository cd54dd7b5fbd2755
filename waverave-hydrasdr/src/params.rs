use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use crate::consts::{DEFAULT_NUM_BUFFERS, DEFAULT_SAMPLE_RATE};
use crate::endpoint::GainStage;

/// In-memory mirror of every control, plus the flags shared with the stream.
///
/// Scalars are written only by the configuration side, so they use relaxed
/// ordering. The flags are the hand-off to the streaming task: writers
/// publish with `Release`, and the stream consumes with `Acquire`. The sample
/// rate is always stored before `rate_changed` is raised, so a stream that
/// sees the flag also sees the new rate.
pub(crate) struct Params {
    center_freq: AtomicU32,
    sample_rate: AtomicU32,
    gains: [AtomicU8; 3],
    agc: AtomicBool,
    rf_bias: AtomicBool,
    bit_pack: AtomicBool,
    num_buffers: AtomicUsize,

    reset_buffer: AtomicBool,
    rate_changed: AtomicBool,
    stream_active: AtomicBool,
    stop_requested: AtomicBool,
    buffered_elems: AtomicUsize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            center_freq: AtomicU32::new(0),
            sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
            gains: [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)],
            agc: AtomicBool::new(false),
            rf_bias: AtomicBool::new(false),
            bit_pack: AtomicBool::new(false),
            num_buffers: AtomicUsize::new(DEFAULT_NUM_BUFFERS),
            reset_buffer: AtomicBool::new(false),
            rate_changed: AtomicBool::new(false),
            stream_active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            buffered_elems: AtomicUsize::new(0),
        }
    }
}

impl Params {
    pub fn center_freq(&self) -> u32 {
        self.center_freq.load(Ordering::Relaxed)
    }

    pub fn set_center_freq(&self, hz: u32) {
        self.center_freq.store(hz, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Stage a new sample rate. Returns false, touching nothing, if it's the
    /// rate already stored.
    pub fn stage_sample_rate(&self, rate: u32) -> bool {
        if self.sample_rate.swap(rate, Ordering::Relaxed) == rate {
            return false;
        }
        // Rate flag first: anyone taking the reset also sees the rate change.
        self.rate_changed.store(true, Ordering::Release);
        self.reset_buffer.store(true, Ordering::Release);
        true
    }

    pub fn gain(&self, stage: GainStage) -> u8 {
        self.gains[stage.index()].load(Ordering::Relaxed)
    }

    pub fn set_gain(&self, stage: GainStage, value: u8) {
        self.gains[stage.index()].store(value, Ordering::Relaxed);
    }

    pub fn agc(&self) -> bool {
        self.agc.load(Ordering::Relaxed)
    }

    pub fn set_agc(&self, enable: bool) {
        self.agc.store(enable, Ordering::Relaxed);
    }

    pub fn rf_bias(&self) -> bool {
        self.rf_bias.load(Ordering::Relaxed)
    }

    pub fn set_rf_bias(&self, enable: bool) {
        self.rf_bias.store(enable, Ordering::Relaxed);
    }

    pub fn bit_pack(&self) -> bool {
        self.bit_pack.load(Ordering::Relaxed)
    }

    /// Returns the previous packing mode.
    pub fn set_bit_pack(&self, enable: bool) -> bool {
        self.bit_pack.swap(enable, Ordering::Relaxed)
    }

    pub fn num_buffers(&self) -> usize {
        self.num_buffers.load(Ordering::Relaxed)
    }

    pub fn set_num_buffers(&self, n: usize) {
        self.num_buffers.store(n.max(1), Ordering::Relaxed);
    }

    pub fn mark_reset(&self) {
        self.reset_buffer.store(true, Ordering::Release);
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_buffer.load(Ordering::Acquire)
    }

    pub fn take_reset(&self) -> bool {
        self.reset_buffer.swap(false, Ordering::AcqRel)
    }

    pub fn rate_change_pending(&self) -> bool {
        self.rate_changed.load(Ordering::Acquire)
    }

    pub fn take_rate_change(&self) -> bool {
        self.rate_changed.swap(false, Ordering::AcqRel)
    }

    /// Put a rate change back after failing to apply it, so the next stream
    /// start tries again.
    pub fn restore_rate_change(&self) {
        self.rate_changed.store(true, Ordering::Release);
    }

    pub fn stream_active(&self) -> bool {
        self.stream_active.load(Ordering::Acquire)
    }

    /// Claim the stream slot. Fails if a stream is already running.
    pub fn try_activate(&self) -> bool {
        self.stream_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn deactivate(&self) {
        self.stop_requested.store(false, Ordering::Release);
        self.stream_active.store(false, Ordering::Release);
    }

    pub fn request_stop(&self) {
        if self.stream_active() {
            self.stop_requested.store(true, Ordering::Release);
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn buffered_elems(&self) -> usize {
        self.buffered_elems.load(Ordering::Acquire)
    }

    pub fn set_buffered_elems(&self, n: usize) {
        self.buffered_elems.store(n, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = Params::default();
        assert_eq!(p.sample_rate(), 3_000_000);
        assert_eq!(p.center_freq(), 0);
        for stage in GainStage::ALL {
            assert_eq!(p.gain(stage), 0);
        }
        assert_eq!(p.num_buffers(), DEFAULT_NUM_BUFFERS);
        assert!(!p.reset_pending());
        assert!(!p.rate_change_pending());
        assert!(!p.stream_active());
        assert_eq!(p.buffered_elems(), 0);
    }

    #[test]
    fn staging_same_rate_leaves_flags_alone() {
        let p = Params::default();
        assert!(!p.stage_sample_rate(3_000_000));
        assert!(!p.reset_pending());
        assert!(!p.rate_change_pending());

        assert!(p.stage_sample_rate(6_000_000));
        assert!(p.reset_pending());
        assert!(p.rate_change_pending());
        assert!(p.take_rate_change());
        assert!(!p.take_rate_change());
    }

    #[test]
    fn single_stream_slot() {
        let p = Params::default();
        assert!(p.try_activate());
        assert!(!p.try_activate());
        p.request_stop();
        assert!(p.stop_requested());
        p.deactivate();
        assert!(!p.stop_requested());
        assert!(p.try_activate());
    }

    #[test]
    fn stop_request_ignored_when_idle() {
        let p = Params::default();
        p.request_stop();
        assert!(!p.stop_requested());
    }

    #[test]
    fn num_buffers_never_zero() {
        let p = Params::default();
        p.set_num_buffers(0);
        assert_eq!(p.num_buffers(), 1);
    }
}
