//! The hardware seam underneath [`HydraSdr`][crate::HydraSdr].
//!
//! Everything the configuration controller and the streaming side need from
//! the physical receiver goes through these traits. The USB implementation
//! lives in [`usb`][crate::usb]; anything else implementing them (a network
//! bridge, a simulator) can be handed to
//! [`HydraSdr::new`][crate::HydraSdr::new] in its place.
//!
//! Each call completes when the hardware transaction does. None of them are
//! retried.

use std::future::Future;

use crate::Error;

/// A gain stage in the receive chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GainStage {
    /// Low-noise amplifier at the RF input.
    Lna,
    /// Mixer gain.
    Mixer,
    /// Variable-gain amplifier at IF.
    Vga,
}

impl GainStage {
    /// All gain stages, in the order they're listed to callers.
    pub const ALL: [GainStage; 3] = [GainStage::Lna, GainStage::Mixer, GainStage::Vga];

    /// The element name used by the generic radio API.
    pub fn name(self) -> &'static str {
        match self {
            Self::Lna => "LNA",
            Self::Mixer => "MIX",
            Self::Vga => "VGA",
        }
    }

    /// Look up a stage by its element name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for GainStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Control operations on one opened receiver.
///
/// The handle is released when the implementor is dropped.
pub trait Endpoint: Send + Sync + 'static {
    /// Queue type used for bulk sample transfers.
    type Rx: RxQueue;

    /// Serial number of the unit behind this endpoint.
    fn serial(&self) -> u64;

    /// Tune the RF front end.
    fn set_freq(&self, freq_hz: u32) -> impl Future<Output = Result<(), Error>> + Send;

    /// List the sample rates the hardware supports, in enumeration order.
    fn sample_rates(&self) -> impl Future<Output = Result<Vec<u32>, Error>> + Send;

    /// Select a sample rate by its index in [`sample_rates`][Self::sample_rates].
    fn set_sample_rate(&self, index: u32) -> impl Future<Output = Result<(), Error>> + Send;

    /// Set one gain stage, 0-15.
    fn set_gain(&self, stage: GainStage, value: u8)
    -> impl Future<Output = Result<(), Error>> + Send;

    /// Turn automatic gain control on or off for one stage. Only the LNA and
    /// mixer stages have AGC.
    fn set_agc(&self, stage: GainStage, enable: bool)
    -> impl Future<Output = Result<(), Error>> + Send;

    /// Switch the antenna bias-tee power.
    fn set_rf_bias(&self, enable: bool) -> impl Future<Output = Result<(), Error>> + Send;

    /// Switch 12-bit sample packing on the bulk endpoint.
    fn set_packing(&self, enable: bool) -> impl Future<Output = Result<(), Error>> + Send;

    /// Start or stop the hardware producing samples.
    fn set_receiver_mode(&self, on: bool) -> impl Future<Output = Result<(), Error>> + Send;

    /// Create a fresh queue for bulk sample transfers.
    fn rx_queue(&self) -> Self::Rx;
}

/// A queue of bulk IN transfers.
///
/// Transfers complete in the order they were submitted.
pub trait RxQueue: Send + 'static {
    /// Queue up a transfer of `len` bytes.
    fn submit(&mut self, len: usize);

    /// Wait for the oldest pending transfer. Must not be called when
    /// [`pending`][Self::pending] is zero.
    fn next_complete(&mut self) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// Hand a completed buffer back for reuse by later submissions.
    fn recycle(&mut self, buf: Vec<u8>);

    /// Number of transfers submitted but not yet completed.
    fn pending(&self) -> usize;

    /// Cancel every pending transfer. They still have to be completed with
    /// [`next_complete`][Self::next_complete], which will return an error for
    /// each cancelled one.
    fn cancel_all(&mut self);
}

/// Enumerates and opens receivers.
pub trait Backend: Send + Sync {
    /// Endpoint type produced by [`open`][Self::open].
    type Endpoint: Endpoint;

    /// Serial numbers of every attached receiver.
    fn list_serials(&self) -> Result<Vec<u64>, Error>;

    /// Open the receiver with the given serial, or the first one found when
    /// `serial` is `None`.
    fn open(&self, serial: Option<u64>) -> Result<Self::Endpoint, Error>;
}
