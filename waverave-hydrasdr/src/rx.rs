use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::consts::DEFAULT_NUM_BUFFERS;
use crate::device::HydraSdr;
use crate::endpoint::{Endpoint, RxQueue};
use crate::packing::{unpack_into, words_into};
use crate::{Error, Kwargs};

/// Options for [`HydraSdr::start_rx`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamArgs {
    /// Number of bulk transfers to keep in flight.
    pub buffers: usize,
}

impl Default for StreamArgs {
    fn default() -> Self {
        Self {
            buffers: DEFAULT_NUM_BUFFERS,
        }
    }
}

impl StreamArgs {
    /// Build from string arguments. Recognizes `buffers`, which must be a
    /// positive integer.
    pub fn from_kwargs(args: &Kwargs) -> Result<Self, Error> {
        let mut out = Self::default();
        if let Some(v) = args.get("buffers") {
            out.buffers = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::InvalidParameter(
                        "buffers must be a positive integer",
                    ));
                }
            };
        }
        Ok(out)
    }
}

/// Where a [`Receive`] stream is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Stopped, either explicitly or by a stop request.
    Inactive,
    /// Delivering samples.
    Active,
    /// Failed to reconfigure the hardware and halted. Only
    /// [`stop`][Receive::stop] is useful from here.
    Faulted,
}

/// What a call to [`Receive::reconcile`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Nothing was pending.
    Idle,
    /// Buffered samples were thrown away, and the hardware sample rate was
    /// changed if `rate` is set.
    Flushed {
        /// Number of decoded samples discarded.
        discarded: usize,
        /// The sample rate now running on the hardware, if it changed.
        rate: Option<u32>,
    },
    /// A stop was requested, and the stream is now inactive.
    Stopped,
}

/// Size of each bulk transfer, in bytes: about 10 ms of samples, kept within
/// 8-256 KiB and rounded up to whole USB packets (and whole packed groups).
pub(crate) fn transfer_len(rate: u32, packed: bool) -> usize {
    const MIN_LEN: usize = 8 * 1024;
    const MAX_LEN: usize = 256 * 1024;
    let samples = (rate as usize / 100).max(1);
    let (bytes, align) = if packed {
        (samples * 3 / 2, 1536)
    } else {
        (samples * 2, 512)
    };
    bytes.clamp(MIN_LEN, MAX_LEN).next_multiple_of(align)
}

/// Decoded samples waiting to be read, in arrival order.
#[derive(Default)]
struct Staging {
    chunks: VecDeque<Vec<u16>>,
    offset: usize,
    len: usize,
    spare: Vec<Vec<u16>>,
}

impl Staging {
    const MAX_SPARE: usize = 16;

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn take_spare(&mut self) -> Vec<u16> {
        let mut chunk = self.spare.pop().unwrap_or_default();
        chunk.clear();
        chunk
    }

    fn retire(&mut self, chunk: Vec<u16>) {
        if self.spare.len() < Self::MAX_SPARE {
            self.spare.push(chunk);
        }
    }

    fn push(&mut self, chunk: Vec<u16>) {
        if chunk.is_empty() {
            self.retire(chunk);
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn drain_into(&mut self, out: &mut [u16]) -> usize {
        let mut n = 0;
        while n < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let avail = &front[self.offset..];
            let take = avail.len().min(out.len() - n);
            out[n..n + take].copy_from_slice(&avail[..take]);
            let exhausted = take == avail.len();
            n += take;
            self.offset += take;
            if exhausted {
                self.offset = 0;
                if let Some(chunk) = self.chunks.pop_front() {
                    self.retire(chunk);
                }
            }
        }
        self.len -= n;
        n
    }

    fn clear(&mut self) -> usize {
        let n = self.len;
        while let Some(chunk) = self.chunks.pop_front() {
            self.retire(chunk);
        }
        self.offset = 0;
        self.len = 0;
        n
    }
}

/// A HydraSDR streaming samples.
///
/// Start one with [`HydraSdr::start_rx`], then call [`read`][Receive::read]
/// repeatedly. Samples come out as 16-bit words, whether or not bit packing
/// is on. Only one stream can run per device.
///
/// The device stays usable from other tasks while streaming. Before handing
/// out any samples, each read checks what changed since the last one:
///
/// - After a retune, a sample rate change, or a bit packing change, all
///   buffered samples and in-flight transfers are thrown away, so nothing
///   captured under the old settings is ever delivered.
/// - A new sample rate is applied to the hardware here, with the receiver
///   briefly switched off. If that fails, the stream halts and every later
///   read returns [`Error::StreamFault`].
/// - After [`HydraSdr::request_stop`], the read returns 0 and the stream ends.
///
/// [`reconcile`][Receive::reconcile] runs the same checks without reading.
///
/// When finished, call [`stop`][Receive::stop] to cancel all remaining
/// transfers and switch the receiver off.
///
/// Putting it all together, here's a program that retunes while capturing,
/// and counts how many samples it got:
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use anyhow::Result;
/// use waverave_hydrasdr::StreamArgs;
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let sdr = Arc::new(waverave_hydrasdr::open_hydrasdr()?);
///     sdr.set_sample_rate(2.5e6);
///     sdr.set_frequency(100e6).await?;
///
///     let mut rx = sdr.clone().start_rx(StreamArgs::default()).await?;
///
///     // Hop around from another task, then ask the stream to end.
///     let tuner = sdr.clone();
///     tokio::spawn(async move {
///         for mhz in [101.0, 102.0, 103.0] {
///             tokio::time::sleep(Duration::from_millis(500)).await;
///             if tuner.set_frequency(mhz * 1e6).await.is_err() {
///                 break;
///             }
///         }
///         tuner.request_stop();
///     });
///
///     let mut buf = vec![0u16; 16384];
///     let mut count = 0;
///     loop {
///         let n = rx.read(&mut buf).await?;
///         if n == 0 {
///             break;
///         }
///         count += n;
///     }
///     rx.stop().await?;
///     println!("Got {count} samples");
///     Ok(())
/// }
/// ```
pub struct Receive<E: Endpoint> {
    dev: Arc<HydraSdr<E>>,
    queue: E::Rx,
    staging: Staging,
    transfer_len: usize,
    packed: bool,
    state: StreamState,
}

impl<E: Endpoint> Receive<E> {
    /// Start streaming from a device.
    ///
    /// The recorded sample rate is always written to the hardware first, then
    /// the receiver is switched on and `args.buffers` transfers are queued.
    pub async fn new(dev: Arc<HydraSdr<E>>, args: StreamArgs) -> Result<Self, Error> {
        if !dev.params.try_activate() {
            return Err(Error::StreamActive(dev.serial));
        }
        dev.params.set_num_buffers(args.buffers);
        let queue = dev.endpoint.rx_queue();
        let mut rx = Self {
            dev,
            queue,
            staging: Staging::default(),
            transfer_len: 0,
            packed: false,
            state: StreamState::Active,
        };
        if let Err(e) = rx.start().await {
            rx.halt().await;
            rx.state = StreamState::Inactive;
            return Err(e);
        }
        Ok(rx)
    }

    async fn start(&mut self) -> Result<(), Error> {
        let dev = Arc::clone(&self.dev);
        dev.params.take_reset();
        dev.params.take_rate_change();
        dev.params.set_buffered_elems(0);
        let rate = dev.params.sample_rate();
        if let Err(e) = apply_rate(&dev, rate).await {
            dev.params.restore_rate_change();
            return Err(e);
        }
        self.packed = dev.params.bit_pack();
        self.transfer_len = transfer_len(rate, self.packed);
        dev.endpoint
            .set_receiver_mode(true)
            .await
            .map_err(Error::setting("receiver mode", dev.serial))?;
        self.top_up();
        debug!(
            "Streaming from HydraSDR {:x}: {} Hz, {} transfers of {} bytes",
            dev.serial,
            rate,
            dev.params.num_buffers(),
            self.transfer_len
        );
        Ok(())
    }

    /// Current state of the stream.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Size of each bulk transfer, in bytes.
    pub fn transfer_len(&self) -> usize {
        self.transfer_len
    }

    /// Number of transfers in flight.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// The device being streamed from.
    pub fn device(&self) -> &Arc<HydraSdr<E>> {
        &self.dev
    }

    /// Act on any pending stop request, retune, or rate change.
    ///
    /// [`read`][Self::read] does this before every delivery; calling it
    /// directly is only useful to apply changes without reading. Calling it
    /// again with nothing new pending does nothing.
    pub async fn reconcile(&mut self) -> Result<Reconciled, Error> {
        match self.state {
            StreamState::Active => (),
            StreamState::Inactive => return Ok(Reconciled::Stopped),
            StreamState::Faulted => return Err(Error::StreamFault),
        }
        let dev = Arc::clone(&self.dev);
        if dev.params.stop_requested() {
            debug!("Stop requested on HydraSDR {:x}", dev.serial);
            self.halt().await;
            self.state = StreamState::Inactive;
            return Ok(Reconciled::Stopped);
        }

        let reset = dev.params.take_reset();
        let rate_change = dev.params.take_rate_change();
        if !reset && !rate_change {
            return Ok(Reconciled::Idle);
        }

        let discarded = self.discard().await;
        let mut rate = None;
        if rate_change {
            let new_rate = dev.params.sample_rate();
            if let Err(e) = change_rate(&dev, new_rate).await {
                warn!(
                    "Failed changing HydraSDR {:x} to {} Hz, halting stream: {}",
                    dev.serial, new_rate, e
                );
                dev.params.restore_rate_change();
                self.halt().await;
                self.state = StreamState::Faulted;
                return Err(e);
            }
            rate = Some(new_rate);
        }
        self.packed = dev.params.bit_pack();
        self.transfer_len = transfer_len(dev.params.sample_rate(), self.packed);
        Ok(Reconciled::Flushed { discarded, rate })
    }

    /// Read samples into `out`, waiting for at least one.
    ///
    /// Returns the number of samples written, or 0 once the stream has been
    /// asked to stop. A transfer error is returned as-is and the stream keeps
    /// running, so reading again is fine.
    ///
    /// An empty `out` returns 0 immediately, without checking for changes, so
    /// it says nothing about whether the stream is still running.
    pub async fn read(&mut self, out: &mut [u16]) -> Result<usize, Error> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.reconcile().await? == Reconciled::Stopped {
                return Ok(0);
            }
            if !self.staging.is_empty() {
                break;
            }
            self.fill().await?;
        }
        let n = self.staging.drain_into(out);
        self.dev.params.set_buffered_elems(self.staging.len());
        Ok(n)
    }

    /// Halt streaming and switch the receiver off.
    ///
    /// This cancels all transfers and completes whatever is left. Transfer
    /// errors are ignored.
    pub async fn stop(mut self) -> Result<(), Error> {
        if self.state != StreamState::Active {
            return Ok(());
        }
        self.state = StreamState::Inactive;
        self.staging.clear();
        self.dev.params.set_buffered_elems(0);
        self.drain().await;
        let result = self
            .dev
            .endpoint
            .set_receiver_mode(false)
            .await
            .map_err(Error::setting("receiver mode", self.dev.serial));
        self.dev.params.deactivate();
        result
    }

    fn top_up(&mut self) {
        let depth = self.dev.params.num_buffers();
        while self.queue.pending() < depth {
            self.queue.submit(self.transfer_len);
        }
    }

    async fn fill(&mut self) -> Result<(), Error> {
        self.top_up();
        let buf = self.queue.next_complete().await?;
        let mut chunk = self.staging.take_spare();
        // Decode the way the queued transfers were framed, not the live mode.
        if self.packed {
            unpack_into(&buf, &mut chunk);
        } else {
            words_into(&buf, &mut chunk);
        }
        self.queue.recycle(buf);
        self.staging.push(chunk);
        self.dev.params.set_buffered_elems(self.staging.len());
        Ok(())
    }

    /// Cancel every transfer in flight and wait for them all to come back.
    async fn drain(&mut self) -> usize {
        let in_flight = self.queue.pending();
        self.queue.cancel_all();
        while self.queue.pending() > 0 {
            if let Ok(buf) = self.queue.next_complete().await {
                self.queue.recycle(buf);
            }
        }
        in_flight
    }

    async fn discard(&mut self) -> usize {
        let staged = self.staging.clear();
        self.dev.params.set_buffered_elems(0);
        let in_flight = self.drain().await;
        debug!(
            "Discarded {} buffered samples and {} transfers",
            staged, in_flight
        );
        staged
    }

    /// Tear down after a fault or stop request. Errors switching the receiver
    /// off are logged, not returned.
    async fn halt(&mut self) {
        self.staging.clear();
        self.dev.params.set_buffered_elems(0);
        self.drain().await;
        if let Err(e) = self.dev.endpoint.set_receiver_mode(false).await {
            warn!(
                "Failed switching off HydraSDR {:x} receiver: {}",
                self.dev.serial, e
            );
        }
        self.dev.params.deactivate();
    }
}

/// Select `rate` on the hardware by its index in the enumerated rate list.
async fn apply_rate<E: Endpoint>(dev: &HydraSdr<E>, rate: u32) -> Result<(), Error> {
    let serial = dev.serial;
    let rates = dev
        .endpoint
        .sample_rates()
        .await
        .map_err(Error::setting("sample rate", serial))?;
    let index = rates
        .iter()
        .position(|&r| r == rate)
        .ok_or(Error::SampleRate { rate, serial })?;
    dev.endpoint
        .set_sample_rate(index as u32)
        .await
        .map_err(Error::setting("sample rate", serial))
}

/// Change rate on a running receiver. It has to be switched off around the
/// rate select.
async fn change_rate<E: Endpoint>(dev: &HydraSdr<E>, rate: u32) -> Result<(), Error> {
    let serial = dev.serial;
    dev.endpoint
        .set_receiver_mode(false)
        .await
        .map_err(Error::setting("receiver mode", serial))?;
    apply_rate(dev, rate).await?;
    dev.endpoint
        .set_receiver_mode(true)
        .await
        .map_err(Error::setting("receiver mode", serial))?;
    debug!("HydraSDR {:x} now at {} Hz", serial, rate);
    Ok(())
}

impl<E: Endpoint> Drop for Receive<E> {
    fn drop(&mut self) {
        if self.state == StreamState::Active {
            warn!(
                "HydraSDR {:x} stream dropped without stop; receiver left on",
                self.dev.serial
            );
            self.queue.cancel_all();
            self.dev.params.set_buffered_elems(0);
            self.dev.params.deactivate();
        }
    }
}
