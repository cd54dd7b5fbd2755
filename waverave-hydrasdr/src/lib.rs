/*!

This is a strongly-asynchronous host crate for the [HydraSDR][hydrasdr]
receiver, made using the pure-rust [`nusb`] crate for USB interfacing.

[hydrasdr]: https://hydrasdr.com/

The standard entry point for this library is [`open_hydrasdr()`], which will
open the first available HydraSDR device. Generic radio front ends can go
through the [`registry`] instead, which discovers devices and opens them from
string arguments.

A [`HydraSdr`] keeps every setting mirrored in memory and can be shared
between tasks with an [`Arc`][std::sync::Arc]: one task streams samples with
[`Receive`] while others retune, change gains, or change the sample rate. The
stream notices those changes before handing out any more samples, throwing
away everything captured under the old settings, and applies sample rate
changes to the hardware itself.

As for what using this library looks like in practice, here's an example
program that configures the receiver, streams for a while, and estimates the
average received power relative to full scale:

```no_run
use std::sync::Arc;

use anyhow::Result;
use waverave_hydrasdr::{GainStage, StreamArgs};
#[tokio::main]
async fn main() -> Result<()> {
    let sdr = Arc::new(waverave_hydrasdr::open_hydrasdr()?);

    // Configure: 6 MHz sample rate, mid-range gains, and tune to 915 MHz.
    sdr.set_sample_rate(6e6);
    sdr.set_gain(GainStage::Lna, 10.0).await?;
    sdr.set_gain(GainStage::Mixer, 8.0).await?;
    sdr.set_gain(GainStage::Vga, 6.0).await?;
    sdr.set_frequency(915e6).await?;

    // Start receiving, and pull out a million samples.
    let mut rx = sdr.clone().start_rx(StreamArgs::default()).await?;
    let mut buf = vec![0u16; 65536];
    let mut count = 0;
    let mut pow_sum = 0.0;
    while count < 1_000_000 {
        let n = rx.read(&mut buf).await?;
        for &x in &buf[..n] {
            // 12-bit samples, offset by half scale.
            let v = (x & 0xfff) as f64 - 2048.0;
            pow_sum += v * v;
        }
        count += n;
    }

    // Stop receiving
    rx.stop().await?;

    // Print out our measurement
    let average_power = (pow_sum / (count as f64 * 2048.0 * 2048.0)).log10() * 10.;
    println!("Average Power = {average_power} dbFS");
    Ok(())
}

```

*/

#![warn(missing_docs)]

mod consts;
mod device;
pub mod endpoint;
mod error;
pub mod info;
#[cfg(test)]
mod mock;
mod packing;
mod params;
pub mod registry;
mod rx;
pub mod settings;
pub mod usb;

use std::collections::BTreeMap;

pub use crate::consts::{
    DEFAULT_NUM_BUFFERS, DEFAULT_SAMPLE_RATE, FREQ_RANGE_HZ, GAIN_RANGE, HYDRASDR_USB_PID,
    HYDRASDR_USB_VID,
};
pub use crate::device::{HydraSdr, parse_serial};
pub use crate::endpoint::{Backend, Endpoint, GainStage, RxQueue};
pub use crate::error::Error;
pub use crate::rx::{Receive, Reconciled, StreamArgs, StreamState};
pub use crate::settings::{ArgInfo, ArgType, Setting};

use crate::usb::{UsbBackend, UsbEndpoint};

/// String arguments, as used for discovery, opening, and stream setup.
pub type Kwargs = BTreeMap<String, String>;

/// Direction of a channel.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Open the first detected HydraSDR device in the system.
///
/// This is a shortcut for opening through a default [`UsbBackend`].
pub fn open_hydrasdr() -> Result<HydraSdr<UsbEndpoint>, Error> {
    Ok(HydraSdr::new(UsbBackend::new().open(None)?))
}
