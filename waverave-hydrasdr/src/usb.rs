//! The HydraSDR over USB, using [`nusb`].
//!
//! [`UsbBackend`] finds and opens receivers, producing a [`UsbEndpoint`] for
//! each. Most users won't touch these directly: [`open_hydrasdr`][crate::open_hydrasdr]
//! and the registered [`DRIVER`][crate::registry::DRIVER] go through them.

use std::io::ErrorKind;

use bytemuck::Pod;
use core::mem::size_of;
use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, RequestBuffer};
use tracing::debug;

use crate::consts::*;
use crate::endpoint::{Backend, Endpoint, GainStage, RxQueue};
use crate::info::Info;
use crate::Error;

/// USB vendor & product IDs to match when enumerating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsbIds {
    /// Vendor ID.
    pub vid: u16,
    /// Product ID.
    pub pid: u16,
}

impl Default for UsbIds {
    fn default() -> Self {
        Self::HYDRASDR
    }
}

impl UsbIds {
    /// The IDs the HydraSDR firmware enumerates with.
    pub const HYDRASDR: UsbIds = UsbIds {
        vid: HYDRASDR_USB_VID,
        pid: HYDRASDR_USB_PID,
    };
}

/// Pull the serial number out of a USB serial string.
///
/// The firmware reports serials as `<PREFIX> SN:<hex>`; everything after the
/// last `:` is parsed as hexadecimal. A bare hex string also works.
pub fn parse_usb_serial(s: &str) -> Option<u64> {
    let hex = s.rsplit(':').next()?.trim();
    u64::from_str_radix(hex, 16).ok()
}

/// Finds and opens HydraSDR receivers attached over USB.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsbBackend {
    ids: UsbIds,
}

impl UsbBackend {
    /// Match the default HydraSDR USB IDs.
    pub const fn new() -> Self {
        Self {
            ids: UsbIds::HYDRASDR,
        }
    }

    /// Match a specific pair of USB IDs, for boards that enumerate
    /// differently.
    pub const fn with_ids(ids: UsbIds) -> Self {
        Self { ids }
    }

    fn matching(&self) -> Result<impl Iterator<Item = nusb::DeviceInfo>, Error> {
        let ids = self.ids;
        Ok(nusb::list_devices()?
            .filter(move |d| d.vendor_id() == ids.vid && d.product_id() == ids.pid))
    }
}

impl Backend for UsbBackend {
    type Endpoint = UsbEndpoint;

    fn list_serials(&self) -> Result<Vec<u64>, Error> {
        Ok(self
            .matching()?
            .filter_map(|d| {
                let serial = d.serial_number().and_then(parse_usb_serial);
                if serial.is_none() {
                    debug!(
                        "Skipping device on bus {} address {}: no usable serial number",
                        d.bus_number(),
                        d.device_address()
                    );
                }
                serial
            })
            .collect())
    }

    fn open(&self, serial: Option<u64>) -> Result<UsbEndpoint, Error> {
        let mut devices = self.matching()?;
        let (info, serial) = match serial {
            Some(want) => devices
                .find_map(|d| {
                    let s = d.serial_number().and_then(parse_usb_serial)?;
                    (s == want).then_some((d, s))
                })
                .ok_or(Error::NotFound(want))?,
            None => devices
                .next()
                .map(|d| {
                    let s = d.serial_number().and_then(parse_usb_serial).unwrap_or(0);
                    (d, s)
                })
                .ok_or(Error::NoDevice)?,
        };
        UsbEndpoint::open(&info, serial)
    }
}

/// An opened HydraSDR on the USB bus.
///
/// The interface is released when this is dropped.
pub struct UsbEndpoint {
    interface: nusb::Interface,
    serial: u64,
}

impl UsbEndpoint {
    fn open(info: &nusb::DeviceInfo, serial: u64) -> Result<Self, Error> {
        let interface = claim(info).map_err(|e| {
            if e.kind() == ErrorKind::ResourceBusy {
                Error::Busy(serial)
            } else {
                Error::Io(e)
            }
        })?;
        debug!("Opened HydraSDR device: serial = {:x}", serial);
        Ok(Self { interface, serial })
    }

    /// Access the board information commands.
    pub fn info(&self) -> Info<'_> {
        Info::new(self)
    }

    async fn write_u16(&self, req: VendorRequest, value: u16, index: u16) -> Result<(), Error> {
        Ok(self
            .interface
            .control_out(ControlOut {
                control_type: ControlType::Vendor,
                recipient: Recipient::Device,
                request: req as u8,
                value,
                index,
                data: &[],
            })
            .await
            .status?)
    }

    async fn write_bytes(&self, req: VendorRequest, data: &[u8]) -> Result<(), Error> {
        self.interface
            .control_out(ControlOut {
                control_type: ControlType::Vendor,
                recipient: Recipient::Device,
                request: req as u8,
                value: 0,
                index: 0,
                data,
            })
            .await
            .into_result()?;
        Ok(())
    }

    pub(crate) async fn read_bytes(
        &self,
        req: VendorRequest,
        index: u16,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        let length = u16::try_from(len).map_err(|_| Error::ReturnData)?;
        Ok(self
            .interface
            .control_in(ControlIn {
                control_type: ControlType::Vendor,
                recipient: Recipient::Device,
                request: req as u8,
                value: 0,
                index,
                length,
            })
            .await
            .into_result()?)
    }

    pub(crate) async fn read_u8(&self, req: VendorRequest, index: u16) -> Result<u8, Error> {
        let ret = self.read_bytes(req, index, 1).await?;
        ret.first().copied().ok_or(Error::ReturnData)
    }

    pub(crate) async fn read_struct<T>(&self, req: VendorRequest) -> Result<T, Error>
    where
        T: Pod,
    {
        let size = size_of::<T>();
        let mut resp = self.read_bytes(req, 0, size).await?;
        if resp.len() < size {
            return Err(Error::ReturnData);
        }
        resp.truncate(size);
        Ok(bytemuck::pod_read_unaligned(&resp))
    }
}

fn claim(info: &nusb::DeviceInfo) -> Result<nusb::Interface, std::io::Error> {
    let device = info.open()?;
    #[cfg(not(target_os = "windows"))]
    {
        if device.active_configuration()?.configuration_value() != 1 {
            device.detach_kernel_driver(0)?;
            device.set_configuration(1)?;
        }
    }
    device.detach_and_claim_interface(0)
}

impl Endpoint for UsbEndpoint {
    type Rx = UsbRxQueue;

    fn serial(&self) -> u64 {
        self.serial
    }

    async fn set_freq(&self, freq_hz: u32) -> Result<(), Error> {
        self.write_bytes(VendorRequest::SetFreq, &freq_hz.to_le_bytes())
            .await
    }

    async fn sample_rates(&self) -> Result<Vec<u32>, Error> {
        // First ask how many there are, then fetch them all.
        let count = self.read_bytes(VendorRequest::GetSamplerates, 0, 4).await?;
        let count: [u8; 4] = count.as_slice().try_into().map_err(|_| Error::ReturnData)?;
        let count = u32::from_le_bytes(count) as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let index = u16::try_from(count).map_err(|_| Error::ReturnData)?;
        let len = count * size_of::<u32>();
        let resp = self
            .read_bytes(VendorRequest::GetSamplerates, index, len)
            .await?;
        if resp.len() < len {
            return Err(Error::ReturnData);
        }
        Ok(resp
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    async fn set_sample_rate(&self, index: u32) -> Result<(), Error> {
        let index = u16::try_from(index)
            .map_err(|_| Error::InvalidParameter("Sample rate index is out of range"))?;
        self.read_u8(VendorRequest::SetSamplerate, index).await?;
        Ok(())
    }

    async fn set_gain(&self, stage: GainStage, value: u8) -> Result<(), Error> {
        let req = match stage {
            GainStage::Lna => VendorRequest::SetLnaGain,
            GainStage::Mixer => VendorRequest::SetMixerGain,
            GainStage::Vga => VendorRequest::SetVgaGain,
        };
        self.read_u8(req, value as u16).await?;
        Ok(())
    }

    async fn set_agc(&self, stage: GainStage, enable: bool) -> Result<(), Error> {
        let req = match stage {
            GainStage::Lna => VendorRequest::SetLnaAgc,
            GainStage::Mixer => VendorRequest::SetMixerAgc,
            GainStage::Vga => return Err(Error::InvalidParameter("VGA stage has no AGC")),
        };
        self.read_u8(req, enable as u16).await?;
        Ok(())
    }

    async fn set_rf_bias(&self, enable: bool) -> Result<(), Error> {
        self.write_u16(VendorRequest::GpioWrite, enable as u16, BIAS_TEE_PORT_PIN)
            .await
    }

    async fn set_packing(&self, enable: bool) -> Result<(), Error> {
        self.read_u8(VendorRequest::SetPacking, enable as u16).await?;
        Ok(())
    }

    async fn set_receiver_mode(&self, on: bool) -> Result<(), Error> {
        let mode = if on { ReceiverMode::On } else { ReceiverMode::Off };
        self.write_u16(VendorRequest::ReceiverMode, mode as u16, 0)
            .await
    }

    fn rx_queue(&self) -> UsbRxQueue {
        UsbRxQueue {
            queue: self.interface.bulk_in_queue(RX_ENDPOINT_ADDRESS),
            pool: Vec::new(),
        }
    }
}

/// Bulk IN queue for a [`UsbEndpoint`].
///
/// Completed buffers handed back through [`RxQueue::recycle`] are reused by
/// later submissions instead of allocating fresh ones.
pub struct UsbRxQueue {
    queue: nusb::transfer::Queue<RequestBuffer>,
    pool: Vec<Vec<u8>>,
}

impl RxQueue for UsbRxQueue {
    fn submit(&mut self, len: usize) {
        let req = match self.pool.pop() {
            Some(buf) => RequestBuffer::reuse(buf, len),
            None => RequestBuffer::new(len),
        };
        self.queue.submit(req);
    }

    async fn next_complete(&mut self) -> Result<Vec<u8>, Error> {
        let result = self.queue.next_complete().await;
        match result.status {
            Ok(_) => Ok(result.data),
            Err(e) => {
                // Reuse the buffer even in the event of an error.
                self.pool.push(result.data);
                Err(e.into())
            }
        }
    }

    fn recycle(&mut self, buf: Vec<u8>) {
        self.pool.push(buf);
    }

    fn pending(&self) -> usize {
        self.queue.pending()
    }

    fn cancel_all(&mut self) {
        self.queue.cancel_all();
    }
}
