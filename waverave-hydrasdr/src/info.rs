//! Get information about a HydraSDR board.
//!
//! This module contains the [`Info`] struct for accessing information from a
//! USB-attached HydraSDR, which can be used to get:
//!
//! - The MCU's [part ID and serial number][PartSerial] with [Info::part_serial].
//! - The [board identifier][BoardId], with [Info::board_id]
//! - The firmware version string, with [Info::version_string]
//!
//! The general way to do this is:
//!
//! ```no_run
//!
//! # use anyhow::Result;
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//!
//! use waverave_hydrasdr::{Backend, usb::UsbBackend};
//!
//! let endpoint = UsbBackend::new().open(None)?;
//! let info = endpoint.info();
//!
//! let board_id = info.board_id().await?;
//! let version = info.version_string().await?;
//! let part_serial = info.part_serial().await?;
//! println!("{board_id}, firmware {version}, serial {:016x}", part_serial.serial());
//!
//! # Ok(())
//! # }
//! ```
use crate::{Error, consts::VendorRequest, usb::UsbEndpoint};

/// The MCU part ID and unique serial number.
///
/// Only the last two 32-bit words of `serial_no` are used for the serial
/// number reported over USB; see [`PartSerial::serial`].
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct PartSerial {
    /// MCU part ID.
    pub part_id: [u32; 2],
    /// Unique serial number words.
    pub serial_no: [u32; 4],
}

impl PartSerial {
    fn le_convert(&mut self) {
        for x in self.part_id.iter_mut() {
            *x = u32::from_le(*x);
        }
        for x in self.serial_no.iter_mut() {
            *x = u32::from_le(*x);
        }
    }

    /// The 64-bit serial number, as used to pick a device at open.
    pub fn serial(&self) -> u64 {
        ((self.serial_no[2] as u64) << 32) | self.serial_no[3] as u64
    }
}

/// The physical board's identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardId {
    /// HydraSDR RFOne.
    RfOne,
    /// Any ID this crate doesn't know about.
    Unknown(u8),
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RfOne => f.write_str("HydraSDR RFOne"),
            Self::Unknown(v) => write!(f, "Unknown (0x{:x})", v),
        }
    }
}

impl BoardId {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::RfOne,
            v => Self::Unknown(v),
        }
    }
}

/// Info-gathering operations for the HydraSDR.
///
/// Borrows the endpoint while doing operations.
pub struct Info<'a> {
    inner: &'a UsbEndpoint,
}

impl<'a> Info<'a> {
    pub(crate) fn new(inner: &'a UsbEndpoint) -> Info<'a> {
        Self { inner }
    }

    /// Get the [board hardware ID][BoardId].
    pub async fn board_id(&self) -> Result<BoardId, Error> {
        let ret = self.inner.read_u8(VendorRequest::BoardIdRead, 0).await?;
        Ok(BoardId::from_u8(ret))
    }

    /// Get the firmware version as a string.
    pub async fn version_string(&self) -> Result<String, Error> {
        let mut resp = self
            .inner
            .read_bytes(VendorRequest::VersionStringRead, 0, 255)
            .await?;
        // The firmware pads the string with NULs.
        if let Some(end) = resp.iter().position(|&b| b == 0) {
            resp.truncate(end);
        }
        String::from_utf8(resp).map_err(|_| Error::ReturnData)
    }

    /// Get the MCU's part ID and serial number.
    ///
    /// See [`PartSerial`] for more info.
    pub async fn part_serial(&self) -> Result<PartSerial, Error> {
        let mut v: PartSerial = self
            .inner
            .read_struct(VendorRequest::BoardPartidSerialnoRead)
            .await?;
        v.le_convert();
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_from_words() {
        let ps = PartSerial {
            part_id: [0, 0],
            serial_no: [0, 0, 0x0123_4567, 0x89ab_cdef],
        };
        assert_eq!(ps.serial(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn board_names() {
        assert_eq!(BoardId::from_u8(0).to_string(), "HydraSDR RFOne");
        assert_eq!(BoardId::from_u8(7).to_string(), "Unknown (0x7)");
    }
}
