//! Device discovery and construction for generic radio front ends.
//!
//! A front end that knows about several kinds of radio looks each one up by
//! its [`Driver::KEY`], calls [`find`][Driver::find] to list what's attached,
//! and passes one of the returned argument sets to [`make`][Driver::make].
//!
//! ```no_run
//! # use anyhow::Result;
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! use waverave_hydrasdr::registry::{DRIVER, Driver};
//!
//! for args in DRIVER.find(&Default::default()) {
//!     println!("{}", args["label"]);
//!     let sdr = DRIVER.make(&args).await?;
//!     println!("  driver {}", sdr.driver_key());
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tracing::{debug, error};

use crate::device::parse_serial;
use crate::endpoint::Backend;
use crate::usb::UsbBackend;
use crate::{Error, HydraSdr, Kwargs};

/// A kind of radio that can be discovered and opened by string arguments.
pub trait Driver: Send + Sync {
    /// Registry key for this driver.
    const KEY: &'static str;

    /// What [`make`][Self::make] produces.
    type Device;

    /// List attached devices matching `args`. Each result can be handed to
    /// [`make`][Self::make] as-is.
    fn find(&self, args: &Kwargs) -> Vec<Kwargs>;

    /// Open a device.
    fn make(&self, args: &Kwargs) -> impl Future<Output = Result<Self::Device, Error>> + Send;
}

/// The HydraSDR driver, over any [`Backend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HydraSdrDriver<B> {
    backend: B,
}

impl<B> HydraSdrDriver<B> {
    /// Use a specific backend.
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }
}

/// The HydraSDR driver over USB.
pub static DRIVER: HydraSdrDriver<UsbBackend> = HydraSdrDriver::new(UsbBackend::new());

impl<B: Backend> Driver for HydraSdrDriver<B> {
    const KEY: &'static str = "hydrasdr";

    type Device = HydraSdr<B::Endpoint>;

    /// Enumeration failures are logged and produce an empty list. A `serial`
    /// argument that isn't valid hex matches nothing.
    fn find(&self, args: &Kwargs) -> Vec<Kwargs> {
        let serials = match self.backend.list_serials() {
            Ok(serials) => serials,
            Err(e) => {
                error!("HydraSDR error listing devices: {}", e);
                return Vec::new();
            }
        };
        debug!("{} HydraSDR boards found.", serials.len());

        let wanted = args.get("serial").map(|s| parse_serial(s).ok());
        serials
            .into_iter()
            .filter_map(|serial| {
                let hex = format!("{:x}", serial);
                if let Some(wanted) = wanted {
                    if wanted != Some(serial) {
                        return None;
                    }
                    debug!("Found HydraSDR by serial {}", hex);
                }
                let mut info = Kwargs::new();
                info.insert("label".to_string(), format!("HydraSDR RFOne [{hex}]"));
                info.insert("serial".to_string(), hex);
                Some(info)
            })
            .collect()
    }

    async fn make(&self, args: &Kwargs) -> Result<Self::Device, Error> {
        HydraSdr::open(&self.backend, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, Op};

    #[test]
    fn find_lists_everything() {
        let (backend, _probe) = MockBackend::new(&[0xa1, 0xdead_beef]);
        let driver = HydraSdrDriver::new(backend);
        let found = driver.find(&Kwargs::new());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["label"], "HydraSDR RFOne [a1]");
        assert_eq!(found[0]["serial"], "a1");
        assert_eq!(found[1]["serial"], "deadbeef");
    }

    #[test]
    fn find_by_serial() {
        let (backend, _probe) = MockBackend::new(&[0xa1, 0xdead_beef]);
        let driver = HydraSdrDriver::new(backend);
        let mut args = Kwargs::new();
        args.insert("serial".into(), "0xDEADBEEF".into());
        let found = driver.find(&args);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["serial"], "deadbeef");

        args.insert("serial".into(), "b2".into());
        assert!(driver.find(&args).is_empty());
        args.insert("serial".into(), "not hex".into());
        assert!(driver.find(&args).is_empty());
    }

    #[test]
    fn find_survives_enumeration_failure() {
        let (backend, probe) = MockBackend::new(&[0xa1]);
        probe.fail(Op::List);
        assert!(HydraSdrDriver::new(backend).find(&Kwargs::new()).is_empty());
    }

    #[tokio::test]
    async fn make_from_found_args() {
        let (backend, _probe) = MockBackend::new(&[0xa1, 0xb2]);
        let driver = HydraSdrDriver::new(backend);
        let args = driver.find(&Kwargs::new()).pop().unwrap();
        let sdr = driver.make(&args).await.unwrap();
        assert_eq!(sdr.serial(), 0xb2);
        assert_eq!(HydraSdrDriver::<MockBackend>::KEY, "hydrasdr");
    }
}
