/// An error from operating the HydraSDR.
///
/// Errors fall into a few groups:
///
/// - `Io` & `Transfer` are failures on the USB link itself. Whatever operation
///   produced them can be retried.
/// - `InvalidSerial`, `SerialRange`, `NoDevice`, `NotFound`, and `Busy` can
///   only come out of opening a device, and mean no device handle was created.
/// - `Setting` wraps a failed hardware transaction while applying one
///   parameter, and names both the parameter and the device serial. The value
///   was still recorded in the parameter store, so reading it back returns the
///   value that failed to apply until the next successful write.
/// - `SampleRate`, `StreamActive`, and `StreamFault` come from the streaming
///   side. A stream that returned `StreamFault` can't deliver any more
///   samples and should be stopped.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Underlying OS I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Transfer error from `nusb`.
    #[error("USB transfer error")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// Returned data from the HydraSDR didn't make any sense.
    #[error("Invalid return data")]
    ReturnData,

    /// Some argument to a function is invalid in a way not easily expressed as
    /// a range.
    #[error("Invalid Parameter: {0}")]
    InvalidParameter(&'static str),

    /// The `serial` argument couldn't be parsed as a hexadecimal number.
    #[error("serial is not a hex number: {0:?}")]
    InvalidSerial(String),

    /// The `serial` argument doesn't fit in 64 bits.
    #[error("serial value out of range: {0:?}")]
    SerialRange(String),

    /// No HydraSDR is attached at all.
    #[error("Unable to open HydraSDR device: none found")]
    NoDevice,

    /// No HydraSDR with the requested serial is attached.
    #[error("Unable to open HydraSDR device with serial {0:x}")]
    NotFound(u64),

    /// The HydraSDR exists but couldn't be claimed, usually because another
    /// process has it open.
    #[error("HydraSDR device with serial {0:x} is busy")]
    Busy(u64),

    /// A hardware transaction failed while applying a parameter.
    #[error("Failed setting {field} on HydraSDR {serial:x}")]
    #[allow(missing_docs)]
    Setting {
        field: &'static str,
        serial: u64,
        #[source]
        source: Box<Error>,
    },

    /// The requested sample rate isn't one the hardware enumerates.
    #[error("Sample rate {rate} Hz is not supported by HydraSDR {serial:x}")]
    #[allow(missing_docs)]
    SampleRate { rate: u32, serial: u64 },

    /// A stream is already running on this device.
    #[error("HydraSDR {0:x} is already streaming")]
    StreamActive(u64),

    /// The stream halted after failing to reconfigure the hardware.
    #[error("Stream halted after a failed reconfiguration")]
    StreamFault,
}

impl Error {
    pub(crate) fn setting(field: &'static str, serial: u64) -> impl FnOnce(Error) -> Error {
        move |source| Error::Setting {
            field,
            serial,
            source: Box::new(source),
        }
    }
}
