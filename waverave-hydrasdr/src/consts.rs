/// Default USB vendor ID used by the HydraSDR firmware.
pub const HYDRASDR_USB_VID: u16 = 0x1d50;
/// Default USB product ID used by the HydraSDR firmware.
pub const HYDRASDR_USB_PID: u16 = 0x60a1;

/// Bulk IN endpoint carrying sample data.
pub const RX_ENDPOINT_ADDRESS: u8 = 0x81;

/// Sample rate chosen at open, before anything else is written.
pub const DEFAULT_SAMPLE_RATE: u32 = 3_000_000;
/// Number of bulk transfers kept in flight while streaming.
pub const DEFAULT_NUM_BUFFERS: usize = 8;

/// Advertised tuning range of the RF front end, in Hz.
pub const FREQ_RANGE_HZ: core::ops::RangeInclusive<u32> = 24_000_000..=1_800_000_000;
/// Range of every gain element, in device steps.
pub const GAIN_RANGE: core::ops::RangeInclusive<u8> = 0..=15;

/// GPIO port/pin driving the bias-tee switch, encoded as `(port << 5) | pin`.
pub const BIAS_TEE_PORT_PIN: u16 = (1 << 5) | 13;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VendorRequest {
    ReceiverMode = 1,
    BoardIdRead = 9,
    VersionStringRead = 10,
    BoardPartidSerialnoRead = 11,
    SetSamplerate = 12,
    SetFreq = 13,
    SetLnaGain = 14,
    SetMixerGain = 15,
    SetVgaGain = 16,
    SetLnaAgc = 17,
    SetMixerAgc = 18,
    GpioWrite = 21,
    GetSamplerates = 25,
    SetPacking = 26,
}

#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverMode {
    Off = 0,
    On = 1,
}
