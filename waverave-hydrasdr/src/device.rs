use std::num::IntErrorKind;
use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::consts::{FREQ_RANGE_HZ, GAIN_RANGE};
use crate::endpoint::{Backend, Endpoint, GainStage};
use crate::params::Params;
use crate::rx::{Receive, StreamArgs};
use crate::settings::{ArgInfo, Setting, format_bool, parse_bool};
use crate::{Direction, Error, Kwargs};

/// Name of the only tunable frequency element.
const RF_ELEMENT: &str = "RF";
/// Name of the only antenna.
const ANTENNA: &str = "RX";

/// Parse a serial number given as hexadecimal, with or without a `0x` prefix.
pub fn parse_serial(s: &str) -> Result<u64, Error> {
    let hex = s.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    u64::from_str_radix(hex, 16).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => Error::SerialRange(s.to_string()),
        _ => Error::InvalidSerial(s.to_string()),
    })
}

fn clamp_gain(value: f64) -> u8 {
    if value.is_nan() {
        return *GAIN_RANGE.start();
    }
    value.clamp(*GAIN_RANGE.start() as f64, *GAIN_RANGE.end() as f64) as u8
}

fn gain_field(stage: GainStage) -> &'static str {
    match stage {
        GainStage::Lna => "LNA gain",
        GainStage::Mixer => "mixer gain",
        GainStage::Vga => "VGA gain",
    }
}

/// A HydraSDR receiver. This is the main struct for configuring it.
///
/// Every control is mirrored in memory, so getters never touch the hardware.
/// Setters record the new value first and then apply it; if the hardware
/// transaction fails, the error is returned but the recorded value stays.
///
/// All methods take `&self`, so a device wrapped in an [`Arc`] can be tuned
/// from one task while another is streaming from it with [`Receive`]. Tuning
/// or changing the sample rate tells the stream to throw away everything
/// captured under the old settings; a sample rate change is only applied to
/// the hardware by the stream itself. See [`Receive`] for details.
pub struct HydraSdr<E: Endpoint> {
    pub(crate) endpoint: E,
    pub(crate) serial: u64,
    pub(crate) params: Params,
}

impl<E: Endpoint> HydraSdr<E> {
    /// Wrap an already-opened endpoint. The parameter store starts at its
    /// defaults, and nothing is written to the hardware.
    pub fn new(endpoint: E) -> Self {
        let serial = endpoint.serial();
        Self {
            endpoint,
            serial,
            params: Params::default(),
        }
    }

    /// Open a receiver through `backend`.
    ///
    /// If `args` has a `serial` entry, the device with that serial is opened,
    /// otherwise the first one found. Any recognized settings in `args` (see
    /// [`setting_info`][Self::setting_info]) are then written, in the order
    /// they're listed there.
    pub async fn open<B>(backend: &B, args: &Kwargs) -> Result<Self, Error>
    where
        B: Backend<Endpoint = E>,
    {
        let serial = args.get("serial").map(|s| parse_serial(s)).transpose()?;
        let dev = Self::new(backend.open(serial)?);
        for setting in Setting::ALL {
            if let Some(value) = args.get(setting.key()) {
                dev.write_setting(setting.key(), value).await?;
            }
        }
        Ok(dev)
    }

    /// The underlying endpoint, for board-specific queries like
    /// [`UsbEndpoint::info`][crate::usb::UsbEndpoint::info].
    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Serial number of this receiver.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Driver identifier.
    pub fn driver_key(&self) -> &'static str {
        "HydraSDR"
    }

    /// Hardware identifier.
    pub fn hardware_key(&self) -> &'static str {
        "HydraSDR"
    }

    /// Extra hardware details: currently just the serial number, in hex.
    pub fn hardware_info(&self) -> Kwargs {
        let mut info = Kwargs::new();
        info.insert("serial".to_string(), format!("{:x}", self.serial));
        info
    }

    /// Number of channels in each direction. This is a receive-only device
    /// with a single channel.
    pub fn num_channels(&self, dir: Direction) -> usize {
        match dir {
            Direction::Rx => 1,
            Direction::Tx => 0,
        }
    }

    /// Antennas available for selection.
    pub fn list_antennas(&self) -> Vec<&'static str> {
        vec![ANTENNA]
    }

    /// There's only one antenna input, so this does nothing.
    pub fn set_antenna(&self, _name: &str) {}

    /// The selected antenna.
    pub fn antenna(&self) -> &'static str {
        ANTENNA
    }

    /// No automatic DC offset correction is offered.
    pub fn has_dc_offset_mode(&self) -> bool {
        false
    }

    /// Names of the gain stages, in order.
    pub fn list_gains(&self) -> Vec<&'static str> {
        GainStage::ALL.into_iter().map(GainStage::name).collect()
    }

    /// Automatic gain control is available.
    pub fn has_gain_mode(&self) -> bool {
        true
    }

    /// Turn automatic gain control on or off.
    ///
    /// This drives both the LNA and mixer AGC. If the mixer fails to switch,
    /// the LNA is put back the way it was, and the recorded mode is unchanged.
    pub async fn set_gain_mode(&self, automatic: bool) -> Result<(), Error> {
        let previous = self.params.agc();
        self.endpoint
            .set_agc(GainStage::Lna, automatic)
            .await
            .map_err(Error::setting("AGC mode", self.serial))?;
        if let Err(e) = self.endpoint.set_agc(GainStage::Mixer, automatic).await {
            if let Err(undo) = self.endpoint.set_agc(GainStage::Lna, previous).await {
                warn!("Failed restoring LNA AGC on HydraSDR {:x}: {}", self.serial, undo);
            }
            return Err(Error::setting("AGC mode", self.serial)(e));
        }
        self.params.set_agc(automatic);
        debug!("Setting AGC: {}", if automatic { "automatic" } else { "manual" });
        Ok(())
    }

    /// Whether automatic gain control is on.
    pub fn gain_mode(&self) -> bool {
        self.params.agc()
    }

    /// Set one gain stage. The value is clamped to 0-15 and truncated to a
    /// whole step.
    pub async fn set_gain(&self, stage: GainStage, value: f64) -> Result<(), Error> {
        let value = clamp_gain(value);
        self.params.set_gain(stage, value);
        debug!("Setting {} gain: {}", stage, value);
        self.endpoint
            .set_gain(stage, value)
            .await
            .map_err(Error::setting(gain_field(stage), self.serial))
    }

    /// Set a gain stage by name. Unknown names are ignored.
    pub async fn set_gain_by_name(&self, name: &str, value: f64) -> Result<(), Error> {
        match GainStage::from_name(name) {
            Some(stage) => self.set_gain(stage, value).await,
            None => {
                debug!("Ignoring unknown gain element '{}'", name);
                Ok(())
            }
        }
    }

    /// The recorded value of one gain stage.
    pub fn gain(&self, stage: GainStage) -> f64 {
        self.params.gain(stage) as f64
    }

    /// The recorded value of a gain stage by name, or 0 for unknown names.
    pub fn gain_by_name(&self, name: &str) -> f64 {
        GainStage::from_name(name).map_or(0.0, |s| self.gain(s))
    }

    /// Range of a gain stage. Every stage has the same range.
    pub fn gain_range(&self, _name: &str) -> RangeInclusive<f64> {
        (*GAIN_RANGE.start() as f64)..=(*GAIN_RANGE.end() as f64)
    }

    /// Tune the receiver.
    ///
    /// The frequency is truncated to whole Hz and saturates at the bounds of
    /// a `u32`. A running stream drops everything it captured before the
    /// retune.
    pub async fn set_frequency(&self, hz: f64) -> Result<(), Error> {
        let hz = hz as u32;
        self.params.set_center_freq(hz);
        self.params.mark_reset();
        debug!("Setting center freq: {}", hz);
        self.endpoint
            .set_freq(hz)
            .await
            .map_err(Error::setting("frequency", self.serial))
    }

    /// Tune a named frequency element. Only `"RF"` exists; anything else is
    /// ignored.
    pub async fn set_frequency_component(&self, name: &str, hz: f64) -> Result<(), Error> {
        if name == RF_ELEMENT {
            self.set_frequency(hz).await
        } else {
            debug!("Ignoring unknown frequency element '{}'", name);
            Ok(())
        }
    }

    /// The recorded center frequency.
    pub fn frequency(&self) -> f64 {
        self.params.center_freq() as f64
    }

    /// The recorded frequency of a named element, or 0 for unknown names.
    pub fn frequency_component(&self, name: &str) -> f64 {
        if name == RF_ELEMENT {
            self.frequency()
        } else {
            0.0
        }
    }

    /// Names of the tunable frequency elements.
    pub fn list_frequencies(&self) -> Vec<&'static str> {
        vec![RF_ELEMENT]
    }

    /// Tuning range of a frequency element. Unknown elements have no range.
    pub fn frequency_range(&self, name: &str) -> Vec<RangeInclusive<f64>> {
        if name == RF_ELEMENT {
            vec![(*FREQ_RANGE_HZ.start() as f64)..=(*FREQ_RANGE_HZ.end() as f64)]
        } else {
            Vec::new()
        }
    }

    /// Record a new sample rate.
    ///
    /// Nothing is sent to the hardware here. The rate is applied the next
    /// time a stream starts, or by a running stream before it delivers any
    /// more samples. Setting the rate already recorded does nothing.
    pub fn set_sample_rate(&self, rate: f64) {
        let rate = rate.round() as u32;
        if self.params.stage_sample_rate(rate) {
            debug!("Setting sample rate: {}", rate);
        }
    }

    /// The recorded sample rate. It may not have reached the hardware yet.
    pub fn sample_rate(&self) -> f64 {
        self.params.sample_rate() as f64
    }

    /// Ask the hardware which sample rates it supports.
    pub async fn list_sample_rates(&self) -> Result<Vec<f64>, Error> {
        let rates = self
            .endpoint
            .sample_rates()
            .await
            .map_err(Error::setting("sample rate list", self.serial))?;
        Ok(rates.into_iter().map(|r| r as f64).collect())
    }

    /// Selectable analog bandwidths. The filters follow the sample rate, so
    /// there are none to pick.
    pub fn list_bandwidths(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Descriptions of every setting accepted by
    /// [`write_setting`][Self::write_setting].
    pub fn setting_info(&self) -> Vec<ArgInfo> {
        Setting::ALL.into_iter().map(Setting::info).collect()
    }

    /// Write a setting by key. Only the exact value `"true"` turns a setting
    /// on; unknown keys are ignored.
    ///
    /// Changing bit packing while a stream is running makes it drop what it
    /// has buffered, since those transfers were framed under the old mode.
    pub async fn write_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let Some(setting) = Setting::from_key(key) else {
            debug!("Ignoring unknown setting '{}'", key);
            return Ok(());
        };
        let enable = parse_bool(value);
        debug!("Setting {}: {}", key, enable);
        match setting {
            Setting::BiasTee => {
                self.params.set_rf_bias(enable);
                self.endpoint
                    .set_rf_bias(enable)
                    .await
                    .map_err(Error::setting("bias tee", self.serial))
            }
            Setting::BitPack => {
                let was = self.params.set_bit_pack(enable);
                let result = self
                    .endpoint
                    .set_packing(enable)
                    .await
                    .map_err(Error::setting("bit packing", self.serial));
                // Only after the firmware has switched, so the stream never
                // refills with transfers framed under the old mode.
                if was != enable && self.params.stream_active() {
                    self.params.mark_reset();
                }
                result
            }
        }
    }

    /// Read back a setting by key, as `"true"` or `"false"`. Unknown keys
    /// read as an empty string.
    pub fn read_setting(&self, key: &str) -> String {
        match Setting::from_key(key) {
            Some(Setting::BiasTee) => format_bool(self.params.rf_bias()),
            Some(Setting::BitPack) => format_bool(self.params.bit_pack()),
            None => String::new(),
        }
    }

    /// Start streaming. Only one stream can run at a time.
    pub async fn start_rx(self: Arc<Self>, args: StreamArgs) -> Result<Receive<E>, Error> {
        Receive::new(self, args).await
    }

    /// Ask a running stream to stop. Its next read returns zero samples and
    /// the device can then be streamed from again. Does nothing when idle.
    pub fn request_stop(&self) {
        self.params.request_stop();
    }

    /// Whether a stream is running.
    pub fn is_streaming(&self) -> bool {
        self.params.stream_active()
    }

    /// Whether the stream has yet to discard what it captured before the last
    /// retune or rate change.
    pub fn reset_pending(&self) -> bool {
        self.params.reset_pending()
    }

    /// Whether a recorded sample rate has yet to reach the hardware.
    pub fn rate_change_pending(&self) -> bool {
        self.params.rate_change_pending()
    }

    /// Samples decoded by the stream but not yet read out.
    pub fn buffered_elems(&self) -> usize {
        self.params.buffered_elems()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MOCK_SERIAL, MockBackend, MockEndpoint, Op};

    fn device() -> (HydraSdr<MockEndpoint>, crate::mock::Probe) {
        let (ep, probe) = MockEndpoint::new();
        (HydraSdr::new(ep), probe)
    }

    #[test]
    fn serial_strings() {
        assert_eq!(parse_serial("a1b2").unwrap(), 0xa1b2);
        assert_eq!(parse_serial("0xA1B2").unwrap(), 0xa1b2);
        assert_eq!(parse_serial(" ffffffffffffffff ").unwrap(), u64::MAX);
        assert!(matches!(
            parse_serial("10000000000000000"),
            Err(Error::SerialRange(_))
        ));
        assert!(matches!(parse_serial("zz"), Err(Error::InvalidSerial(_))));
        assert!(matches!(parse_serial("12g"), Err(Error::InvalidSerial(_))));
        assert!(matches!(parse_serial(""), Err(Error::InvalidSerial(_))));
    }

    #[test]
    fn fresh_device_reports_defaults() {
        let (dev, probe) = device();
        assert_eq!(dev.sample_rate(), 3e6);
        assert_eq!(dev.frequency(), 0.0);
        assert!(!dev.gain_mode());
        for name in dev.list_gains() {
            assert_eq!(dev.gain_by_name(name), 0.0);
        }
        assert_eq!(dev.read_setting("biastee"), "false");
        assert_eq!(dev.read_setting("bitpack"), "false");
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn capabilities() {
        let (dev, _probe) = device();
        assert_eq!(dev.driver_key(), "HydraSDR");
        assert_eq!(dev.hardware_key(), "HydraSDR");
        assert_eq!(dev.hardware_info()["serial"], "123456789abcdef0");
        assert_eq!(dev.num_channels(Direction::Rx), 1);
        assert_eq!(dev.num_channels(Direction::Tx), 0);
        assert_eq!(dev.list_antennas(), ["RX"]);
        dev.set_antenna("TX");
        assert_eq!(dev.antenna(), "RX");
        assert_eq!(dev.list_gains(), ["LNA", "MIX", "VGA"]);
        assert_eq!(dev.gain_range("LNA"), 0.0..=15.0);
        assert_eq!(dev.list_frequencies(), ["RF"]);
        assert_eq!(dev.frequency_range("RF"), [24e6..=1.8e9]);
        assert!(dev.frequency_range("IF").is_empty());
        assert!(dev.has_gain_mode());
        assert!(!dev.has_dc_offset_mode());
        assert!(dev.list_bandwidths().is_empty());
        let keys: Vec<_> = dev.setting_info().iter().map(|a| a.key).collect();
        assert_eq!(keys, ["biastee", "bitpack"]);
    }

    #[tokio::test]
    async fn frequency_is_recorded_and_flags_reset() {
        let (dev, probe) = device();
        dev.set_frequency(100e6).await.unwrap();
        assert_eq!(dev.frequency(), 100e6);
        assert!(dev.reset_pending());
        assert_eq!(probe.calls(), [Call::SetFreq(100_000_000)]);

        dev.set_frequency_component("IF", 5e6).await.unwrap();
        assert_eq!(probe.calls().len(), 1);
        assert_eq!(dev.frequency_component("IF"), 0.0);
        assert_eq!(dev.frequency_component("RF"), 100e6);
    }

    #[tokio::test]
    async fn same_frequency_still_flags_reset() {
        let (dev, probe) = device();
        dev.set_frequency(100e6).await.unwrap();
        assert!(dev.params.take_reset());
        assert!(!dev.reset_pending());

        dev.set_frequency(100e6).await.unwrap();
        assert!(dev.reset_pending());
        assert_eq!(probe.count(Call::SetFreq(100_000_000)), 2);
    }

    #[tokio::test]
    async fn failed_tune_still_records() {
        let (dev, probe) = device();
        probe.fail(Op::SetFreq);
        let err = dev.set_frequency(433.92e6).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Setting {
                field: "frequency",
                serial: MOCK_SERIAL,
                ..
            }
        ));
        assert_eq!(dev.frequency(), 433_920_000.0);
        assert!(dev.reset_pending());
    }

    #[tokio::test]
    async fn gains_clamp() {
        let (dev, probe) = device();
        dev.set_gain(GainStage::Lna, 20.0).await.unwrap();
        dev.set_gain(GainStage::Mixer, -3.0).await.unwrap();
        dev.set_gain_by_name("VGA", 7.9).await.unwrap();
        dev.set_gain_by_name("IF", 7.0).await.unwrap();
        assert_eq!(dev.gain(GainStage::Lna), 15.0);
        assert_eq!(dev.gain(GainStage::Mixer), 0.0);
        assert_eq!(dev.gain_by_name("VGA"), 7.0);
        assert_eq!(dev.gain_by_name("IF"), 0.0);
        assert_eq!(
            probe.calls(),
            [
                Call::SetGain(GainStage::Lna, 15),
                Call::SetGain(GainStage::Mixer, 0),
                Call::SetGain(GainStage::Vga, 7),
            ]
        );
        assert_eq!(clamp_gain(f64::NAN), 0);
        assert_eq!(clamp_gain(200.0), 15);
        assert_eq!(clamp_gain(-5.0), 0);
        assert_eq!(clamp_gain(99.0), 15);
    }

    #[tokio::test]
    async fn gain_mode_drives_both_stages() {
        let (dev, probe) = device();
        dev.set_gain_mode(true).await.unwrap();
        assert!(dev.gain_mode());
        assert_eq!(
            probe.calls(),
            [
                Call::SetAgc(GainStage::Lna, true),
                Call::SetAgc(GainStage::Mixer, true),
            ]
        );
    }

    #[tokio::test]
    async fn gain_mode_rolls_back_on_mixer_failure() {
        let (dev, probe) = device();
        probe.fail(Op::SetAgc(GainStage::Mixer));
        assert!(dev.set_gain_mode(true).await.is_err());
        assert!(!dev.gain_mode());
        assert_eq!(
            probe.calls(),
            [
                Call::SetAgc(GainStage::Lna, true),
                Call::SetAgc(GainStage::Mixer, true),
                Call::SetAgc(GainStage::Lna, false),
            ]
        );
    }

    #[tokio::test]
    async fn sample_rate_is_only_staged() {
        let (dev, probe) = device();
        dev.set_sample_rate(3e6);
        assert!(!dev.rate_change_pending());
        assert!(!dev.reset_pending());

        dev.set_sample_rate(6e6);
        assert_eq!(dev.sample_rate(), 6e6);
        assert!(dev.rate_change_pending());
        assert!(dev.reset_pending());
        assert!(probe.calls().is_empty());

        let rates = dev.list_sample_rates().await.unwrap();
        assert_eq!(rates, [10e6, 6e6, 3e6, 2.5e6, 2e6]);
    }

    #[tokio::test]
    async fn settings() {
        let (dev, probe) = device();
        dev.write_setting("biastee", "true").await.unwrap();
        dev.write_setting("bitpack", "yes").await.unwrap();
        dev.write_setting("nonsense", "true").await.unwrap();
        assert_eq!(dev.read_setting("biastee"), "true");
        assert_eq!(dev.read_setting("bitpack"), "false");
        assert_eq!(dev.read_setting("nonsense"), "");
        assert_eq!(
            probe.calls(),
            [Call::SetRfBias(true), Call::SetPacking(false)]
        );
        // Not streaming, so no reset.
        dev.write_setting("bitpack", "true").await.unwrap();
        assert!(!dev.reset_pending());
    }

    #[tokio::test]
    async fn open_by_serial_applies_settings() {
        let (backend, probe) = MockBackend::new(&[0xaa, 0xbb]);
        let mut args = Kwargs::new();
        args.insert("serial".into(), "0xBB".into());
        args.insert("bitpack".into(), "true".into());
        args.insert("biastee".into(), "true".into());
        let dev = HydraSdr::open(&backend, &args).await.unwrap();
        assert_eq!(dev.serial(), 0xbb);
        assert_eq!(
            probe.calls(),
            [Call::SetRfBias(true), Call::SetPacking(true)]
        );
        drop(dev);
        assert_eq!(probe.closed(), 1);
    }

    #[tokio::test]
    async fn open_failures() {
        let (backend, _probe) = MockBackend::new(&[0xaa]);
        let backend = backend.with_busy(0xaa);
        let mut args = Kwargs::new();
        assert!(matches!(
            HydraSdr::open(&backend, &args).await,
            Err(Error::Busy(0xaa))
        ));
        args.insert("serial".into(), "cc".into());
        assert!(matches!(
            HydraSdr::open(&backend, &args).await,
            Err(Error::NotFound(0xcc))
        ));
        args.insert("serial".into(), "nope".into());
        assert!(matches!(
            HydraSdr::open(&backend, &args).await,
            Err(Error::InvalidSerial(_))
        ));

        let (empty, _probe) = MockBackend::new(&[]);
        assert!(matches!(
            HydraSdr::open(&empty, &Kwargs::new()).await,
            Err(Error::NoDevice)
        ));
    }
}
