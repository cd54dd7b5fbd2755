use clap::Args;
use color_eyre::eyre::{Context, eyre};
use tracing::warn;
use waverave_hydrasdr::{Endpoint, FREQ_RANGE_HZ, GainStage, HydraSdr};

#[derive(Args, Debug)]
pub struct RadioParams {
    /// Center frequency in Hz. Valid range is 24MHz to 1800MHz.
    #[arg(short, long = "freq")]
    freq_hz: Option<f64>,

    /// Sample rate in Hz. Must be one the receiver lists in `info`.
    #[arg(short, long = "rate", default_value_t = 3e6)]
    sample_rate_hz: f64,

    /// LNA gain, 0-15
    #[arg(short, long = "lna")]
    lna_gain: Option<f64>,

    /// Mixer gain, 0-15
    #[arg(short, long = "mixer")]
    mixer_gain: Option<f64>,

    /// VGA gain, 0-15
    #[arg(short = 'g', long = "vga")]
    vga_gain: Option<f64>,

    /// Automatic gain control on the LNA and mixer
    #[arg(short, long)]
    agc: Option<bool>,
}

impl RadioParams {
    pub async fn configure<E: Endpoint>(&self, sdr: &HydraSdr<E>) -> color_eyre::Result<()> {
        let rates = sdr
            .list_sample_rates()
            .await
            .wrap_err("Failed listing sample rates")?;
        if !rates.contains(&self.sample_rate_hz.round()) {
            return Err(eyre!(
                "Sample rate {} Hz isn't supported, choose one of {:?}",
                self.sample_rate_hz,
                rates
            ));
        }
        sdr.set_sample_rate(self.sample_rate_hz);

        if let Some(freq_hz) = self.freq_hz {
            if !(*FREQ_RANGE_HZ.start() as f64..=*FREQ_RANGE_HZ.end() as f64).contains(&freq_hz) {
                warn!("Frequency {} Hz is outside the tuning range", freq_hz);
            }
            sdr.set_frequency(freq_hz)
                .await
                .wrap_err("Failed setting frequency")?;
        }

        if let Some(agc) = self.agc {
            sdr.set_gain_mode(agc)
                .await
                .wrap_err("Failed setting AGC")?;
        }

        let gains = [
            (GainStage::Lna, self.lna_gain),
            (GainStage::Mixer, self.mixer_gain),
            (GainStage::Vga, self.vga_gain),
        ];
        for (stage, gain) in gains {
            if let Some(gain) = gain {
                sdr.set_gain(stage, gain)
                    .await
                    .wrap_err_with(|| format!("Failed setting {stage} gain"))?;
            }
        }

        Ok(())
    }
}
