use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::{Section, eyre::Context};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, error, warn};
use waverave_hydrasdr::{Endpoint, Error, HydraSdr, Receive, StreamArgs};

/// Samples pulled from the stream per read.
const READ_CHUNK: usize = 65536;

#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    params: crate::config::RadioParams,

    /// Number of USB transfers to keep in flight.
    #[arg(short = 'B', long, default_value_t = waverave_hydrasdr::DEFAULT_NUM_BUFFERS)]
    buffers: usize,

    /// Number of samples to transfer (default is unlimited).
    #[arg(short = 'n', long = "samples")]
    num_samples: Option<u64>,

    /// Frequency in Hz to hop to while receiving. Repeat to cycle through
    /// several.
    #[arg(long = "hop")]
    hop_hz: Vec<f64>,

    /// Time spent on each hop frequency, in milliseconds.
    #[arg(long = "dwell", default_value_t = 1000)]
    dwell_ms: u64,

    /// Record data to a file. Omit for stdout.
    #[arg(default_value_t)]
    filename: String,
}

impl Cmd {
    pub async fn cmd<E: Endpoint>(&self, sdr: Arc<HydraSdr<E>>) -> color_eyre::Result<()> {
        // Configure
        self.params
            .configure(&sdr)
            .await
            .wrap_err("Failed configuring the HydraSDR")?;

        let rx = sdr
            .clone()
            .start_rx(StreamArgs {
                buffers: self.buffers,
            })
            .await
            .wrap_err("Failed starting the receiver")?;

        // Set up a task manager
        let mut tracker = tokio::task::JoinSet::new();

        // Run the receiver in a separate task
        let (buf_tx, buf_rx) = mpsc::channel::<Vec<u16>>(20);
        tracker.spawn(run_rf(rx, buf_tx));

        // Run the file writer in a separate task
        tracker.spawn(write_file(buf_rx, self.filename.clone(), self.num_samples));

        // Retune while the stream keeps running
        if !self.hop_hz.is_empty() {
            tracker.spawn(hop(
                sdr.clone(),
                self.hop_hz.clone(),
                Duration::from_millis(self.dwell_ms),
            ));
        }

        // Turn a quit into a stop request, so the stream winds down cleanly
        let quit = crate::os_signal::quit_watch().await;
        quit.quit().await;
        sdr.request_stop();
        let results =
            tokio::time::timeout(tokio::time::Duration::from_secs(1), tracker.join_all()).await?;

        // Check for errors and compile them together if needed
        let err_count = results.iter().fold(0, |cnt, res| res.is_err() as u32 + cnt);
        if err_count == 0 {
            return Ok(());
        }
        if err_count == 1 {
            for r in results {
                r?;
            }
            return Ok(());
        }

        let err = results
            .into_iter()
            .filter_map(Result::err)
            .fold(
                color_eyre::eyre::eyre!("encountered multiple errors"),
                |report, e| report.section(e),
            );
        Err(err)
    }
}

async fn run_rf<E: Endpoint>(
    mut rx: Receive<E>,
    buf_tx: mpsc::Sender<Vec<u16>>,
) -> color_eyre::Result<()> {
    let quit = crate::os_signal::quit_watch().await;
    let result = stream(&mut rx, &buf_tx).await;
    // However the stream ended, everything else should wind down too.
    quit.cancel();
    let stopped = rx.stop().await.wrap_err("Failed stopping the receiver");
    result.and(stopped)
}

async fn stream<E: Endpoint>(
    rx: &mut Receive<E>,
    buf_tx: &mpsc::Sender<Vec<u16>>,
) -> color_eyre::Result<()> {
    let mut buf = vec![0u16; READ_CHUNK];
    loop {
        let n = match rx.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(Error::Transfer(e)) => {
                warn!("RF receive error: {}", e);
                continue;
            }
            Err(e) => return Err(e).wrap_err("Receive stream failed"),
        };
        match buf_tx.try_send(buf[..n].to_vec()) {
            Ok(()) => (),
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("RF to File buffer overflow");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
        }
    }
}

async fn hop<E: Endpoint>(
    sdr: Arc<HydraSdr<E>>,
    freqs: Vec<f64>,
    dwell: Duration,
) -> color_eyre::Result<()> {
    let quit = crate::os_signal::quit_watch().await;
    let hopping = async {
        for freq in freqs.iter().cycle() {
            tokio::time::sleep(dwell).await;
            sdr.set_frequency(*freq)
                .await
                .wrap_err_with(|| format!("Failed hopping to {freq} Hz"))?;
            debug!("Hopped to {} Hz", freq);
        }
        Ok::<(), color_eyre::Report>(())
    };
    quit.run_until_cancelled(hopping).await.unwrap_or(Ok(()))
}

async fn write_file(
    buf_rx: mpsc::Receiver<Vec<u16>>,
    filename: String,
    max_samples: Option<u64>,
) -> color_eyre::Result<()> {
    if filename.is_empty() {
        write_samples(buf_rx, tokio::io::stdout(), max_samples).await
    } else {
        let writer = tokio::fs::File::create(&filename)
            .await
            .wrap_err_with(|| format!("Couldn't create {filename}"))?;
        write_samples(buf_rx, tokio::io::BufWriter::new(writer), max_samples).await
    }
}

/// Write samples out as little-endian 16-bit words until the stream ends,
/// we're told to quit, or `max_samples` have been written.
async fn write_samples<W: AsyncWrite + Unpin>(
    mut buf_rx: mpsc::Receiver<Vec<u16>>,
    mut writer: W,
    max_samples: Option<u64>,
) -> color_eyre::Result<()> {
    let quit = crate::os_signal::quit_watch().await;
    let mut sample_count = 0;
    let mut bytes = Vec::new();
    if let Some(result) = quit
        .run_until_cancelled(async {
            while let Some(mut samples) = buf_rx.recv().await {
                if let Some(max) = max_samples {
                    let left = max.saturating_sub(sample_count);
                    samples.truncate(left.min(samples.len() as u64) as usize);
                }
                bytes.clear();
                bytes.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
                writer.write_all(&bytes).await?;
                sample_count += samples.len() as u64;
                if max_samples.is_some_and(|max| sample_count >= max) {
                    quit.cancel();
                    break;
                }
            }
            Ok::<(), std::io::Error>(())
        })
        .await
    {
        result?;
    }

    writer.flush().await?;
    Ok(())
}
