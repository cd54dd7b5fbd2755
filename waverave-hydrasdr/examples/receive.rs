use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use waverave_hydrasdr::{GainStage, StreamArgs};
#[tokio::main]
async fn main() -> Result<()> {
    // Open up a file for buffered writing.
    let mut args = std::env::args();
    args.next();
    let file_name = args.next().unwrap_or_else(|| String::from("./rx.bin"));
    let mut file = tokio::fs::File::create(&file_name).await?;

    // Open up the HydraSDR
    let sdr = Arc::new(waverave_hydrasdr::open_hydrasdr()?);

    // Configure: 10MHz sample rate, packed samples over USB, mid-range gains,
    // and tune to 915 MHz.
    sdr.set_sample_rate(10e6);
    sdr.write_setting("bitpack", "true").await?;
    sdr.set_gain(GainStage::Lna, 10.0).await?;
    sdr.set_gain(GainStage::Mixer, 8.0).await?;
    sdr.set_gain(GainStage::Vga, 8.0).await?;
    sdr.set_frequency(915e6).await?;

    // A ctrl-c asks the stream to stop; the next read then comes back empty.
    let ctrlc = sdr.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc.request_stop();
        }
    });

    let mut rx = sdr.clone().start_rx(StreamArgs { buffers: 16 }).await?;

    // Separate the file writer from the sample reader with a separate task
    let (data_send, mut data_recv) = tokio::sync::mpsc::unbounded_channel::<Vec<u16>>();
    let file_writer = tokio::spawn(async move {
        while let Some(samples) = data_recv.recv().await {
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            file.write_all(&bytes).await?;
        }
        file.flush().await?;
        Ok::<(), anyhow::Error>(())
    });

    let mut buf = vec![0u16; 65536];
    loop {
        let n = rx.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if data_send.send(buf[..n].to_vec()).is_err() {
            break;
        }
    }

    // Stop receiving
    rx.stop().await?;
    drop(data_send);

    // Wait for file writer task to close up shop
    file_writer.await??;

    Ok(())
}
