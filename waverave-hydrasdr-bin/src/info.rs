use clap::Args;
use color_eyre::eyre::Context;
use waverave_hydrasdr::Kwargs;
use waverave_hydrasdr::registry::{DRIVER, Driver};

/// Retrieve as much info as possible from each attached HydraSDR.
#[derive(Args, Debug)]
pub struct Cmd {}

impl Cmd {
    pub async fn cmd(&self, filter_serial: Option<String>) -> color_eyre::Result<()> {
        println!("Binary release {}", env!("CARGO_PKG_VERSION"));

        let mut args = Kwargs::new();
        if let Some(serial) = filter_serial.as_ref() {
            waverave_hydrasdr::parse_serial(serial).wrap_err("Bad serial number")?;
            args.insert("serial".to_string(), serial.clone());
        }

        let found = DRIVER.find(&args);
        for dev_args in found.iter() {
            let label = dev_args.get("label").map(String::as_str).unwrap_or("HydraSDR");
            let sdr = match DRIVER.make(dev_args).await {
                Ok(sdr) => sdr,
                Err(e) => {
                    println!("Couldn't open {label}: {e}");
                    continue;
                }
            };

            println!();
            println!("Found {label}");

            let info = sdr.endpoint().info();
            match info.board_id().await {
                Ok(id) => println!("Board ID: {id}"),
                Err(_) => println!("Board ID: ❌ Failed to retrieve"),
            }
            match info.version_string().await {
                Ok(v) => println!("Firmware Version: {v}"),
                Err(_) => println!("Firmware Version: ❌ Failed to retrieve"),
            }
            match info.part_serial().await {
                Ok(ps) => {
                    println!(
                        "Part ID Number: 0x{:08x} 0x{:08x}",
                        ps.part_id[0], ps.part_id[1]
                    );
                    println!("Serial Number: 0x{:016x}", ps.serial());
                }
                Err(_) => println!("Part ID Number: ❌ Failed to retrieve"),
            }
            match sdr.list_sample_rates().await {
                Ok(rates) => {
                    let rates: Vec<String> =
                        rates.iter().map(|r| format!("{:.3} MSPS", r / 1e6)).collect();
                    println!("Sample Rates: {}", rates.join(", "));
                }
                Err(_) => println!("Sample Rates: ❌ Failed to retrieve"),
            }
            for name in sdr.list_frequencies() {
                for range in sdr.frequency_range(name) {
                    println!(
                        "Frequency {name}: {} - {} MHz",
                        range.start() / 1e6,
                        range.end() / 1e6
                    );
                }
            }
            for name in sdr.list_gains() {
                let range = sdr.gain_range(name);
                println!("Gain {name}: {} - {}", range.start(), range.end());
            }
            for setting in sdr.setting_info() {
                println!(
                    "Setting {} = {}: {}",
                    setting.key,
                    sdr.read_setting(setting.key),
                    setting.description
                );
            }
        }

        if found.is_empty() {
            if let Some(serial) = filter_serial {
                println!("Unable to locate HydraSDR with serial number {serial}");
            } else {
                println!("Couldn't find any HydraSDR devices");
            }
        }
        Ok(())
    }
}
