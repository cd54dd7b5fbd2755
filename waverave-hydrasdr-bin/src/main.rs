mod config;
mod info;
mod os_signal;
mod rx;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Context;
use tracing_subscriber::EnvFilter;
use waverave_hydrasdr::Kwargs;
use waverave_hydrasdr::registry::{DRIVER, Driver};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Open one specific HydraSDR, chosen by serial number (hex)
    #[arg(short = 'd', long)]
    serial: Option<String>,
    /// Device setting to apply at open, as `key=value`. Can be repeated.
    /// Known keys are `biastee` and `bitpack`.
    #[arg(short = 's', long = "setting", value_parser = parse_key_val)]
    settings: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Info(info::Cmd),
    Rx(rx::Cmd),
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Cli::parse();

    if let Commands::Info(c) = args.command {
        return c.cmd(args.serial).await;
    }

    let mut kwargs = Kwargs::new();
    if let Some(serial) = args.serial {
        kwargs.insert("serial".to_string(), serial);
    }
    kwargs.extend(args.settings);
    let sdr = DRIVER
        .make(&kwargs)
        .await
        .wrap_err("Failed to open HydraSDR")?;

    match args.command {
        Commands::Info(_) => unreachable!("Should've executed the Info command earlier"),
        Commands::Rx(c) => c.cmd(Arc::new(sdr)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val() {
        assert_eq!(
            parse_key_val("bitpack=true").unwrap(),
            ("bitpack".to_string(), "true".to_string())
        );
        assert_eq!(
            parse_key_val(" biastee = false").unwrap(),
            ("biastee".to_string(), "false".to_string())
        );
        assert!(parse_key_val("bitpack").is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from([
            "waverave-hydrasdr",
            "-d",
            "a1b2",
            "-s",
            "bitpack=true",
            "rx",
            "-f",
            "100e6",
            "--hop",
            "101e6",
            "--hop",
            "102e6",
        ])
        .unwrap();
        assert_eq!(cli.serial.as_deref(), Some("a1b2"));
        assert_eq!(cli.settings.len(), 1);
        assert!(matches!(cli.command, Commands::Rx(_)));
    }
}
