use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use linux_embedded_hal::I2cdev;

use timonel::{config::Config, AddressRegistry, BusScanner, Connection, Flashing, HalTransport};

#[derive(Parser)]
#[command(
    name = "timonel",
    version,
    about = "Upload firmware over I2C to MCUs running the Timonel bootloader"
)]
struct Cli {
    /// YAML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// I2C device, overrides the settings file
    #[arg(short, long, global = true)]
    bus: Option<String>,
    /// More output, repeat for wire traffic
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every device on the bus
    Scan {
        /// Print the device list as YAML
        #[arg(long)]
        yaml: bool,
    },
    /// Report the lowest address that answers
    Find,
    /// Query a bootloader for its status
    Status {
        #[arg(value_parser = parse_address)]
        address: u8,
    },
    /// Write a firmware image through the bootloader
    Upload {
        #[arg(value_parser = parse_address)]
        address: u8,
        /// Intel HEX, plain hex or raw binary file
        path: PathBuf,
        #[arg(long)]
        page_size: Option<usize>,
        /// Two-step init, pausing this many milliseconds between the steps
        #[arg(long, value_name = "MS")]
        two_step_init: Option<u64>,
    },
}

/// Decimal or `0x` prefixed hex.
fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bus) = cli.bus {
        config.bus = bus;
    }

    let i2c = I2cdev::new(&config.bus).with_context(|| format!("opening {}", config.bus))?;
    let mut bus = HalTransport::new(i2c);
    let registry = AddressRegistry::new();

    match cli.command {
        Commands::Scan { yaml } => {
            let devices = BusScanner::new(&mut bus, registry, config.pins)?
                .with_settle(config.scan_settle())
                .scan()?;
            if yaml {
                print!("{}", serde_yaml::to_string(&devices)?);
            } else if devices.is_empty() {
                log::warn!("No devices found on {}", config.bus);
            } else {
                for device in &devices {
                    println!("{}", device);
                }
            }
        }
        Commands::Find => {
            let (address, mode) = BusScanner::new(&mut bus, registry, config.pins)?
                .with_settle(config.scan_settle())
                .find_first()?;
            println!("{} (0x{:02x}): {:?}", address, address, mode);
        }
        Commands::Status { address } => {
            let conn = Connection::open(&mut bus, &registry, address, config.pins)?;
            let mut flashing = Flashing::new(conn, config.page_size)?;
            flashing.init()?;
            flashing.query_status()?;
            flashing.dump_info();
        }
        Commands::Upload {
            address,
            path,
            page_size,
            two_step_init,
        } => {
            let image = timonel::format::read_firmware_from_file(&path)?;
            log::info!("Firmware size: {}", image.len());

            let conn = Connection::open(&mut bus, &registry, address, config.pins)?;
            let mut flashing = Flashing::new(conn, page_size.unwrap_or(config.page_size))?;
            let init_settle = two_step_init
                .map(std::time::Duration::from_millis)
                .or(config.init_settle());
            if let Some(settle) = init_settle {
                flashing = flashing.with_two_step_init(settle);
            }

            let bar = ProgressBar::new(image.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")?
                    .progress_chars("=> "),
            );
            bar.set_message(format!("Uploading to {}", address));
            let result = flashing.upload_with_progress(&image, |p| {
                bar.set_position(p.bytes_sent as u64);
            });
            match result {
                Ok(pages) => {
                    bar.finish();
                    log::info!("Done, {} pages written", pages);
                }
                Err(e) => {
                    bar.abandon();
                    return Err(e.into());
                }
            }
            flashing.dump_info();
            flashing.into_connection().close();
        }
    }

    Ok(())
}
