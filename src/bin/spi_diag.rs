//! PAT9130 SPI diagnostics
//!
//! Raw register access for bring-up: check the product ID, peek and poke
//! registers, or watch the motion status bit.
//!
//! Usage:
//!   spi-diag id
//!   spi-diag read 0x02
//!   spi-diag write 0x06 0x80

use clap::{Parser, Subcommand};
use pat9130_sensor_interface::{
    parse_seconds, DriverConfig, Pat9130, SpiConfig, SpiMode, PRODUCT_ID,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "spi-diag")]
#[command(about = "PAT9130 register diagnostics", long_about = None)]
struct Args {
    /// SPI character device
    #[arg(long, default_value = "/dev/spidev0.0")]
    device: PathBuf,

    /// SPI clock in Hz
    #[arg(long, default_value = "200000")]
    clock: u32,

    /// SPI mode (0-3)
    #[arg(long, default_value = "3")]
    mode: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the product ID register once
    Id,
    /// Read one register
    Read {
        #[arg(value_parser = parse_number)]
        address: i32,
    },
    /// Write one register
    Write {
        #[arg(value_parser = parse_number)]
        address: i32,
        #[arg(value_parser = parse_number)]
        value: i32,
    },
    /// Run the handshake, then poll the motion-ready bit
    Watch {
        /// Number of polls
        #[arg(short, long, default_value = "100")]
        count: u32,
        /// Handshake timeout in seconds
        #[arg(long, default_value = "5", value_parser = parse_seconds)]
        init_timeout: Duration,
    },
}

/// Accept decimal, `0x` hex or `0b` binary, with an optional minus sign
fn parse_number(s: &str) -> Result<i32, String> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i32::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i32::from_str_radix(bin, 2)
    } else {
        digits.parse()
    };
    parsed
        .map(|n| if negative { -n } else { n })
        .map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    let args = Args::parse();

    let Some(mode) = SpiMode::from_number(args.mode) else {
        eprintln!("Error: SPI mode must be 0-3");
        std::process::exit(1);
    };
    let spi = SpiConfig {
        device: args.device,
        clock_hz: args.clock,
        mode,
    };

    let mut sensor = Pat9130::open(&spi, DriverConfig::default())?;

    match args.command {
        Command::Id => {
            let id = sensor.read_register(0x00)?;
            let verdict = if id == PRODUCT_ID { "OK" } else { "MISMATCH" };
            println!("Product ID: 0x{:02X} (expected 0x{:02X}) {}", id, PRODUCT_ID, verdict);
        }
        Command::Read { address } => {
            let value = sensor.read_register(address)?;
            println!("[0x{:02X}] = 0x{:02X} ({:#010b})", address, value, value);
        }
        Command::Write { address, value } => {
            sensor.write_register(address, value)?;
            println!("[0x{:02X}] <- 0x{:02X}", address, value);
        }
        Command::Watch { count, init_timeout } => {
            sensor.initialize(init_timeout)?;
            let interval = sensor.config().poll_interval;
            let mut ready = 0u32;
            for _ in 0..count {
                if sensor.is_motion_ready()? {
                    ready += 1;
                    let sample = sensor.read_sample(Duration::ZERO)?;
                    println!("motion: dx={:6} dy={:6}", sample.x, sample.y);
                }
                std::thread::sleep(interval);
            }
            println!("{} of {} polls had motion ready", ready, count);
        }
    }

    Ok(())
}
