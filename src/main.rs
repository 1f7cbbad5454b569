//! PAT9130 sensor reader - live displacement dashboard
//!
//! Initializes the sensor, then repeatedly takes a bounded single-sample
//! read, converts counts to millimetres and shows running totals in the
//! console.

use clap::Parser;
use pat9130_sensor_interface::{
    create_bar, parse_seconds, total_distance, CancelToken, DriverConfig, MotionReading, Pat9130,
    Pat9130Error, RateMeter, SpiConfig, SpiMode,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pat9130-reader")]
#[command(about = "Live PAT9130 displacement readout", long_about = None)]
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

    /// Micrometres per raw count
    #[arg(short, long, default_value = "6.46")]
    factor: f64,

    /// Per-read motion timeout in seconds
    #[arg(short, long, default_value = "0.2", value_parser = parse_seconds)]
    timeout: Duration,

    /// Handshake timeout in seconds
    #[arg(long, default_value = "10", value_parser = parse_seconds)]
    init_timeout: Duration,

    /// Full scale of the bar graphs in millimetres
    #[arg(long, default_value = "1.0")]
    scale: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let Some(mode) = SpiMode::from_number(args.mode) else {
        eprintln!("Error: SPI mode must be 0-3");
        std::process::exit(1);
    };
    let spi = SpiConfig {
        device: args.device.clone(),
        clock_hz: args.clock,
        mode,
    };
    let read_timeout = args.timeout;
    let init_timeout = args.init_timeout;

    println!("PAT9130 Sensor Reader");
    println!("=====================");
    println!("Opening {}...", spi.device.display());

    let mut sensor = Pat9130::open(&spi, DriverConfig::default())?;
    match sensor.initialize(init_timeout) {
        Ok(()) => {
            println!("Sensor initialized successfully!");
            println!("Press Ctrl+C to exit\n");
        }
        Err(e @ Pat9130Error::HandshakeTimeout { last_id, .. }) => {
            eprintln!("Error: PAT9130 did not identify itself (product ID 0x{:02X})", last_id);
            eprintln!("Please check:");
            eprintln!("  1. SPI is enabled and {} exists", spi.device.display());
            eprintln!("  2. MOSI/MISO/SCLK/CS wiring and 3.3V supply");
            eprintln!("  3. SPI mode matches the sensor (mode 3)");
            return Err(Box::new(e));
        }
        Err(e) => {
            eprintln!("Error initializing sensor: {}", e);
            return Err(Box::new(e));
        }
    }

    let cancel = CancelToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || c.cancel())?;

    // Discard motion accumulated before start
    sensor.poll_motion_until(read_timeout, &cancel)?;

    let mut meter = RateMeter::new();
    let (mut x_mm, mut y_mm) = (0.0f64, 0.0f64);

    print!("\x1B[2J\x1B[H");
    io::stdout().flush()?;

    while !cancel.is_cancelled() {
        let reading = sensor
            .poll_motion_until(read_timeout, &cancel)
            .map(MotionReading::unwrap_or_zero);
        match reading {
            Ok(raw) => {
                let dx_mm = f64::from(raw.x) * args.factor / 1000.0;
                let dy_mm = f64::from(raw.y) * args.factor / 1000.0;
                x_mm += dx_mm;
                y_mm += dy_mm;
                meter.tick();

                print!("\x1B[H");
                println!("PAT9130 Sensor Reader - Live Data                              ");
                println!("=================================                              ");
                println!(
                    "Time: {:.2}s | Samples: {} | Rate: {:.1} Hz                    ",
                    meter.elapsed_secs(),
                    meter.samples(),
                    meter.rate_hz()
                );
                println!();
                println!("DELTA (mm)");
                println!("  X: {:8.3}  [{}]", dx_mm, create_bar(dx_mm, args.scale, 40));
                println!("  Y: {:8.3}  [{}]", dy_mm, create_bar(dy_mm, args.scale, 40));
                println!();
                println!("ACCUMULATED (mm)");
                println!("  X: {:8.3}", x_mm);
                println!("  Y: {:8.3}", y_mm);
                println!(
                    "  Total: {:8.3}                                               ",
                    total_distance(x_mm, y_mm)
                );
                println!();
                println!("Press Ctrl+C to exit                                           ");
                io::stdout().flush()?;
            }
            Err(e) if e.is_fatal() => {
                eprintln!("\nError reading sensor: {}", e);
                eprintln!("Re-initializing...");
                thread::sleep(Duration::from_millis(500));
                if let Err(e) = sensor.initialize(init_timeout) {
                    eprintln!("Re-initialization failed: {}", e);
                }
            }
            Err(e) => return Err(Box::new(e)),
        }
    }

    println!(
        "\nFinal displacement: X={:.3}mm Y={:.3}mm Total={:.3}mm",
        x_mm,
        y_mm,
        total_distance(x_mm, y_mm)
    );
    Ok(())
}
