//! PAT9130 Data Collector
//!
//! Calibrates both axes against a known move, then captures displacement
//! until Ctrl+C and writes each run to a CSV file.
//!
//! Usage:
//!   collector --known-distance-um 15000 --output-dir LecturasCSV/PAT9130

use clap::Parser;
use pat9130_sensor_interface::{
    parse_seconds, progress_line, Axis, CalibrationRoutine, CancelToken, CaptureConfig,
    ContinuousCapture, CsvSink, DriverConfig, LengthUnit, Pat9130, ScaleFactors, SpiConfig,
    SpiMode, StreamControl,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Calibrate the PAT9130 and capture displacement to CSV", long_about = None)]
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

    /// Reference move used for calibration, in micrometres
    #[arg(short, long, default_value = "15000")]
    known_distance_um: f64,

    /// Use --factor-x/--factor-y instead of calibrating
    #[arg(long)]
    skip_calibration: bool,

    /// X scale factor in micrometres per count (with --skip-calibration)
    #[arg(long, default_value = "1.0")]
    factor_x: f64,

    /// Y scale factor in micrometres per count (with --skip-calibration)
    #[arg(long, default_value = "1.0")]
    factor_y: f64,

    /// Directory for the CSV logs
    #[arg(short, long, default_value = "LecturasCSV/PAT9130")]
    output_dir: PathBuf,

    /// Do not write CSV logs
    #[arg(long)]
    no_save: bool,

    /// Unit of the logged values
    #[arg(short, long, value_enum, default_value = "mm")]
    unit: LengthUnit,

    /// Number of capture runs; each run ends with Ctrl+C
    #[arg(short = 'n', long, default_value = "1")]
    iterations: u32,

    /// Per-read motion timeout in seconds
    #[arg(short, long, default_value = "600", value_parser = parse_seconds)]
    timeout: Duration,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(mode) = SpiMode::from_number(args.mode) else {
        eprintln!("Error: SPI mode must be 0-3");
        std::process::exit(1);
    };
    if args.known_distance_um <= 0.0 {
        eprintln!("Error: known distance must be positive");
        std::process::exit(1);
    }

    let spi = SpiConfig {
        device: args.device.clone(),
        clock_hz: args.clock,
        mode,
    };
    let read_timeout = args.timeout;

    println!("PAT9130 Data Collector");
    println!("======================");
    println!("Device: {} ({} Hz, {:?})", spi.device.display(), spi.clock_hz, spi.mode);
    if args.no_save {
        println!("Output: disabled");
    } else {
        println!("Output directory: {}", args.output_dir.display());
    }
    println!();

    println!("Initializing sensor...");
    let mut sensor = Pat9130::open(&spi, DriverConfig::default())?;
    sensor.initialize(read_timeout)?;
    println!("Sensor initialized!\n");

    let factors = if args.skip_calibration {
        ScaleFactors::new(args.factor_x, args.factor_y)
    } else {
        let routine = CalibrationRoutine::new(args.known_distance_um).with_read_timeout(read_timeout);
        routine.calibrate(&mut sensor, confirm_on_enter)?
    };
    println!("Scale factors: X={:.6} um/count, Y={:.6} um/count\n", factors.x, factors.y);

    // Ctrl+C stops the active run, or the next one if pressed in between
    let mut cancel = CancelToken::new();
    let current = Arc::new(Mutex::new(cancel.clone()));
    let handler_slot = current.clone();
    ctrlc::set_handler(move || {
        if let Ok(token) = handler_slot.lock() {
            token.cancel();
        }
    })?;

    for i in 0..args.iterations {
        println!("Iteration: {}", i);

        let mut config = CaptureConfig::new(factors)
            .with_read_timeout(read_timeout)
            .with_unit(args.unit);
        if !args.no_save {
            config = config.with_sink(CsvSink::timestamped(&args.output_dir, factors, args.unit));
        }

        println!("Capturing... press Ctrl+C to stop");
        let unit = args.unit;
        let mut capture = ContinuousCapture::new(config);
        let result = capture.run_with(&mut sensor, &cancel, |s| {
            print!("\r{}  ", progress_line(s, unit));
            let _ = io::stdout().flush();
            StreamControl::Continue
        });
        cancel = rearm(&current)?;
        println!();

        match result {
            Ok(summary) => {
                println!(
                    "Total displacement -> X: {:.3}{u}, Y: {:.3}{u} ({} samples)",
                    summary.total_x,
                    summary.total_y,
                    summary.samples,
                    u = unit.symbol()
                );
                if let Some(path) = summary.saved_to {
                    println!("File: {}", path.display());
                }
            }
            Err(e) if e.is_fatal() => {
                eprintln!("Error during capture: {}", e);
                if !args.no_save {
                    eprintln!("Samples read before the fault were saved.");
                }
                return Err(Box::new(e));
            }
            Err(e) => return Err(Box::new(e)),
        }
        println!();
    }

    Ok(())
}

/// Install a fresh token for the next run and return it
fn rearm(slot: &Mutex<CancelToken>) -> Result<CancelToken, &'static str> {
    let next = CancelToken::new();
    *slot.lock().map_err(|_| "cancel slot poisoned")? = next.clone();
    Ok(next)
}

/// Prompt on the console and wait for Enter; EOF aborts
fn confirm_on_enter(axis: Axis, known_distance_um: f64) -> bool {
    print!(
        "Ready to calibrate {}. Move the sensor {}mm and press Enter.",
        axis,
        known_distance_um / 1000.0
    );
    let _ = io::stdout().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => {
            println!();
            false
        }
        Ok(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearm_routes_interrupt_to_next_run() {
        let first = CancelToken::new();
        let slot = Mutex::new(first.clone());
        first.cancel();

        let next = rearm(&slot).unwrap();
        assert!(!next.is_cancelled());

        // what the Ctrl+C handler does between runs
        slot.lock().unwrap().cancel();
        assert!(next.is_cancelled());
    }
}
