//! Linux SPI interface library for the PAT9130 optical displacement sensor
//!
//! The sensor reports relative X/Y motion in raw counts through a small
//! register map. This crate covers the register protocol, the identity
//! handshake, motion polling with bounded timeouts, per-axis calibration
//! against a known move, and continuous capture with an optional CSV log.
//!
//! # Quick Start
//!
//! ## Dashboard-style polling
//! ```no_run
//! use pat9130_sensor_interface::{DriverConfig, Pat9130, SpiConfig};
//! use std::time::Duration;
//!
//! let mut sensor = Pat9130::open(&SpiConfig::default(), DriverConfig::default())?;
//! sensor.initialize(Duration::from_secs(10))?;
//!
//! let sample = sensor.read_sample(Duration::from_millis(200))?;
//! println!("dx={} dy={} counts", sample.x, sample.y);
//! # Ok::<(), pat9130_sensor_interface::Pat9130Error>(())
//! ```
//!
//! ## Telling "no motion" apart from a dead link
//! ```no_run
//! use pat9130_sensor_interface::{DriverConfig, MotionReading, Pat9130, SpiConfig};
//! use std::time::Duration;
//!
//! let mut sensor = Pat9130::open(&SpiConfig::default(), DriverConfig::default())?;
//! sensor.initialize(Duration::from_secs(10))?;
//!
//! match sensor.poll_motion(Duration::from_millis(200)) {
//!     Ok(MotionReading::Moved(sample)) => println!("moved {:?}", sample),
//!     Ok(MotionReading::Idle) => println!("still"),
//!     Err(e) => eprintln!("sensor lost: {}", e),
//! }
//! # Ok::<(), pat9130_sensor_interface::Pat9130Error>(())
//! ```
//!
//! ## Calibrate, then capture until Ctrl+C
//! ```no_run
//! use pat9130_sensor_interface::{
//!     CalibrationRoutine, CancelToken, CaptureConfig, ContinuousCapture, CsvSink,
//!     DriverConfig, LengthUnit, Pat9130, SpiConfig,
//! };
//! use std::time::Duration;
//!
//! let mut sensor = Pat9130::open(&SpiConfig::default(), DriverConfig::default())?;
//! sensor.initialize(Duration::from_secs(10))?;
//!
//! // 15 mm reference move on each axis
//! let factors = CalibrationRoutine::new(15_000.0).calibrate(&mut sensor, |axis, um| {
//!     println!("Move the sensor {} mm along {} and press Enter", um / 1000.0, axis);
//!     std::io::stdin().read_line(&mut String::new()).is_ok()
//! })?;
//!
//! let cancel = CancelToken::new();
//! let sink = CsvSink::timestamped("LecturasCSV/PAT9130", factors, LengthUnit::Millimeters);
//! let mut capture = ContinuousCapture::new(CaptureConfig::new(factors).with_sink(sink));
//! let summary = capture.run(&mut sensor, &cancel)?;
//! println!("Total X={:.3} Y={:.3}", summary.total_x, summary.total_y);
//! # Ok::<(), pat9130_sensor_interface::Pat9130Error>(())
//! ```

pub mod bus;
pub mod calibration;
pub mod capture;
pub mod common;
pub mod csv_sink;
pub mod error;
pub mod pat9130;
#[cfg(feature = "hardware")]
pub mod spi;

#[cfg(test)]
mod testing;

// Re-export public API
pub use bus::{RegisterAddress, RegisterBus, RegisterValue, Transport};
pub use calibration::{factor_from_raw, Axis, AxisCalibration, CalibrationRoutine, ScaleFactors};
pub use capture::{
    CancelToken, CaptureConfig, CaptureSummary, ContinuousCapture, DisplacementSample,
    StreamControl,
};
pub use common::{create_bar, parse_seconds, progress_line, total_distance, RateMeter};
pub use csv_sink::{CsvSink, LengthUnit};
pub use error::{Pat9130Error, Result};
pub use pat9130::{
    assemble_axis, sign_extend, DriverConfig, DriverState, MotionReading, Pat9130, RawSample,
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, PRODUCT_ID,
};
#[cfg(feature = "hardware")]
pub use spi::{SpiConfig, SpiMode, SpidevTransport};
