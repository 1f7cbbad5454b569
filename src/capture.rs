//! Continuous displacement capture
//!
//! Reads samples until cancelled, scales them, keeps running totals and
//! optionally writes the whole run to a CSV log when it stops.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{error, info};

use crate::bus::Transport;
use crate::calibration::ScaleFactors;
use crate::csv_sink::{CsvSink, LengthUnit};
use crate::error::Result;
use crate::pat9130::{MotionReading, Pat9130, RawSample, DEFAULT_TIMEOUT};

/// Control flow for capture observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Continue capturing
    Continue,
    /// Stop capturing
    Break,
}

/// Cooperative stop flag, cheap to clone and share with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One scaled reading. All lengths are in micrometres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementSample {
    pub timestamp: DateTime<Local>,
    pub delta_x: f64,
    pub delta_y: f64,
    pub cumulative_x: f64,
    pub cumulative_y: f64,
}

/// Capture settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Micrometres per raw count
    pub factors: ScaleFactors,
    /// Bound on each motion wait; a timeout records zero displacement
    pub read_timeout: Duration,
    /// Unit of the returned totals
    pub unit: LengthUnit,
    /// Where to save the run, if anywhere
    pub sink: Option<CsvSink>,
}

impl CaptureConfig {
    pub fn new(factors: ScaleFactors) -> Self {
        Self {
            factors,
            read_timeout: DEFAULT_TIMEOUT,
            unit: LengthUnit::default(),
            sink: None,
        }
    }

    /// Persist the run on stop; totals are reported in the sink's unit
    pub fn with_sink(mut self, sink: CsvSink) -> Self {
        self.unit = sink.unit();
        self.sink = Some(sink);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSummary {
    /// Running totals in `unit`
    pub total_x: f64,
    pub total_y: f64,
    pub unit: LengthUnit,
    /// Samples recorded in this run
    pub samples: usize,
    /// Log file, when one was written
    pub saved_to: Option<PathBuf>,
}

/// Accumulating capture session.
///
/// Running totals survive across runs until [`reset`](Self::reset) is
/// called; the per-run record list is dropped after each run.
pub struct ContinuousCapture {
    config: CaptureConfig,
    cumulative_x: f64,
    cumulative_y: f64,
}

impl ContinuousCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            cumulative_x: 0.0,
            cumulative_y: 0.0,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Running totals in micrometres
    pub fn totals_um(&self) -> (f64, f64) {
        (self.cumulative_x, self.cumulative_y)
    }

    /// Zero the running totals
    pub fn reset(&mut self) {
        self.cumulative_x = 0.0;
        self.cumulative_y = 0.0;
    }

    /// Capture until `cancel` fires
    pub fn run<T: Transport>(
        &mut self,
        sensor: &mut Pat9130<T>,
        cancel: &CancelToken,
    ) -> Result<CaptureSummary> {
        self.run_with(sensor, cancel, |_| StreamControl::Continue)
    }

    /// Capture until `cancel` fires or `observer` returns `Break`.
    ///
    /// The cancel flag is checked before every status poll, so a still
    /// sensor does not hold the run for the whole read timeout. A sample
    /// read before cancellation is always recorded exactly once.
    /// When a read fails, the samples recorded so far are still saved and
    /// the error is returned afterwards.
    pub fn run_with<T, F>(
        &mut self,
        sensor: &mut Pat9130<T>,
        cancel: &CancelToken,
        mut observer: F,
    ) -> Result<CaptureSummary>
    where
        T: Transport,
        F: FnMut(&DisplacementSample) -> StreamControl,
    {
        let mut records = Vec::new();
        info!(target: "pat9130::capture", "Starting calibrated continuous reading");

        let outcome = self.capture_loop(sensor, cancel, &mut records, &mut observer);

        let saved_to = match &self.config.sink {
            Some(sink) => match sink.write(&records) {
                Ok(()) => Some(sink.path().to_path_buf()),
                Err(e) if outcome.is_ok() => return Err(e),
                Err(e) => {
                    error!(target: "pat9130::capture", "{}", e);
                    None
                }
            },
            None => None,
        };
        outcome?;

        let unit = self.config.unit;
        let summary = CaptureSummary {
            total_x: unit.from_micrometers(self.cumulative_x),
            total_y: unit.from_micrometers(self.cumulative_y),
            unit,
            samples: records.len(),
            saved_to,
        };
        info!(
            target: "pat9130::capture",
            "Continuous reading stopped after {} samples: X={:.3}{u}, Y={:.3}{u}",
            summary.samples,
            summary.total_x,
            summary.total_y,
            u = unit.symbol()
        );
        Ok(summary)
    }

    fn capture_loop<T, F>(
        &mut self,
        sensor: &mut Pat9130<T>,
        cancel: &CancelToken,
        records: &mut Vec<DisplacementSample>,
        observer: &mut F,
    ) -> Result<()>
    where
        T: Transport,
        F: FnMut(&DisplacementSample) -> StreamControl,
    {
        let timeout = self.config.read_timeout;

        // Drop motion accumulated before the run started
        sensor.poll_motion_until(timeout, cancel)?;

        while !cancel.is_cancelled() {
            let raw = match sensor.poll_motion_until(timeout, cancel)? {
                MotionReading::Moved(raw) => raw,
                MotionReading::Idle if cancel.is_cancelled() => break,
                MotionReading::Idle => RawSample::ZERO,
            };
            let (delta_x, delta_y) = self.config.factors.apply(raw);
            self.cumulative_x += delta_x;
            self.cumulative_y += delta_y;

            let sample = DisplacementSample {
                timestamp: Local::now(),
                delta_x,
                delta_y,
                cumulative_x: self.cumulative_x,
                cumulative_y: self.cumulative_y,
            };
            records.push(sample);

            if observer(&sample) == StreamControl::Break {
                break;
            }
        }
        Ok(())
    }
}
