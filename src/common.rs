//! Console helpers shared by the reader and collector programs

use std::time::{Duration, Instant};

use crate::capture::DisplacementSample;
use crate::csv_sink::{LengthUnit, TIMESTAMP_FORMAT};

/// Counts samples and reports the achieved read rate
pub struct RateMeter {
    start: Instant,
    samples: u64,
}

impl RateMeter {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            samples: 0,
        }
    }

    pub fn tick(&mut self) {
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Seconds since creation
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Samples per second so far; zero before any time has passed
    pub fn rate_hz(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            self.samples as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Planar displacement magnitude, `sqrt(x² + y²)`
pub fn total_distance(x: f64, y: f64) -> f64 {
    x.hypot(y)
}

/// Parse a command-line duration given in seconds
///
/// Rejects negative, NaN and out-of-range values instead of panicking.
pub fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid number of seconds '{}': {}", s, e))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{}' is not a valid duration in seconds", s))
}

/// Centered horizontal bar for a signed value
///
/// `width` cells are split evenly either side of a `|` marker; values beyond
/// `±full_scale` saturate.
///
/// # Example
/// ```
/// use pat9130_sensor_interface::create_bar;
///
/// // +0.5mm on a ±1mm scale, 20 cells
/// assert_eq!(create_bar(0.5, 1.0, 20), "          |█████     ");
/// ```
pub fn create_bar(value: f64, full_scale: f64, width: usize) -> String {
    let half = width / 2;
    let normalized = if full_scale > 0.0 {
        (value / full_scale).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let filled = ((normalized.abs() * half as f64) as usize).min(half);

    let (left, right) = if normalized < 0.0 {
        (
            format!("{}{}", " ".repeat(half - filled), "█".repeat(filled)),
            " ".repeat(half),
        )
    } else {
        (
            " ".repeat(half),
            format!("{}{}", "█".repeat(filled), " ".repeat(half - filled)),
        )
    };
    format!("{}|{}", left, right)
}

/// Single-line live status for a capture sample, in `unit`
pub fn progress_line(sample: &DisplacementSample, unit: LengthUnit) -> String {
    format!(
        "{} | \u{394}X={:.3}, \u{394}Y={:.3} | SumX={:.3}, SumY={:.3}",
        sample.timestamp.format(TIMESTAMP_FORMAT),
        unit.from_micrometers(sample.delta_x),
        unit.from_micrometers(sample.delta_y),
        unit.from_micrometers(sample.cumulative_x).abs(),
        unit.from_micrometers(sample.cumulative_y).abs(),
    )
}
