//! CSV capture log
//!
//! One header row followed by one row per displacement sample. The whole
//! file is written in one go when a capture ends.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::info;

use crate::calibration::ScaleFactors;
use crate::capture::DisplacementSample;
use crate::error::{Pat9130Error, Result};

/// Column names, in order
pub const CSV_HEADER: &str = "timestamp,delta_x,delta_y,acumulado_x,acumulado_y";

/// Timestamp column format (local time, millisecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Physical unit of the values written to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LengthUnit {
    #[value(name = "um")]
    Micrometers,
    #[default]
    #[value(name = "mm")]
    Millimeters,
}

impl LengthUnit {
    /// Convert a length in micrometres to this unit
    pub fn from_micrometers(self, um: f64) -> f64 {
        match self {
            LengthUnit::Micrometers => um,
            LengthUnit::Millimeters => um / 1000.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Micrometers => "um",
            LengthUnit::Millimeters => "mm",
        }
    }
}

/// Destination for a capture run
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    unit: LengthUnit,
}

impl CsvSink {
    pub fn new<P: Into<PathBuf>>(path: P, unit: LengthUnit) -> Self {
        Self {
            path: path.into(),
            unit,
        }
    }

    /// Log named `<YYYYmmdd_HHMMSS>-<fx>-<fy>.csv` inside `dir`
    pub fn timestamped<P: AsRef<Path>>(dir: P, factors: ScaleFactors, unit: LengthUnit) -> Self {
        let now = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = format!("{}-{:.3}-{:.3}.csv", now, factors.x, factors.y);
        Self::new(dir.as_ref().join(name), unit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unit(&self) -> LengthUnit {
        self.unit
    }

    /// Format one sample as a CSV row (no line terminator)
    pub fn format_row(&self, sample: &DisplacementSample) -> String {
        let unit = self.unit;
        format!(
            "{},{},{},{},{}",
            sample.timestamp.format(TIMESTAMP_FORMAT),
            unit.from_micrometers(sample.delta_x),
            unit.from_micrometers(sample.delta_y),
            unit.from_micrometers(sample.cumulative_x),
            unit.from_micrometers(sample.cumulative_y),
        )
    }

    /// Write header and rows, replacing any existing file atomically.
    ///
    /// Rows go to a sibling temporary file that is renamed over the target
    /// once fully written, so readers never see a partial log.
    pub fn write(&self, samples: &[DisplacementSample]) -> Result<()> {
        let tmp = self.temp_path();
        let result = self.write_to(&tmp, samples).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(Pat9130Error::Persistence {
                path: self.path.clone(),
                source,
            });
        }

        info!(
            target: "pat9130::capture",
            "Saved {} samples to {}",
            samples.len(),
            self.path.display()
        );
        Ok(())
    }

    fn write_to(&self, tmp: &Path, samples: &[DisplacementSample]) -> io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut out = BufWriter::new(File::create(tmp)?);
        writeln!(out, "{}", CSV_HEADER)?;
        for sample in samples {
            writeln!(out, "{}", self.format_row(sample))?;
        }
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
