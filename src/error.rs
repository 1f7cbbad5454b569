//! Error types for the PAT9130 sensor interface

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::calibration::Axis;

/// Error type for PAT9130 operations
#[derive(Error, Debug)]
pub enum Pat9130Error {
    /// Register address outside 0x00..=0x7F
    #[error("Invalid register address: {0} (must be 0x00-0x7F)")]
    InvalidAddress(i32),

    /// Register value outside 0x00..=0xFF
    #[error("Invalid register value: {0} (must be 0x00-0xFF)")]
    InvalidValue(i32),

    /// Identity register never returned the expected product ID
    #[error("Invalid product ID after {:.2}s: 0x{last_id:02X}", .elapsed.as_secs_f64())]
    HandshakeTimeout { last_id: u8, elapsed: Duration },

    /// A previous bus transaction failed; the driver must be re-initialized
    #[error("Sensor driver is faulted; re-initialize before reading")]
    Faulted,

    /// The identity handshake has not completed yet
    #[error("Sensor driver is not initialized")]
    NotInitialized,

    /// Bus-level transaction failure
    #[error("SPI transfer failed: {0}")]
    Transport(#[from] io::Error),

    /// The operator declined to confirm the calibration move
    #[error("Calibration of axis {0} aborted by operator")]
    CalibrationAborted(Axis),

    /// Capture log could not be written
    #[error("Failed to write capture log {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Pat9130Error {
    /// True when the driver cannot be used again until `initialize` succeeds
    pub fn is_fatal(&self) -> bool {
        matches!(self, Pat9130Error::Faulted | Pat9130Error::Transport(_))
    }
}

/// Result type for PAT9130 operations
pub type Result<T> = std::result::Result<T, Pat9130Error>;
