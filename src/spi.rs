//! Linux `spidev` link to the sensor

use std::io;
use std::path::PathBuf;

use log::info;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use crate::bus::Transport;

/// Default character device (bus 0, chip select 0)
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";

/// Default SCLK rate in Hz
pub const DEFAULT_CLOCK_HZ: u32 = 200_000;

/// Clock polarity / phase combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    #[default]
    Mode3,
}

impl SpiMode {
    fn flags(self) -> SpiModeFlags {
        match self {
            SpiMode::Mode0 => SpiModeFlags::SPI_MODE_0,
            SpiMode::Mode1 => SpiModeFlags::SPI_MODE_1,
            SpiMode::Mode2 => SpiModeFlags::SPI_MODE_2,
            SpiMode::Mode3 => SpiModeFlags::SPI_MODE_3,
        }
    }

    /// Build from the conventional 0-3 mode number
    pub fn from_number(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(SpiMode::Mode0),
            1 => Some(SpiMode::Mode1),
            2 => Some(SpiMode::Mode2),
            3 => Some(SpiMode::Mode3),
            _ => None,
        }
    }
}

/// Link settings
#[derive(Debug, Clone)]
pub struct SpiConfig {
    pub device: PathBuf,
    pub clock_hz: u32,
    pub mode: SpiMode,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            clock_hz: DEFAULT_CLOCK_HZ,
            mode: SpiMode::default(),
        }
    }
}

/// Full-duplex transfers over a Linux SPI character device.
///
/// The file descriptor is closed on drop.
pub struct SpidevTransport {
    spi: Spidev,
}

impl SpidevTransport {
    pub fn open(config: &SpiConfig) -> io::Result<Self> {
        let mut spi = Spidev::open(&config.device)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.clock_hz)
            .mode(config.mode.flags())
            .build();
        spi.configure(&options)?;

        info!(
            target: "pat9130::bus",
            "SPI open on {}, {} Hz, {:?}",
            config.device.display(),
            config.clock_hz,
            config.mode
        );
        Ok(Self { spi })
    }
}

impl Transport for SpidevTransport {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        let mut transfer = SpidevTransfer::read_write(tx, rx);
        self.spi.transfer(&mut transfer)
    }
}
