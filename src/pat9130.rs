//! PAT9130 optical displacement sensor driver

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::bus::{RegisterAddress, RegisterBus, RegisterValue, Transport};
use crate::calibration::Axis;
use crate::capture::CancelToken;
use crate::error::{Pat9130Error, Result};

// Register map
pub(crate) const REG_PRODUCT_ID: RegisterAddress = RegisterAddress::fixed(0x00);
pub(crate) const REG_MOTION_STATUS: RegisterAddress = RegisterAddress::fixed(0x02);
pub(crate) const REG_DELTA_X_LO: RegisterAddress = RegisterAddress::fixed(0x03);
pub(crate) const REG_DELTA_Y_LO: RegisterAddress = RegisterAddress::fixed(0x04);
pub(crate) const REG_DELTA_X_HI: RegisterAddress = RegisterAddress::fixed(0x11);
pub(crate) const REG_DELTA_Y_HI: RegisterAddress = RegisterAddress::fixed(0x12);

/// Expected content of the product ID register
pub const PRODUCT_ID: u8 = 0x31;

/// Motion-ready flag in the status register
pub(crate) const MOTION_READY: u8 = 0x80;

/// Delay between successive handshake or motion-ready polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(8);

/// Default timeout for handshake and batch reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Driver tuning
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Sleep between polls of the identity or status register
    pub poll_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Lifecycle of a driver instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Handshake not completed
    Uninitialized,
    /// Product ID verified, reads allowed
    Ready,
    /// A bus transaction failed; `initialize` again to recover
    Faulted,
}

/// One raw displacement reading, in sensor counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
}

impl RawSample {
    /// Neutral reading reported when no motion arrived in time
    pub const ZERO: RawSample = RawSample { x: 0, y: 0 };

    pub fn axis(&self, axis: Axis) -> i16 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Outcome of waiting for the motion-ready flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionReading {
    /// The device flagged motion and the delta registers were read
    Moved(RawSample),
    /// The timeout elapsed with the flag still clear
    Idle,
}

impl MotionReading {
    /// Collapse to a sample, treating `Idle` as zero displacement
    pub fn unwrap_or_zero(self) -> RawSample {
        match self {
            MotionReading::Moved(sample) => sample,
            MotionReading::Idle => RawSample::ZERO,
        }
    }
}

/// Reinterpret a 16-bit register pair as two's complement
///
/// Values with bit 15 set are `raw - 65536`.
pub fn sign_extend(raw: u16) -> i16 {
    raw as i16
}

/// Assemble `high << 8 | low` and sign-extend
pub fn assemble_axis(low: u8, high: u8) -> i16 {
    sign_extend(u16::from(high) << 8 | u16::from(low))
}

/// PAT9130 sensor interface
pub struct Pat9130<T> {
    bus: RegisterBus<T>,
    config: DriverConfig,
    state: DriverState,
}

impl<T: Transport> Pat9130<T> {
    /// Wrap a register bus. The driver starts `Uninitialized`.
    pub fn new(bus: RegisterBus<T>) -> Self {
        Self::with_config(bus, DriverConfig::default())
    }

    pub fn with_config(bus: RegisterBus<T>, config: DriverConfig) -> Self {
        Self {
            bus,
            config,
            state: DriverState::Uninitialized,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Give back the register bus
    pub fn release(self) -> RegisterBus<T> {
        self.bus
    }

    /// Poll the product ID register until it reads [`PRODUCT_ID`].
    ///
    /// Can be called from any state; success clears a previous fault.
    ///
    /// # Returns
    /// * `Ok(())` - Device identified, driver is `Ready`
    /// * `Err(HandshakeTimeout)` - `timeout` elapsed; carries the last ID read
    /// * `Err(Transport)` - Bus failure, driver is `Faulted`
    pub fn initialize(&mut self, timeout: Duration) -> Result<()> {
        if self.state == DriverState::Ready {
            self.state = DriverState::Uninitialized;
        }

        let start = Instant::now();
        loop {
            let id = self.transact(|bus| bus.read(REG_PRODUCT_ID))?;
            if id == PRODUCT_ID {
                info!(target: "pat9130::driver", "Product ID valid: 0x{:02X}", id);
                self.state = DriverState::Ready;
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed > timeout {
                warn!(
                    target: "pat9130::driver",
                    "Invalid product ID after {:.2}s: 0x{:02X}",
                    elapsed.as_secs_f64(),
                    id
                );
                return Err(Pat9130Error::HandshakeTimeout { last_id: id, elapsed });
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// True iff bit 7 of the motion status register is set
    pub fn is_motion_ready(&mut self) -> Result<bool> {
        self.ensure_ready()?;
        self.motion_ready()
    }

    /// Wait up to `timeout` for motion, then read both axes.
    ///
    /// The status register is checked at least once, even for a zero
    /// timeout. A bus failure is an error, never `Idle`.
    pub fn poll_motion(&mut self, timeout: Duration) -> Result<MotionReading> {
        self.wait_for_motion(timeout, None)
    }

    /// Like [`poll_motion`](Self::poll_motion), giving up early once
    /// `cancel` fires.
    ///
    /// The token is checked before every status read. A cancelled wait
    /// returns `Idle` without touching the delta registers, so pending
    /// motion stays on the device.
    pub fn poll_motion_until(
        &mut self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<MotionReading> {
        self.wait_for_motion(timeout, Some(cancel))
    }

    /// Like [`poll_motion`](Self::poll_motion), reporting a timeout as a
    /// zero displacement
    pub fn read_sample(&mut self, timeout: Duration) -> Result<RawSample> {
        self.poll_motion(timeout).map(MotionReading::unwrap_or_zero)
    }

    /// Raw register read for diagnostics. Works in any state but faulted.
    pub fn read_register(&mut self, address: i32) -> Result<u8> {
        self.ensure_not_faulted()?;
        let address = RegisterAddress::try_from(address)?;
        self.transact(|bus| bus.read(address))
    }

    /// Raw register write for diagnostics. Works in any state but faulted.
    pub fn write_register(&mut self, address: i32, value: i32) -> Result<()> {
        self.ensure_not_faulted()?;
        let address = RegisterAddress::try_from(address)?;
        let value = RegisterValue::try_from(value)?;
        self.transact(|bus| bus.write(address, value))
    }

    fn wait_for_motion(
        &mut self,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<MotionReading> {
        self.ensure_ready()?;

        let start = Instant::now();
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                debug!(target: "pat9130::driver", "motion wait cancelled");
                return Ok(MotionReading::Idle);
            }
            if self.motion_ready()? {
                return self.read_deltas().map(MotionReading::Moved);
            }
            if start.elapsed() > timeout {
                debug!(target: "pat9130::driver", "no motion within {:?}", timeout);
                return Ok(MotionReading::Idle);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn motion_ready(&mut self) -> Result<bool> {
        let status = self.transact(|bus| bus.read(REG_MOTION_STATUS))?;
        Ok(status & MOTION_READY != 0)
    }

    fn read_deltas(&mut self) -> Result<RawSample> {
        let (x_lo, x_hi, y_lo, y_hi) = self.transact(|bus| {
            Ok((
                bus.read(REG_DELTA_X_LO)?,
                bus.read(REG_DELTA_X_HI)?,
                bus.read(REG_DELTA_Y_LO)?,
                bus.read(REG_DELTA_Y_HI)?,
            ))
        })?;

        Ok(RawSample {
            x: assemble_axis(x_lo, x_hi),
            y: assemble_axis(y_lo, y_hi),
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            DriverState::Ready => Ok(()),
            DriverState::Uninitialized => Err(Pat9130Error::NotInitialized),
            DriverState::Faulted => Err(Pat9130Error::Faulted),
        }
    }

    fn ensure_not_faulted(&self) -> Result<()> {
        match self.state {
            DriverState::Faulted => Err(Pat9130Error::Faulted),
            _ => Ok(()),
        }
    }

    /// Run bus operations, moving to `Faulted` on any transport failure
    fn transact<R>(&mut self, op: impl FnOnce(&mut RegisterBus<T>) -> Result<R>) -> Result<R> {
        let result = op(&mut self.bus);
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!(target: "pat9130::driver", "bus fault: {}", e);
                self.state = DriverState::Faulted;
            }
        }
        result
    }
}

#[cfg(feature = "hardware")]
impl Pat9130<crate::spi::SpidevTransport> {
    /// Open the SPI device and build an uninitialized driver.
    ///
    /// The device is closed when the driver is dropped.
    pub fn open(spi: &crate::spi::SpiConfig, config: DriverConfig) -> Result<Self> {
        let transport = crate::spi::SpidevTransport::open(spi)?;
        Ok(Self::with_config(RegisterBus::new(transport), config))
    }
}
