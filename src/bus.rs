//! Register-level access over a synchronous serial link
//!
//! Every register access is one two-byte full-duplex exchange. The first byte
//! carries the command (address with bit 7 selecting read or write), the
//! second carries the value on a write or clocks out the response on a read.

use std::fmt;
use std::io;

use log::trace;

use crate::error::{Pat9130Error, Result};

/// Highest addressable register
pub const MAX_REGISTER_ADDRESS: u8 = 0x7F;

/// Bit 7 of the command byte selects a write
const DIR_WRITE: u8 = 0x80;

/// Physical transaction primitive: send N bytes, receive N bytes
pub trait Transport {
    /// Clock `tx` out while filling `rx` with what the device returns.
    /// Both slices have the same length.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        (**self).transfer(tx, rx)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        (**self).transfer(tx, rx)
    }
}

/// A validated 7-bit register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterAddress(u8);

impl RegisterAddress {
    /// Compile-time register map entries
    pub(crate) const fn fixed(address: u8) -> Self {
        RegisterAddress(address & MAX_REGISTER_ADDRESS)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Command byte for a read (bit 7 clear)
    pub const fn read_command(self) -> u8 {
        self.0
    }

    /// Command byte for a write (bit 7 set)
    pub const fn write_command(self) -> u8 {
        DIR_WRITE | self.0
    }
}

impl TryFrom<i32> for RegisterAddress {
    type Error = Pat9130Error;

    fn try_from(address: i32) -> Result<Self> {
        match u8::try_from(address) {
            Ok(a) if a <= MAX_REGISTER_ADDRESS => Ok(RegisterAddress(a)),
            _ => Err(Pat9130Error::InvalidAddress(address)),
        }
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// A validated 8-bit register value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue(u8);

impl RegisterValue {
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for RegisterValue {
    type Error = Pat9130Error;

    fn try_from(value: i32) -> Result<Self> {
        u8::try_from(value)
            .map(RegisterValue)
            .map_err(|_| Pat9130Error::InvalidValue(value))
    }
}

/// Owns the physical link and performs single-register transactions
pub struct RegisterBus<T> {
    transport: T,
}

impl<T: Transport> RegisterBus<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Release the underlying transport
    pub fn release(self) -> T {
        self.transport
    }

    /// Read a single register.
    ///
    /// The address is validated before anything touches the bus. The first
    /// byte clocked back is discarded; the second is the register content.
    pub fn read_register(&mut self, address: i32) -> Result<u8> {
        let address = RegisterAddress::try_from(address)?;
        self.read(address)
    }

    /// Write a single register. No acknowledgement is read back.
    pub fn write_register(&mut self, address: i32, value: i32) -> Result<()> {
        let address = RegisterAddress::try_from(address)?;
        let value = RegisterValue::try_from(value)?;
        self.write(address, value)
    }

    pub(crate) fn read(&mut self, address: RegisterAddress) -> Result<u8> {
        let tx = [address.read_command(), 0x00];
        let mut rx = [0u8; 2];
        self.transport.transfer(&tx, &mut rx)?;
        trace!(target: "pat9130::bus", "read {} -> 0x{:02X}", address, rx[1]);
        Ok(rx[1])
    }

    pub(crate) fn write(&mut self, address: RegisterAddress, value: RegisterValue) -> Result<()> {
        let tx = [address.write_command(), value.get()];
        let mut rx = [0u8; 2];
        trace!(target: "pat9130::bus", "write {} <- 0x{:02X}", address, value.get());
        self.transport.transfer(&tx, &mut rx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    #[test]
    fn test_address_range() {
        for a in 0..=0x7F {
            assert!(RegisterAddress::try_from(a).is_ok(), "address {a} rejected");
        }
        for a in [-1, -128, 0x80, 0xFF, 0x100, i32::MAX, i32::MIN] {
            assert!(matches!(
                RegisterAddress::try_from(a),
                Err(Pat9130Error::InvalidAddress(x)) if x == a
            ));
        }
    }

    #[test]
    fn test_value_range() {
        assert!(RegisterValue::try_from(0).is_ok());
        assert!(RegisterValue::try_from(0xFF).is_ok());
        for v in [-1, 0x100, 0x1234] {
            assert!(matches!(
                RegisterValue::try_from(v),
                Err(Pat9130Error::InvalidValue(x)) if x == v
            ));
        }
    }

    #[test]
    fn test_command_bytes() {
        let addr = RegisterAddress::try_from(0x12).unwrap();
        assert_eq!(addr.read_command(), 0x12);
        assert_eq!(addr.write_command(), 0x92);
    }

    #[test]
    fn test_read_register_returns_second_byte() {
        let mut device = FakeDevice::new();
        device.set_register(0x00, 0x31);
        let mut bus = RegisterBus::new(&mut device);

        assert_eq!(bus.read_register(0x00).unwrap(), 0x31);
        drop(bus);
        assert_eq!(device.transactions(), &[[0x00, 0x00]]);
    }

    #[test]
    fn test_write_register_sets_top_bit() {
        let mut device = FakeDevice::new();
        let mut bus = RegisterBus::new(&mut device);

        bus.write_register(0x06, 0xA5).unwrap();
        drop(bus);
        assert_eq!(device.transactions(), &[[0x86, 0xA5]]);
        assert_eq!(device.register(0x06), 0xA5);
    }

    #[test]
    fn test_invalid_input_never_touches_bus() {
        let mut device = FakeDevice::new();
        let mut bus = RegisterBus::new(&mut device);

        assert!(matches!(bus.read_register(0x80), Err(Pat9130Error::InvalidAddress(0x80))));
        assert!(matches!(bus.read_register(-1), Err(Pat9130Error::InvalidAddress(-1))));
        assert!(matches!(bus.write_register(0x80, 0), Err(Pat9130Error::InvalidAddress(0x80))));
        assert!(matches!(bus.write_register(0x10, 0x100), Err(Pat9130Error::InvalidValue(0x100))));
        drop(bus);
        assert!(device.transactions().is_empty());
    }

    #[test]
    fn test_transport_failure_surfaces_immediately() {
        let mut device = FakeDevice::new();
        device.fail_after(0);
        let mut bus = RegisterBus::new(&mut device);

        assert!(matches!(bus.read_register(0x02), Err(Pat9130Error::Transport(_))));
        drop(bus);
        assert_eq!(device.attempts(), 1);
    }
}
