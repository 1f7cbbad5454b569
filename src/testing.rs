//! Scripted stand-in for a PAT9130 on the other end of the link

use std::collections::VecDeque;
use std::io;
use std::ops::Range;

use crate::bus::Transport;
use crate::capture::CancelToken;
use crate::pat9130::{
    MOTION_READY, PRODUCT_ID, REG_DELTA_X_HI, REG_DELTA_X_LO, REG_DELTA_Y_HI, REG_DELTA_Y_LO,
    REG_MOTION_STATUS, REG_PRODUCT_ID,
};

/// Simulated register file.
///
/// Queued samples are presented through the delta registers; the
/// motion-ready bit is set while a sample is pending. A sample is consumed
/// when its last register (Y high) is read.
pub(crate) struct FakeDevice {
    registers: [u8; 128],
    samples: VecDeque<(i16, i16)>,
    idle_polls: usize,
    consumed: usize,
    cancel_after: Option<(usize, CancelToken)>,
    failures: Range<usize>,
    attempts: usize,
    log: Vec<[u8; 2]>,
}

impl FakeDevice {
    /// Device with every register zero (wrong product ID)
    pub fn new() -> Self {
        Self {
            registers: [0; 128],
            samples: VecDeque::new(),
            idle_polls: 0,
            consumed: 0,
            cancel_after: None,
            failures: 0..0,
            attempts: 0,
            log: Vec::new(),
        }
    }

    /// Device answering the handshake with the genuine product ID
    pub fn genuine() -> Self {
        let mut device = Self::new();
        device.set_register(REG_PRODUCT_ID.get(), PRODUCT_ID);
        device
    }

    pub fn set_register(&mut self, address: u8, value: u8) {
        self.registers[address as usize] = value;
    }

    pub fn register(&self, address: u8) -> u8 {
        self.registers[address as usize]
    }

    pub fn push_sample(&mut self, x: i16, y: i16) {
        self.samples.push_back((x, y));
    }

    /// Report "not ready" for the next `polls` status reads
    pub fn idle_for(&mut self, polls: usize) {
        self.idle_polls = polls;
    }

    /// Fire `token` once `samples` samples have been consumed
    pub fn cancel_after(&mut self, samples: usize, token: CancelToken) {
        self.cancel_after = Some((samples, token));
    }

    /// Fail every transaction from attempt number `n` on (0-based)
    pub fn fail_after(&mut self, n: usize) {
        self.failures = n..usize::MAX;
    }

    /// Fail the transactions whose attempt numbers fall in `attempts`
    pub fn fail_during(&mut self, attempts: Range<usize>) {
        self.failures = attempts;
    }

    pub fn transactions(&self) -> &[[u8; 2]] {
        &self.log
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    fn read(&mut self, address: u8) -> u8 {
        let pending = self.samples.front().copied();
        match address {
            a if a == REG_MOTION_STATUS.get() => {
                if self.idle_polls > 0 {
                    self.idle_polls -= 1;
                    0x00
                } else if pending.is_some() {
                    MOTION_READY
                } else {
                    0x00
                }
            }
            a if a == REG_DELTA_X_LO.get() => pending.map_or(0, |(x, _)| x.to_le_bytes()[0]),
            a if a == REG_DELTA_X_HI.get() => pending.map_or(0, |(x, _)| x.to_le_bytes()[1]),
            a if a == REG_DELTA_Y_LO.get() => pending.map_or(0, |(_, y)| y.to_le_bytes()[0]),
            a if a == REG_DELTA_Y_HI.get() => {
                let value = pending.map_or(0, |(_, y)| y.to_le_bytes()[1]);
                if self.samples.pop_front().is_some() {
                    self.consumed += 1;
                    if let Some((n, token)) = &self.cancel_after {
                        if self.consumed >= *n {
                            token.cancel();
                        }
                    }
                }
                value
            }
            a => self.registers[a as usize],
        }
    }
}

impl Transport for FakeDevice {
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> io::Result<()> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.failures.contains(&attempt) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link lost"));
        }

        let command = tx[0];
        let address = command & 0x7F;
        rx[0] = 0xFF;
        if command & 0x80 != 0 {
            self.registers[address as usize] = tx[1];
            rx[1] = 0xFF;
        } else {
            rx[1] = self.read(address);
        }
        self.log.push([tx[0], tx[1]]);
        Ok(())
    }
}
