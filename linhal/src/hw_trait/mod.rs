//! Hardware abstraction layer traits.
//!
//! This module defines the core hardware interface traits (I2C, GPIO,
//! steady clock) that allow peripheral drivers to work with different
//! underlying implementations. There is exactly one conforming Linux
//! implementation per trait in this crate; the traits exist as the seam,
//! not as a hierarchy.

use crate::error::Result;

/// I2C bus master.
///
/// One call to [`I2c::transaction`] is one bus transaction. The transfer
/// direction is derived from which buffers are non-empty: output only is a
/// write, input only is a read, and both is an atomic write-then-read with
/// no other bus activity permitted between the phases. Submitting two empty
/// buffers is a no-op that never touches the device.
pub trait I2c {
    /// Execute one transaction against the peripheral at `address`.
    ///
    /// `address` is a 7-bit address, or the high byte of a 10-bit address
    /// when its top five bits carry the reserved `11110` pattern; in the
    /// 10-bit case the first output byte supplies the low address byte.
    fn transaction(&mut self, address: u8, data_out: &[u8], data_in: &mut [u8]) -> Result<()>;

    /// Write `data_out` to the peripheral at `address`.
    fn write(&mut self, address: u8, data_out: &[u8]) -> Result<()> {
        self.transaction(address, data_out, &mut [])
    }

    /// Read `data_in.len()` bytes from the peripheral at `address`.
    fn read(&mut self, address: u8, data_in: &mut [u8]) -> Result<()> {
        self.transaction(address, &[], data_in)
    }

    /// Write then read in a single atomic transaction.
    ///
    /// The usual register-read idiom: write the register index, then read
    /// its value, with no other controller able to drive the bus in
    /// between.
    fn write_read(&mut self, address: u8, data_out: &[u8], data_in: &mut [u8]) -> Result<()> {
        self.transaction(address, data_out, data_in)
    }
}

/// Digital input pin.
pub trait InputPin {
    /// Sample the pin. Returns true for a high level.
    fn level(&mut self) -> Result<bool>;
}

/// Digital output pin.
pub trait OutputPin {
    /// Drive the pin high or low.
    fn set_level(&mut self, high: bool) -> Result<()>;

    /// Read back the currently driven level.
    fn level(&mut self) -> Result<bool>;
}

/// Monotonic clock.
pub trait SteadyClock {
    /// Tick rate of [`SteadyClock::uptime`] in hertz.
    fn frequency(&self) -> f64;

    /// Ticks elapsed since the clock was constructed. Never decreases.
    fn uptime(&mut self) -> u64;
}
