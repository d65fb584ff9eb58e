//! GPIO pins over the Linux GPIO v2 character-device ABI.
//!
//! A pin is requested from a GPIO chip device (`/dev/gpiochipN`) as a
//! single-line request; the kernel hands back a dedicated line descriptor
//! used for all further value and configuration operations. Assumes a GPIO
//! driver exists and is properly wired into the kernel for the hardware in
//! question.
//!
//! The request and value records below are explicit fixed-layout mirrors of
//! the `linux/gpio.h` v2 structs; their sizes are asserted in the tests
//! because the ioctl numbers encode them.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use bitflags::bitflags;
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;

use crate::error::{Error, Result};
use crate::hw_trait;
use crate::tracing::prelude::*;

const GPIO_MAX_NAME_SIZE: usize = 32;
const GPIO_V2_LINES_MAX: usize = 64;
const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

/// Consumer label reported to the kernel, visible in `gpioinfo`.
const CONSUMER: &[u8] = b"linhal";

bitflags! {
    /// Line request flags (`GPIO_V2_LINE_FLAG_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const ACTIVE_LOW = 1 << 1;
        const INPUT = 1 << 2;
        const OUTPUT = 1 << 3;
        const OPEN_DRAIN = 1 << 6;
        const BIAS_PULL_UP = 1 << 8;
        const BIAS_PULL_DOWN = 1 << 9;
    }
}

/// `struct gpio_v2_line_attribute`.
#[repr(C)]
#[derive(Clone, Copy)]
struct LineAttribute {
    id: u32,
    padding: u32,
    value: u64,
}

/// `struct gpio_v2_line_config_attribute`.
#[repr(C)]
#[derive(Clone, Copy)]
struct LineConfigAttribute {
    attr: LineAttribute,
    mask: u64,
}

/// `struct gpio_v2_line_config`.
#[repr(C)]
struct LineConfig {
    flags: u64,
    num_attrs: u32,
    padding: [u32; 5],
    attrs: [LineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
}

/// `struct gpio_v2_line_request`.
#[repr(C)]
struct LineRequest {
    offsets: [u32; GPIO_V2_LINES_MAX],
    consumer: [u8; GPIO_MAX_NAME_SIZE],
    config: LineConfig,
    num_lines: u32,
    event_buffer_size: u32,
    padding: [u32; 5],
    fd: i32,
}

/// `struct gpio_v2_line_values`.
#[repr(C)]
struct LineValues {
    bits: u64,
    mask: u64,
}

// All-zero records stand in for the C idiom of memset before filling in the
// handful of fields a single-line request needs.
impl LineRequest {
    fn zeroed() -> Self {
        // Safety: every field is a plain integer or an array of them.
        unsafe { std::mem::zeroed() }
    }
}

impl LineConfig {
    fn zeroed() -> Self {
        // Safety: as above.
        unsafe { std::mem::zeroed() }
    }
}

// The generated wrappers are pub; keep them out of the crate API.
mod ioctls {
    use nix::ioctl_readwrite;

    ioctl_readwrite!(get_line, 0xB4, 0x07, super::LineRequest);
    ioctl_readwrite!(line_set_config, 0xB4, 0x0D, super::LineConfig);
    ioctl_readwrite!(line_get_values, 0xB4, 0x0E, super::LineValues);
    ioctl_readwrite!(line_set_values, 0xB4, 0x0F, super::LineValues);
}

/// Bias resistor selection for a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinResistor {
    None,
    PullUp,
    PullDown,
}

/// Settings applied by [`InputPin::configure`].
#[derive(Debug, Clone, Copy)]
pub struct InputPinSettings {
    pub resistor: PinResistor,
}

impl Default for InputPinSettings {
    fn default() -> Self {
        Self {
            resistor: PinResistor::PullUp,
        }
    }
}

/// Settings applied by [`OutputPin::configure`].
#[derive(Debug, Clone, Copy)]
pub struct OutputPinSettings {
    pub resistor: PinResistor,
    pub open_drain: bool,
}

impl Default for OutputPinSettings {
    fn default() -> Self {
        Self {
            resistor: PinResistor::None,
            open_drain: false,
        }
    }
}

/// Compose the flag word for a line: direction plus the requested bias and
/// drive options. Rebuilt from scratch on every reconfiguration so stale
/// bias bits never linger.
fn config_flags(direction: LineFlags, resistor: PinResistor, open_drain: bool) -> LineFlags {
    let mut flags = direction;
    match resistor {
        PinResistor::None => {}
        PinResistor::PullUp => flags |= LineFlags::BIAS_PULL_UP,
        PinResistor::PullDown => flags |= LineFlags::BIAS_PULL_DOWN,
    }
    if open_drain {
        flags |= LineFlags::OPEN_DRAIN;
    }
    flags
}

/// One requested GPIO line plus the chip it came from.
///
/// Field order matters: the line descriptor closes before the chip
/// descriptor, matching the order the kernel handed them out in reverse.
struct Line {
    line: OwnedFd,
    chip: OwnedFd,
    offset: u32,
}

impl Line {
    fn request(chip_path: &Path, offset: u32, flags: LineFlags) -> Result<Self> {
        let chip = rustix::fs::open(chip_path, OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())
            .map_err(|errno| {
                debug!("failed to open {}: {errno}", chip_path.display());
                Error::Io(errno.into())
            })?;

        let mut request = LineRequest::zeroed();
        request.offsets[0] = offset;
        request.num_lines = 1;
        request.config.flags = flags.bits();
        request.consumer[..CONSUMER.len()].copy_from_slice(CONSUMER);

        if let Err(e) = unsafe { ioctls::get_line(chip.as_raw_fd(), &mut request) } {
            debug!(
                "line {offset} request on {} failed: {e}",
                chip_path.display()
            );
            return Err(Error::Io(nix_io_error(e)));
        }
        // Safety: on success the kernel returns a fresh descriptor we now
        // exclusively own.
        let line = unsafe { OwnedFd::from_raw_fd(request.fd) };
        Ok(Self { line, chip, offset })
    }

    fn values(&self) -> Result<bool> {
        let mut values = LineValues { bits: 0, mask: 1 };
        if let Err(e) = unsafe { ioctls::line_get_values(self.line.as_raw_fd(), &mut values) } {
            debug!("getting line {} failed: {e}", self.offset);
            return Err(Error::Io(nix_io_error(e)));
        }
        Ok(values.bits & values.mask != 0)
    }

    fn set_values(&self, high: bool) -> Result<()> {
        let mut values = LineValues {
            bits: high as u64,
            mask: 1,
        };
        if let Err(e) = unsafe { ioctls::line_set_values(self.line.as_raw_fd(), &mut values) } {
            debug!("setting line {} failed: {e}", self.offset);
            return Err(Error::Io(nix_io_error(e)));
        }
        Ok(())
    }

    fn set_config(&self, flags: LineFlags) -> Result<()> {
        let mut config = LineConfig::zeroed();
        config.flags = flags.bits();
        if let Err(e) = unsafe { ioctls::line_set_config(self.line.as_raw_fd(), &mut config) } {
            debug!("reconfiguring line {} failed: {e}", self.offset);
            return Err(Error::OperationNotPermitted {
                context: format!("reconfiguring line {}", self.offset),
                errno: Errno::from_raw_os_error(e as i32),
            });
        }
        Ok(())
    }
}

fn nix_io_error(errno: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno as i32)
}

/// Input pin on a GPIO chip character device.
pub struct InputPin {
    line: Line,
    settings: InputPinSettings,
}

impl InputPin {
    /// Request `line` on the chip at `chip_path` (e.g. `/dev/gpiochip0`) as
    /// an input, with the default pull-up bias.
    pub fn open(chip_path: impl AsRef<Path>, line: u32) -> Result<Self> {
        let settings = InputPinSettings::default();
        let flags = config_flags(LineFlags::INPUT, settings.resistor, false);
        let line = Line::request(chip_path.as_ref(), line, flags)?;
        Ok(Self { line, settings })
    }

    /// Change the bias resistor on the live line.
    pub fn configure(&mut self, settings: InputPinSettings) -> Result<()> {
        self.line
            .set_config(config_flags(LineFlags::INPUT, settings.resistor, false))?;
        self.settings = settings;
        Ok(())
    }

    /// Settings currently applied to the line.
    pub fn settings(&self) -> InputPinSettings {
        self.settings
    }
}

impl hw_trait::InputPin for InputPin {
    fn level(&mut self) -> Result<bool> {
        self.line.values()
    }
}

/// Output pin on a GPIO chip character device.
pub struct OutputPin {
    line: Line,
    settings: OutputPinSettings,
}

impl OutputPin {
    /// Request `line` on the chip at `chip_path` as an output.
    pub fn open(chip_path: impl AsRef<Path>, line: u32) -> Result<Self> {
        let settings = OutputPinSettings::default();
        let flags = config_flags(LineFlags::OUTPUT, settings.resistor, settings.open_drain);
        let line = Line::request(chip_path.as_ref(), line, flags)?;
        Ok(Self { line, settings })
    }

    /// Change the bias resistor or open-drain drive on the live line.
    pub fn configure(&mut self, settings: OutputPinSettings) -> Result<()> {
        self.line.set_config(config_flags(
            LineFlags::OUTPUT,
            settings.resistor,
            settings.open_drain,
        ))?;
        self.settings = settings;
        Ok(())
    }

    /// Settings currently applied to the line.
    pub fn settings(&self) -> OutputPinSettings {
        self.settings
    }
}

impl hw_trait::OutputPin for OutputPin {
    fn set_level(&mut self, high: bool) -> Result<()> {
        self.line.set_values(high)
    }

    fn level(&mut self) -> Result<bool> {
        self.line.values()
    }
}
