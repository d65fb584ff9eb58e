//! Serial port driver over a tty character device.
//!
//! Opens the port non-blocking without claiming it as a controlling
//! terminal, then programs termios directly: raw byte stream, 8 data bits,
//! receiver enabled, modem control lines ignored. Only the discrete POSIX
//! baud rates are accepted; anything else is rejected before touching the
//! port.

use std::path::{Path, PathBuf};

use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;
use rustix::termios::{self, ControlModes, InputModes, LocalModes, OptionalActions, OutputModes};

use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Number of stop bits per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity scheme per frame.
///
/// The forced (sticky) levels exist in the settings vocabulary but no
/// termios mapping is provided for them; requesting one fails with
/// an unsupported-operation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Forced0,
    Forced1,
}

/// Serial port settings.
#[derive(Debug, Clone, Copy)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub stop: StopBits,
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            stop: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Baud rates with a discrete termios constant. Requests outside this table
/// are invalid arguments, mirroring the classic B-constant switch.
const SUPPORTED_BAUD_RATES: &[u32] = &[
    0, 50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115_200, 230_400, 460_800,
];

/// Serial port bound to one tty character device.
pub struct Serial {
    fd: OwnedFd,
    path: PathBuf,
    settings: SerialSettings,
}

impl Serial {
    /// Open the tty at `path` and apply `settings`.
    pub fn open(path: impl AsRef<Path>, settings: SerialSettings) -> Result<Self> {
        let path = path.as_ref();
        let fd = rustix::fs::open(
            path,
            OFlags::RDWR | OFlags::NONBLOCK | OFlags::NOCTTY | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|errno| {
            debug!("failed to open {}: {errno}", path.display());
            Error::Io(errno.into())
        })?;
        apply_settings(&fd, &settings)?;
        Ok(Self {
            fd,
            path: path.to_owned(),
            settings,
        })
    }

    /// Reprogram the live port.
    pub fn configure(&mut self, settings: SerialSettings) -> Result<()> {
        apply_settings(&self.fd, &settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Settings currently applied to the port.
    pub fn settings(&self) -> SerialSettings {
        self.settings
    }

    /// Path of the underlying tty device.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read available bytes into `buf`, returning the count. The port is
    /// non-blocking: with nothing pending this returns `Ok(0)`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match rustix::io::read(&self.fd, buf) {
            Ok(n) => Ok(n),
            Err(errno) if errno == Errno::AGAIN => Ok(0),
            Err(errno) => {
                debug!("read on {} failed: {errno}", self.path.display());
                Err(Error::Io(errno.into()))
            }
        }
    }

    /// Write `buf` to the port, returning the count accepted by the kernel.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        rustix::io::write(&self.fd, buf).map_err(|errno| {
            debug!("write on {} failed: {errno}", self.path.display());
            Error::Io(errno.into())
        })
    }

    /// Block until all written bytes have left the transmitter.
    pub fn flush(&mut self) -> Result<()> {
        termios::tcdrain(&self.fd).map_err(|errno| Error::Io(errno.into()))
    }
}

/// Map settings to the termios control and input mode words. 8 data bits,
/// receiver on, modem status ignored; stop bits and parity from the
/// settings. Pure, so the mapping is testable without a tty.
fn frame_modes(settings: &SerialSettings) -> Result<(ControlModes, InputModes)> {
    let mut control = ControlModes::CREAD | ControlModes::CS8 | ControlModes::CLOCAL;
    let mut input = InputModes::empty();

    if settings.stop == StopBits::Two {
        control |= ControlModes::CSTOPB;
    }

    match settings.parity {
        Parity::None => input |= InputModes::IGNPAR,
        Parity::Odd => {
            control |= ControlModes::PARENB | ControlModes::PARODD;
            input |= InputModes::INPCK;
        }
        Parity::Even => {
            control |= ControlModes::PARENB;
            input |= InputModes::INPCK;
        }
        Parity::Forced0 | Parity::Forced1 => {
            return Err(Error::OperationNotSupported {
                context: "forced parity level".into(),
                errno: Errno::INVAL,
            });
        }
    }

    Ok((control, input))
}

/// Program termios for `settings`.
fn apply_settings(fd: &OwnedFd, settings: &SerialSettings) -> Result<()> {
    if !SUPPORTED_BAUD_RATES.contains(&settings.baud_rate) {
        return Err(Error::Argument(format!(
            "unsupported baud rate {}",
            settings.baud_rate
        )));
    }
    let (control, input) = frame_modes(settings)?;

    let mut tio = termios::tcgetattr(fd).map_err(|errno| Error::Io(errno.into()))?;
    tio.control_modes = control;
    tio.input_modes = input;
    tio.output_modes = OutputModes::empty();
    tio.local_modes = LocalModes::empty();
    tio.set_speed(settings.baud_rate)
        .map_err(|errno| Error::OperationNotPermitted {
            context: format!("baud rate {}", settings.baud_rate),
            errno,
        })?;

    termios::tcsetattr(fd, OptionalActions::Now, &tio).map_err(|errno| {
        Error::OperationNotPermitted {
            context: "applying serial settings".into(),
            errno,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(9600 ; "standard slow rate")]
    #[test_case(115_200 ; "default rate")]
    #[test_case(460_800 ; "fastest supported rate")]
    fn test_supported_baud_rates(baud: u32) {
        assert!(SUPPORTED_BAUD_RATES.contains(&baud));
    }

    #[test_case(31_250 ; "midi rate has no b constant")]
    #[test_case(921_600 ; "above supported range")]
    #[test_case(1 ; "nonsense rate")]
    fn test_unsupported_baud_rates(baud: u32) {
        assert!(!SUPPORTED_BAUD_RATES.contains(&baud));
    }

    #[test]
    fn test_baud_table_is_sorted_and_unique() {
        assert!(SUPPORTED_BAUD_RATES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.stop, StopBits::One);
        assert_eq!(settings.parity, Parity::None);
    }

    #[test]
    fn test_frame_modes_base_set() {
        let (control, input) = frame_modes(&SerialSettings::default()).unwrap();
        assert!(control.contains(ControlModes::CREAD | ControlModes::CS8 | ControlModes::CLOCAL));
        assert!(!control.contains(ControlModes::CSTOPB));
        assert!(input.contains(InputModes::IGNPAR));
    }

    #[test]
    fn test_frame_modes_two_stop_bits() {
        let settings = SerialSettings {
            stop: StopBits::Two,
            ..Default::default()
        };
        let (control, _) = frame_modes(&settings).unwrap();
        assert!(control.contains(ControlModes::CSTOPB));
    }

    #[test_case(Parity::Even, false ; "even parity")]
    #[test_case(Parity::Odd, true ; "odd parity")]
    fn test_frame_modes_parity(parity: Parity, odd: bool) {
        let settings = SerialSettings {
            parity,
            ..Default::default()
        };
        let (control, input) = frame_modes(&settings).unwrap();
        assert!(control.contains(ControlModes::PARENB));
        assert_eq!(control.contains(ControlModes::PARODD), odd);
        assert!(input.contains(InputModes::INPCK));
        assert!(!input.contains(InputModes::IGNPAR));
    }

    #[test]
    fn test_forced_parity_is_unsupported() {
        let settings = SerialSettings {
            parity: Parity::Forced1,
            ..Default::default()
        };
        let err = frame_modes(&settings).unwrap_err();
        assert!(matches!(err, Error::OperationNotSupported { .. }));
    }
}
