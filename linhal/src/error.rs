//! Common error types for linhal.
//!
//! This module provides a centralized Error enum using thiserror. Drivers
//! detect failures at the failing kernel call and surface them immediately
//! with the saved errno and enough context to identify the operation; none
//! are retried internally.

use rustix::io::Errno;
use thiserror::Error;

/// Main error type for linhal operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Device node open/close failures
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request, rejected before touching the device
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Capability rejected by the controller or its kernel driver
    #[error("operation not supported: {context}: {errno}")]
    OperationNotSupported { context: String, errno: Errno },

    /// No peripheral acknowledged the target address
    #[error("no device at address {address:#06x}: {errno}")]
    NoSuchDevice { address: u16, errno: Errno },

    /// Transfer execution rejected by the kernel or controller
    #[error("operation not permitted: {context}: {errno}")]
    OperationNotPermitted { context: String, errno: Errno },
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Saved errno of the failing kernel call, if this error carries one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Io(e) => e.raw_os_error().map(Errno::from_raw_os_error),
            Error::Argument(_) => None,
            Error::OperationNotSupported { errno, .. }
            | Error::NoSuchDevice { errno, .. }
            | Error::OperationNotPermitted { errno, .. } => Some(*errno),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_is_preserved() {
        let err = Error::NoSuchDevice {
            address: 0x50,
            errno: Errno::REMOTEIO,
        };
        assert_eq!(err.errno(), Some(Errno::REMOTEIO));

        let err = Error::Io(std::io::Error::from_raw_os_error(
            Errno::NOENT.raw_os_error(),
        ));
        assert_eq!(err.errno(), Some(Errno::NOENT));

        assert_eq!(Error::Argument("bad".into()).errno(), None);
    }

    #[test]
    fn test_display_includes_address() {
        let err = Error::NoSuchDevice {
            address: 0x7834,
            errno: Errno::REMOTEIO,
        };
        assert!(err.to_string().contains("0x7834"));
    }
}
