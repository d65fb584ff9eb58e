//! Synchronous peripheral drivers for Linux userspace.
//!
//! Each driver owns one kernel character device (`/dev/i2c-N`,
//! `/dev/gpiochipN`, `/dev/ttyXXX`) and drives it with `ioctl(2)` control
//! operations plus raw `read(2)`/`write(2)`. Every operation blocks the
//! calling thread until the kernel responds; there are no internal locks,
//! suspension points, or retries. Callers sharing a driver across threads
//! must serialize whole transactions externally.
//!
//! The capability traits in [`hw_trait`] are the seam between peripheral
//! consumers and these Linux implementations.

pub mod error;
pub mod gpio;
pub mod hw_trait;
pub mod i2c;
pub mod serial;
pub mod steady_clock;
pub mod tracing;

pub use error::{Error, Result};
