//! I2C bus master over the Linux i2c-dev character device.
//!
//! One [`I2c`] instance owns one open `/dev/i2c-N` descriptor for its whole
//! lifetime. A transaction resolves the addressing mode from the raw
//! address, configures the kernel with two control calls, classifies the
//! transfer shape from buffer emptiness, and executes it: single-phase
//! transfers go through raw read/write, a write-then-read goes through one
//! combined `I2C_RDWR` operation so no other bus transaction can interleave
//! between the phases.
//!
//! The configure-then-execute sequence is not atomic at this level; callers
//! sharing an instance across threads must serialize whole transactions
//! externally.

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;

use crate::error::{Error, Result};
use crate::hw_trait;
use crate::tracing::prelude::*;

// Control requests from linux/i2c-dev.h.
const I2C_SLAVE: i32 = 0x0703;
const I2C_TENBIT: i32 = 0x0704;
const I2C_RDWR: i32 = 0x0707;

// Message flags from linux/i2c.h.
const I2C_M_RD: u16 = 0x0001;
const I2C_M_TEN: u16 = 0x0010;

/// Reserved prefix flagging a 10-bit address: the top five bits of the
/// 7-bit address field must read `11110`.
const TEN_BIT_MASK: u8 = 0b11110 << 2;

// The generated wrappers are pub; keep them out of the crate API.
mod ioctls {
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    ioctl_write_int_bad!(set_ten_bit_mode, super::I2C_TENBIT);
    ioctl_write_int_bad!(set_target_address, super::I2C_SLAVE);
    ioctl_write_ptr_bad!(combined_transfer, super::I2C_RDWR, super::CombinedRequest);
}

/// Message descriptor for a combined transfer (`struct i2c_msg`).
///
/// The kernel executes an ordered array of these as one uninterruptible bus
/// transaction. Layout must match the kernel's; see the tests.
#[repr(C)]
#[derive(Debug)]
struct Message {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// Argument block for `I2C_RDWR` (`struct i2c_rdwr_ioctl_data`).
#[repr(C)]
struct CombinedRequest {
    msgs: *mut Message,
    nmsgs: u32,
}

/// Addressing mode resolved per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressMode {
    SevenBit,
    TenBit,
}

/// Transfer shape, classified from which buffers are non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferShape {
    WriteOnly,
    ReadOnly,
    WriteThenRead,
}

/// Step of the configure-then-execute sequence, for failure mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AddressingMode,
    TargetAddress,
    Transfer,
}

/// Resolve the addressing mode and the numeric target address.
///
/// A raw address whose top five bits carry the reserved `11110` pattern is
/// the high byte of a 10-bit address; the low byte comes from the first
/// output byte, so a 10-bit request with an empty output buffer is a caller
/// contract violation. In 7-bit mode the historical direction bit is
/// stripped: direction comes from buffer emptiness, never from the address.
///
/// Pure: never touches the device.
fn resolve_address(raw: u8, first_output_byte: Option<u8>) -> Result<(AddressMode, u16)> {
    if (raw & TEN_BIT_MASK) == TEN_BIT_MASK {
        let low = first_output_byte.ok_or_else(|| {
            Error::Argument(format!(
                "10-bit address {raw:#04x} needs an output byte to carry the low address byte"
            ))
        })?;
        Ok((AddressMode::TenBit, u16::from(raw) << 8 | u16::from(low)))
    } else {
        Ok((AddressMode::SevenBit, u16::from(raw & 0x7F)))
    }
}

/// Classify the transfer shape. The both-empty case is handled before this
/// is reached.
fn classify(data_out: &[u8], data_in: &[u8]) -> TransferShape {
    match (data_out.is_empty(), data_in.is_empty()) {
        (false, false) => TransferShape::WriteThenRead,
        (false, true) => TransferShape::WriteOnly,
        (true, _) => TransferShape::ReadOnly,
    }
}

/// Map a failed kernel call to the crate error taxonomy.
///
/// Deterministic and stateless; every failure path goes through here so the
/// taxonomy is uniform regardless of which step failed.
fn map_failure(step: Step, errno: Errno, address: u16) -> Error {
    match step {
        Step::AddressingMode => Error::OperationNotSupported {
            context: "10-bit addressing mode".into(),
            errno,
        },
        Step::TargetAddress => Error::NoSuchDevice { address, errno },
        Step::Transfer => Error::OperationNotPermitted {
            context: format!("transfer to {address:#06x}"),
            errno,
        },
    }
}

fn nix_errno(errno: nix::errno::Errno) -> Errno {
    Errno::from_raw_os_error(errno as i32)
}

/// Build the descriptor pair for a combined write-then-read: output first,
/// input second, both at the resolved address. In 10-bit mode each message
/// additionally carries `I2C_M_TEN`, which the kernel requires per message.
fn build_combined(
    target: u16,
    mode: AddressMode,
    data_out: &[u8],
    data_in: &mut [u8],
) -> Result<[Message; 2]> {
    let oversized = |len: usize| {
        Error::Argument(format!("buffer of {len} bytes exceeds the message length field"))
    };
    let base_flags = match mode {
        AddressMode::SevenBit => 0,
        AddressMode::TenBit => I2C_M_TEN,
    };
    Ok([
        Message {
            addr: target,
            flags: base_flags,
            len: u16::try_from(data_out.len()).map_err(|_| oversized(data_out.len()))?,
            buf: data_out.as_ptr() as *mut u8,
        },
        Message {
            addr: target,
            flags: base_flags | I2C_M_RD,
            len: u16::try_from(data_in.len()).map_err(|_| oversized(data_in.len()))?,
            buf: data_in.as_mut_ptr(),
        },
    ])
}

/// I2C bus master bound to one i2c-dev character device.
///
/// The descriptor is exclusively owned and closed exactly once when the
/// instance drops, on every exit path. A failed transaction leaves the
/// descriptor open and usable for subsequent attempts.
pub struct I2c {
    fd: OwnedFd,
    path: PathBuf,
}

impl I2c {
    /// Open the bus character device (e.g. `/dev/i2c-1`) read/write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fd = rustix::fs::open(path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty()).map_err(
            |errno| {
                debug!("failed to open {}: {errno}", path.display());
                Error::Io(errno.into())
            },
        )?;
        Ok(Self {
            fd,
            path: path.to_owned(),
        })
    }

    /// Path of the underlying bus device.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn execute(
        &mut self,
        shape: TransferShape,
        target: u16,
        mode: AddressMode,
        data_out: &[u8],
        data_in: &mut [u8],
    ) -> Result<()> {
        match shape {
            TransferShape::WriteOnly => {
                rustix::io::write(&self.fd, data_out)
                    .map_err(|errno| self.transfer_failed(target, errno))?;
            }
            TransferShape::ReadOnly => {
                rustix::io::read(&self.fd, data_in)
                    .map_err(|errno| self.transfer_failed(target, errno))?;
            }
            TransferShape::WriteThenRead => {
                let mut msgs = build_combined(target, mode, data_out, data_in)?;
                let combined = CombinedRequest {
                    msgs: msgs.as_mut_ptr(),
                    nmsgs: msgs.len() as u32,
                };
                unsafe { ioctls::combined_transfer(self.fd.as_raw_fd(), &combined) }
                    .map_err(|e| self.transfer_failed(target, nix_errno(e)))?;
            }
        }
        Ok(())
    }

    fn transfer_failed(&self, target: u16, errno: Errno) -> Error {
        debug!(
            "transfer to {target:#06x} on {} failed: {errno}",
            self.path.display()
        );
        map_failure(Step::Transfer, errno, target)
    }
}

impl hw_trait::I2c for I2c {
    fn transaction(&mut self, address: u8, data_out: &[u8], data_in: &mut [u8]) -> Result<()> {
        // Two empty buffers denote no transfer at all; never touch the
        // device for it.
        if data_out.is_empty() && data_in.is_empty() {
            return Ok(());
        }

        let (mode, target) = resolve_address(address, data_out.first().copied())?;
        let shape = classify(data_out, data_in);
        trace!(
            "{}: {shape:?} target {target:#06x} ({mode:?}), {} out / {} in",
            self.path.display(),
            data_out.len(),
            data_in.len()
        );

        let raw_fd = self.fd.as_raw_fd();
        let ten_bit = mode == AddressMode::TenBit;
        if let Err(e) = unsafe { ioctls::set_ten_bit_mode(raw_fd, ten_bit as nix::libc::c_int) } {
            debug!("setting 10-bit mode ({ten_bit}) failed: {e}");
            return Err(map_failure(Step::AddressingMode, nix_errno(e), target));
        }
        if let Err(e) =
            unsafe { ioctls::set_target_address(raw_fd, nix::libc::c_int::from(target)) }
        {
            debug!("setting target address {target:#06x} failed: {e}");
            return Err(map_failure(Step::TargetAddress, nix_errno(e), target));
        }

        self.execute(shape, target, mode, data_out, data_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x50, Some(0x10), AddressMode::SevenBit, 0x50 ; "seven bit with output")]
    #[test_case(0x50, None, AddressMode::SevenBit, 0x50 ; "seven bit without output")]
    #[test_case(0x78, Some(0x34), AddressMode::TenBit, 0x7834 ; "ten bit prefix")]
    #[test_case(0x7A, Some(0xFF), AddressMode::TenBit, 0x7AFF ; "ten bit prefix with low bits set")]
    #[test_case(0xD0, Some(0x00), AddressMode::SevenBit, 0x50 ; "direction bit stripped in seven bit mode")]
    #[test_case(0x08, None, AddressMode::SevenBit, 0x08 ; "low seven bit address")]
    fn test_resolve_address(raw: u8, first: Option<u8>, mode: AddressMode, resolved: u16) {
        assert_eq!(resolve_address(raw, first).unwrap(), (mode, resolved));
    }

    #[test]
    fn test_ten_bit_requires_output_byte() {
        let err = resolve_address(0x78, None).unwrap_err();
        assert!(matches!(err, Error::Argument(_)), "got {err:?}");
    }

    #[test]
    fn test_resolution_matches_spec_scenario() {
        // Address 0x78 with output [0x34, 0xAB]: 10-bit mode, resolved
        // (0x78 << 8) | 0x34.
        let (mode, resolved) = resolve_address(0x78, Some(0x34)).unwrap();
        assert_eq!(mode, AddressMode::TenBit);
        assert_eq!(resolved, 0x7834);
    }

    #[test_case(&[0x10], &[], TransferShape::WriteOnly ; "write only")]
    #[test_case(&[], &[0u8; 2], TransferShape::ReadOnly ; "read only")]
    #[test_case(&[0x10], &[0u8; 4], TransferShape::WriteThenRead ; "write then read")]
    fn test_classify(data_out: &[u8], data_in: &[u8], shape: TransferShape) {
        assert_eq!(classify(data_out, data_in), shape);
    }

    #[test]
    fn test_combined_descriptors_are_out_then_in() {
        // Register-read idiom at 0x50: one-byte index write, four-byte read.
        let data_out = [0x10];
        let mut data_in = [0u8; 4];
        let msgs = build_combined(0x50, AddressMode::SevenBit, &data_out, &mut data_in).unwrap();

        assert_eq!(msgs[0].addr, 0x50);
        assert_eq!(msgs[0].flags, 0);
        assert_eq!(msgs[0].len, 1);

        assert_eq!(msgs[1].addr, 0x50);
        assert_eq!(msgs[1].flags, I2C_M_RD);
        assert_eq!(msgs[1].len, 4);
    }

    #[test]
    fn test_combined_descriptors_carry_ten_bit_flag() {
        let data_out = [0x34, 0xAB];
        let mut data_in = [0u8; 2];
        let msgs = build_combined(0x7834, AddressMode::TenBit, &data_out, &mut data_in).unwrap();

        assert_eq!(msgs[0].flags, I2C_M_TEN);
        assert_eq!(msgs[1].flags, I2C_M_TEN | I2C_M_RD);
        assert_eq!(msgs[0].addr, msgs[1].addr);
    }

    #[test]
    fn test_combined_rejects_oversized_buffer() {
        let data_out = vec![0u8; usize::from(u16::MAX) + 1];
        let mut data_in = [0u8; 1];
        let err = build_combined(0x50, AddressMode::SevenBit, &data_out, &mut data_in).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_failure_mapping_table() {
        let errno = Errno::REMOTEIO;
        assert!(matches!(
            map_failure(Step::AddressingMode, errno, 0x50),
            Error::OperationNotSupported { .. }
        ));
        assert!(matches!(
            map_failure(Step::TargetAddress, errno, 0x50),
            Error::NoSuchDevice { address: 0x50, .. }
        ));
        assert!(matches!(
            map_failure(Step::Transfer, errno, 0x50),
            Error::OperationNotPermitted { .. }
        ));
    }

    #[test]
    fn test_message_matches_kernel_layout() {
        // struct i2c_msg: addr/flags/len halfwords, then the buffer pointer
        // at pointer alignment.
        assert_eq!(std::mem::offset_of!(Message, addr), 0);
        assert_eq!(std::mem::offset_of!(Message, flags), 2);
        assert_eq!(std::mem::offset_of!(Message, len), 4);
        assert_eq!(std::mem::offset_of!(Message, buf), 8);
        assert_eq!(
            std::mem::size_of::<Message>(),
            8 + std::mem::size_of::<*mut u8>()
        );
    }
}
