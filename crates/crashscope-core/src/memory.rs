//! # Memory Access
//!
//! Fault-tolerant reads of the current process's own memory.
//!
//! The stack walker follows frame pointers that may be garbage after a
//! fault. Dereferencing them directly could raise a second fault inside the
//! handler, so every read goes through the kernel, which reports a bad
//! address as `EFAULT` instead of delivering a signal:
//!
//! - **Linux**: `process_vm_readv` on our own pid
//! - **macOS**: `mach_vm_read_overwrite` on `mach_task_self()`
//! - **Fallback**: write the range into a pipe, then read it back

use std::io;

use crate::error::{CrashError, Result};
use crate::types::Address;

/// Minimal memory accessor required for stack walking.
pub trait MemoryAccess
{
    fn read_u64(&self, address: Address) -> Result<u64>;
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for &M
{
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        (**self).read_u64(address)
    }
}

/// Reads memory of the running process without risking a fault
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMemory;

impl LocalMemory
{
    #[must_use]
    pub const fn new() -> Self
    {
        Self
    }
}

impl MemoryAccess for LocalMemory
{
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        if address.is_zero() || address.value() % 8 != 0 {
            return Err(CrashError::Memory { address });
        }

        let mut buf = [0u8; 8];
        read_into(address, &mut buf)?;
        Ok(u64::from_ne_bytes(buf))
    }
}

#[cfg(target_os = "linux")]
fn read_into(address: Address, dst: &mut [u8]) -> Result<()>
{
    let local = libc::iovec {
        iov_base: dst.as_mut_ptr().cast(),
        iov_len: dst.len(),
    };
    let remote = libc::iovec {
        iov_base: address.value() as *mut libc::c_void,
        iov_len: dst.len(),
    };

    // SAFETY: both iovecs describe exactly one buffer; the kernel validates the
    // remote range and fails with EFAULT rather than faulting.
    let copied = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
    if copied == dst.len() as isize {
        return Ok(());
    }

    if copied < 0 {
        let err = io::Error::last_os_error();
        if matches!(err.raw_os_error(), Some(libc::ENOSYS | libc::EPERM)) {
            // Seccomp or an old kernel; the pipe probe still works there.
            return read_via_pipe(address, dst);
        }
    }

    Err(CrashError::Memory { address })
}

#[cfg(target_os = "macos")]
fn read_into(address: Address, dst: &mut [u8]) -> Result<()>
{
    use mach2::kern_return::KERN_SUCCESS;
    use mach2::traps::mach_task_self;
    use mach2::vm::mach_vm_read_overwrite;
    use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t};

    let mut actual: mach_vm_size_t = 0;
    // SAFETY: the destination buffer is valid for `dst.len()` bytes; the kernel
    // reports an unmapped source as an error code.
    let result = unsafe {
        mach_vm_read_overwrite(
            mach_task_self(),
            address.value() as mach_vm_address_t,
            dst.len() as mach_vm_size_t,
            dst.as_mut_ptr() as mach_vm_address_t,
            &mut actual,
        )
    };

    if result == KERN_SUCCESS && actual as usize == dst.len() {
        Ok(())
    } else {
        Err(CrashError::Memory { address })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn read_into(address: Address, dst: &mut [u8]) -> Result<()>
{
    read_via_pipe(address, dst)
}

/// Copy `dst.len()` bytes at `address` through a pipe.
///
/// `write(2)` copies from our address space in kernel mode and returns
/// `EFAULT` for unreadable memory.
#[cfg_attr(target_os = "macos", allow(dead_code))]
fn read_via_pipe(address: Address, dst: &mut [u8]) -> Result<()>
{
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by us.
    let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    // SAFETY: the kernel validates the source range.
    let written = unsafe { libc::write(writer.as_raw_fd(), address.value() as *const libc::c_void, dst.len()) };
    if written != dst.len() as isize {
        return Err(CrashError::Memory { address });
    }

    // SAFETY: `dst` is valid for `dst.len()` bytes.
    let read = unsafe { libc::read(reader.as_raw_fd(), dst.as_mut_ptr().cast(), dst.len()) };
    if read == dst.len() as isize {
        Ok(())
    } else {
        Err(CrashError::Memory { address })
    }
}
