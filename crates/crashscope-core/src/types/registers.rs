//! Register snapshot captured at the point of failure.

use std::fmt;

use super::Address;

/// CPU architecture of the running process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM. Frame records are `[x29, x30]` pairs.
    Arm64,
    /// 64-bit x86. Frame records are `[rbp, return address]` pairs.
    X86_64,
    /// Any other architecture; only the faulting PC is reported.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture this crate was compiled for
    ///
    /// ```rust
    /// use crashscope_core::types::Architecture;
    ///
    /// let arch = Architecture::current();
    /// assert!(arch.supports_frame_walk() || matches!(arch, Architecture::Unknown(_)));
    /// ```
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }
        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }
        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Whether frame records can be followed on this architecture
    pub const fn supports_frame_walk(self) -> bool
    {
        matches!(self, Architecture::Arm64 | Architecture::X86_64)
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// The registers the stack walker needs
///
/// Only the control registers are kept; general purpose registers are not
/// needed to follow a frame-pointer chain.
///
/// - `pc`: faulting instruction (RIP / PC)
/// - `sp`: stack pointer (RSP / SP)
/// - `fp`: frame pointer (RBP / X29)
/// - `lr`: link register (X30), zero on x86-64
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers
{
    /// Program counter
    pub pc: Address,
    /// Stack pointer
    pub sp: Address,
    /// Frame pointer
    pub fp: Address,
    /// Link register (zero when the architecture has none)
    pub lr: Address,
}

impl Registers
{
    /// Snapshot with every register zeroed
    pub const fn new() -> Self
    {
        Self {
            pc: Address::ZERO,
            sp: Address::ZERO,
            fp: Address::ZERO,
            lr: Address::ZERO,
        }
    }

    /// Capture the caller's own registers
    ///
    /// `pc` is the return address of this call, so the first frame names the
    /// caller. Used for previews and tests; faults capture registers from
    /// the signal context instead.
    #[inline(never)]
    #[must_use]
    pub fn capture() -> Self
    {
        let mut regs = Self::new();

        #[cfg(target_arch = "x86_64")]
        // SAFETY: reads rbp/rsp and the saved return address of our own frame;
        // frame pointers are forced on for the workspace.
        unsafe {
            let fp: u64;
            let sp: u64;
            std::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
            std::arch::asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
            if fp != 0 {
                let saved_fp = std::ptr::read_volatile(fp as *const u64);
                let ret = std::ptr::read_volatile((fp + 8) as *const u64);
                regs.pc = Address::new(ret);
                regs.fp = Address::new(saved_fp);
                regs.sp = Address::new(fp + 16);
            } else {
                regs.sp = Address::new(sp);
            }
        }

        #[cfg(target_arch = "aarch64")]
        // SAFETY: reads x29/sp and the frame record of our own frame.
        unsafe {
            let fp: u64;
            let sp: u64;
            std::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
            std::arch::asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
            if fp != 0 {
                let saved_fp = std::ptr::read_volatile(fp as *const u64);
                let ret = std::ptr::read_volatile((fp + 8) as *const u64);
                regs.pc = Address::new(ret);
                regs.fp = Address::new(saved_fp);
                regs.sp = Address::new(fp + 16);
                regs.lr = Address::new(ret);
            } else {
                regs.sp = Address::new(sp);
            }
        }

        regs
    }
}
