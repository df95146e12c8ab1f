//! Fault categories and the context captured when one is delivered.

use std::fmt;

use super::{Address, Registers};

/// Distance from the stack pointer within which a `SIGSEGV` is classified as
/// stack exhaustion.
pub const STACK_OVERFLOW_WINDOW: u64 = 64 * 1024;

/// What kind of fault was delivered
///
/// Categories are derived from the signal number and `si_code`. Each one maps
/// to a stable 32-bit exception code (see [`FaultCategory::code`]) so report
/// parsers see the same value on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory
{
    /// Read, write or execute of an unmapped or protected address
    AccessViolation,
    /// Access violation inside the guard window below the stack pointer
    StackOverflow,
    /// Misaligned access (`BUS_ADRALN`)
    Misalignment,
    /// Bus error on a mapped object (truncated file, hardware error)
    BusError,
    /// Undefined or malformed instruction
    IllegalInstruction,
    /// Privileged opcode or register used from user mode
    PrivilegedInstruction,
    /// Integer division by zero
    IntDivideByZero,
    /// Integer overflow trap
    IntOverflow,
    /// Floating point division by zero
    FloatDivideByZero,
    /// Floating point overflow
    FloatOverflow,
    /// Floating point underflow
    FloatUnderflow,
    /// Inexact floating point result
    FloatInexact,
    /// Invalid floating point operation
    FloatInvalid,
    /// Any other floating point exception
    FloatFault,
    /// Bad system call (`SIGSYS`)
    BadSystemCall,
    /// Abnormal termination (`SIGABRT`) reaching the last-resort hook
    Abort,
    /// Software breakpoint trap
    Breakpoint,
    /// Single-step trap
    SingleStep,
}

impl FaultCategory
{
    /// Stable exception code printed on the `Exception Code:` line
    pub const fn code(self) -> u32
    {
        match self {
            FaultCategory::AccessViolation => 0xc000_0005,
            FaultCategory::StackOverflow => 0xc000_00fd,
            FaultCategory::Misalignment => 0x8000_0002,
            FaultCategory::BusError => 0xc000_0006,
            FaultCategory::IllegalInstruction => 0xc000_001d,
            FaultCategory::PrivilegedInstruction => 0xc000_0096,
            FaultCategory::IntDivideByZero => 0xc000_0094,
            FaultCategory::IntOverflow => 0xc000_0095,
            FaultCategory::FloatDivideByZero => 0xc000_008e,
            FaultCategory::FloatOverflow => 0xc000_0091,
            FaultCategory::FloatUnderflow => 0xc000_0093,
            FaultCategory::FloatInexact => 0xc000_008f,
            FaultCategory::FloatInvalid => 0xc000_0090,
            FaultCategory::FloatFault => 0xc000_02b4,
            FaultCategory::BadSystemCall => 0xc000_001c,
            FaultCategory::Abort => 0x4000_0015,
            FaultCategory::Breakpoint => 0x8000_0003,
            FaultCategory::SingleStep => 0x8000_0004,
        }
    }

    /// `true` for genuine program-correctness faults
    ///
    /// Debugger markers (breakpoint and single-step traps) are the only
    /// categories the first-chance hook passes through unhandled.
    pub const fn is_program_fault(self) -> bool
    {
        !matches!(self, FaultCategory::Breakpoint | FaultCategory::SingleStep)
    }

    /// Short human readable name
    pub const fn name(self) -> &'static str
    {
        match self {
            FaultCategory::AccessViolation => "access violation",
            FaultCategory::StackOverflow => "stack overflow",
            FaultCategory::Misalignment => "datatype misalignment",
            FaultCategory::BusError => "bus error",
            FaultCategory::IllegalInstruction => "illegal instruction",
            FaultCategory::PrivilegedInstruction => "privileged instruction",
            FaultCategory::IntDivideByZero => "integer divide by zero",
            FaultCategory::IntOverflow => "integer overflow",
            FaultCategory::FloatDivideByZero => "float divide by zero",
            FaultCategory::FloatOverflow => "float overflow",
            FaultCategory::FloatUnderflow => "float underflow",
            FaultCategory::FloatInexact => "float inexact result",
            FaultCategory::FloatInvalid => "float invalid operation",
            FaultCategory::FloatFault => "floating point fault",
            FaultCategory::BadSystemCall => "bad system call",
            FaultCategory::Abort => "abort",
            FaultCategory::Breakpoint => "breakpoint",
            FaultCategory::SingleStep => "single step",
        }
    }

    /// Classify a delivered signal
    ///
    /// Returns `None` for signals that are not fault signals. `fault_address`
    /// and `sp` are only used to tell stack exhaustion apart from other
    /// access violations.
    ///
    /// ```rust
    /// use crashscope_core::types::{Address, FaultCategory};
    ///
    /// let category = FaultCategory::from_signal(libc::SIGSEGV, 1, Address::new(0x10), Address::new(0x7fff_0000));
    /// assert_eq!(category, Some(FaultCategory::AccessViolation));
    /// ```
    pub fn from_signal(signal: i32, si_code: i32, fault_address: Address, sp: Address) -> Option<Self>
    {
        let category = match signal {
            libc::SIGSEGV => {
                if is_near_stack_pointer(fault_address, sp) {
                    FaultCategory::StackOverflow
                } else {
                    FaultCategory::AccessViolation
                }
            }
            libc::SIGBUS => match si_code {
                si_codes::BUS_ADRALN => FaultCategory::Misalignment,
                _ => FaultCategory::BusError,
            },
            libc::SIGFPE => match si_code {
                si_codes::FPE_INTDIV => FaultCategory::IntDivideByZero,
                si_codes::FPE_INTOVF => FaultCategory::IntOverflow,
                si_codes::FPE_FLTDIV => FaultCategory::FloatDivideByZero,
                si_codes::FPE_FLTOVF => FaultCategory::FloatOverflow,
                si_codes::FPE_FLTUND => FaultCategory::FloatUnderflow,
                si_codes::FPE_FLTRES => FaultCategory::FloatInexact,
                si_codes::FPE_FLTINV => FaultCategory::FloatInvalid,
                _ => FaultCategory::FloatFault,
            },
            libc::SIGILL => match si_code {
                si_codes::ILL_PRVOPC | si_codes::ILL_PRVREG => FaultCategory::PrivilegedInstruction,
                _ => FaultCategory::IllegalInstruction,
            },
            libc::SIGTRAP => match si_code {
                si_codes::TRAP_TRACE => FaultCategory::SingleStep,
                _ => FaultCategory::Breakpoint,
            },
            libc::SIGSYS => FaultCategory::BadSystemCall,
            libc::SIGABRT => FaultCategory::Abort,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for FaultCategory
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({:#x})", self.name(), self.code())
    }
}

fn is_near_stack_pointer(fault_address: Address, sp: Address) -> bool
{
    if fault_address.is_zero() || sp.is_zero() {
        return false;
    }
    fault_address.value().abs_diff(sp.value()) <= STACK_OVERFLOW_WINDOW
}

/// `si_code` values differ between Linux and the BSD family.
#[allow(dead_code)]
mod si_codes
{
    pub const BUS_ADRALN: i32 = 1;
    pub const TRAP_TRACE: i32 = 2;

    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
    mod values
    {
        pub const FPE_INTDIV: i32 = 1;
        pub const FPE_INTOVF: i32 = 2;
        pub const FPE_FLTDIV: i32 = 3;
        pub const FPE_FLTOVF: i32 = 4;
        pub const FPE_FLTUND: i32 = 5;
        pub const FPE_FLTRES: i32 = 6;
        pub const FPE_FLTINV: i32 = 7;
        pub const ILL_PRVOPC: i32 = 5;
        pub const ILL_PRVREG: i32 = 6;
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    mod values
    {
        pub const FPE_FLTDIV: i32 = 1;
        pub const FPE_FLTOVF: i32 = 2;
        pub const FPE_FLTUND: i32 = 3;
        pub const FPE_FLTRES: i32 = 4;
        pub const FPE_FLTINV: i32 = 5;
        pub const FPE_INTDIV: i32 = 7;
        pub const FPE_INTOVF: i32 = 8;
        pub const ILL_PRVOPC: i32 = 3;
        pub const ILL_PRVREG: i32 = 6;
    }

    pub use values::*;
}

/// Everything captured about a fault inside the signal hook
///
/// Plain `Copy` data so the hook can write it into a preallocated slot
/// without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultContext
{
    /// Classified fault kind
    pub category: FaultCategory,
    /// Raw signal number
    pub signal: i32,
    /// Data address from `si_addr` (zero when the signal carries none)
    pub fault_address: Address,
    /// Registers of the faulting thread
    pub registers: Registers,
    /// OS thread id of the faulting thread
    pub thread_id: u64,
}

impl FaultContext
{
    /// Address printed on the `Exception Address:` line
    ///
    /// This is the instruction that faulted. When the context carries no
    /// program counter the data address is used instead.
    pub fn exception_address(&self) -> Address
    {
        if self.registers.pc.is_zero() {
            self.fault_address
        } else {
            self.registers.pc
        }
    }

    /// Exception code of the category
    pub fn code(&self) -> u32
    {
        self.category.code()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_debugger_traps_are_not_program_faults()
    {
        assert!(!FaultCategory::Breakpoint.is_program_fault());
        assert!(!FaultCategory::SingleStep.is_program_fault());
        assert!(FaultCategory::AccessViolation.is_program_fault());
        assert!(FaultCategory::StackOverflow.is_program_fault());
        assert!(FaultCategory::IntDivideByZero.is_program_fault());
        assert!(FaultCategory::Abort.is_program_fault());
    }

    #[test]
    fn test_segv_near_stack_pointer_is_stack_overflow()
    {
        let sp = Address::new(0x7fff_0000_0000);
        let category = FaultCategory::from_signal(libc::SIGSEGV, 1, sp - 0x100, sp);
        assert_eq!(category, Some(FaultCategory::StackOverflow));

        let far = FaultCategory::from_signal(libc::SIGSEGV, 1, Address::new(0x10), sp);
        assert_eq!(far, Some(FaultCategory::AccessViolation));
    }

    #[test]
    fn test_trap_codes()
    {
        assert_eq!(
            FaultCategory::from_signal(libc::SIGTRAP, si_codes::TRAP_TRACE, Address::ZERO, Address::ZERO),
            Some(FaultCategory::SingleStep)
        );
        assert_eq!(
            FaultCategory::from_signal(libc::SIGTRAP, 1, Address::ZERO, Address::ZERO),
            Some(FaultCategory::Breakpoint)
        );
    }

    #[test]
    fn test_fpe_codes()
    {
        assert_eq!(
            FaultCategory::from_signal(libc::SIGFPE, si_codes::FPE_INTDIV, Address::ZERO, Address::ZERO),
            Some(FaultCategory::IntDivideByZero)
        );
        assert_eq!(
            FaultCategory::from_signal(libc::SIGFPE, 0, Address::ZERO, Address::ZERO),
            Some(FaultCategory::FloatFault)
        );
    }

    #[test]
    fn test_non_fault_signal_is_ignored()
    {
        assert_eq!(FaultCategory::from_signal(libc::SIGINT, 0, Address::ZERO, Address::ZERO), None);
    }

    #[test]
    fn test_exception_address_prefers_pc()
    {
        let mut ctx = FaultContext {
            category: FaultCategory::AccessViolation,
            signal: libc::SIGSEGV,
            fault_address: Address::new(0x10),
            registers: Registers::new(),
            thread_id: 1,
        };
        assert_eq!(ctx.exception_address(), Address::new(0x10));

        ctx.registers.pc = Address::new(0x4000);
        assert_eq!(ctx.exception_address(), Address::new(0x4000));
        assert_eq!(ctx.code(), 0xc000_0005);
    }
}
