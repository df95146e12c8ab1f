//! # Fault Interception
//!
//! Process-wide hooks that catch fatal faults and hand them to the crash
//! handler.
//!
//! Two hooks are installed:
//!
//! - **first-chance**: synchronous fault signals (`SIGSEGV`, `SIGBUS`,
//!   `SIGFPE`, `SIGILL`, `SIGSYS`, `SIGTRAP`). Only program faults are
//!   admitted; breakpoint and single-step traps go straight to whatever
//!   disposition was installed before us so debuggers keep working.
//! - **last-resort**: `SIGABRT`, raised when nothing else disposed of a
//!   failure (`abort()`, a panic while panicking, `panic = "abort"`).
//!   Everything reaching it is admitted.
//!
//! ## Hand-off
//!
//! The signal handler itself never walks, symbolizes or allocates. It
//! copies a [`FaultContext`] into a static slot, wakes the
//! `crashscope-reporter` thread through a pipe and blocks until that thread
//! reports completion. Only the first admitted fault is dispatched; other
//! threads that fault meanwhile wait for it to finish and then fall through
//! to their previous disposition.
//!
//! After dispatch, control always goes to the previous disposition: a
//! previous handler function is called, a default action is restored and
//! the signal re-raised, an ignored signal returns.

use std::sync::Arc;

use crate::types::{FaultCategory, FaultContext};

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{prepare_thread, Interceptor, ALT_STACK_SIZE};

/// Callback run on the reporter thread for every dispatched fault
pub type FaultDispatch = Arc<dyn Fn(&FaultContext) + Send + Sync>;

/// Which hook observed a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind
{
    FirstChance,
    LastResort,
}

impl HookKind
{
    /// Whether a fault of `category` seen by this hook is handled
    ///
    /// ```rust
    /// use crashscope_core::interceptor::HookKind;
    /// use crashscope_core::types::FaultCategory;
    ///
    /// assert!(!HookKind::FirstChance.admits(FaultCategory::Breakpoint));
    /// assert!(HookKind::LastResort.admits(FaultCategory::Breakpoint));
    /// ```
    pub const fn admits(self, category: FaultCategory) -> bool
    {
        match self {
            HookKind::FirstChance => category.is_program_fault(),
            HookKind::LastResort => true,
        }
    }

    /// Signals this hook is installed for
    pub fn signals(self) -> &'static [(i32, &'static str)]
    {
        match self {
            HookKind::FirstChance => FIRST_CHANCE_SIGNALS,
            HookKind::LastResort => LAST_RESORT_SIGNALS,
        }
    }
}

#[cfg(unix)]
const FIRST_CHANCE_SIGNALS: &[(i32, &str)] = &[
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGSYS, "SIGSYS"),
    (libc::SIGTRAP, "SIGTRAP"),
];

#[cfg(unix)]
const LAST_RESORT_SIGNALS: &[(i32, &str)] = &[(libc::SIGABRT, "SIGABRT")];

#[cfg(not(unix))]
const FIRST_CHANCE_SIGNALS: &[(i32, &str)] = &[];

#[cfg(not(unix))]
const LAST_RESORT_SIGNALS: &[(i32, &str)] = &[];

#[cfg(not(unix))]
mod unsupported
{
    use super::FaultDispatch;
    use crate::error::{CrashError, Result};

    pub const ALT_STACK_SIZE: usize = 64 * 1024;

    /// Fault hooks are not available on this target
    pub struct Interceptor;

    impl Interceptor
    {
        pub fn install(_dispatch: FaultDispatch) -> Result<Self>
        {
            Err(CrashError::HookInstall {
                signal: "fault signals",
                source: std::io::Error::from(std::io::ErrorKind::Unsupported),
            })
        }

        pub fn reassert_priority(&self) -> Result<()>
        {
            Ok(())
        }

        pub fn uninstall(self) {}
    }

    pub fn prepare_thread() -> Result<()>
    {
        Ok(())
    }
}

#[cfg(not(unix))]
pub use unsupported::{prepare_thread, Interceptor, ALT_STACK_SIZE};

#[cfg(test)]
mod tests
{
    use super::*;

    const ALL: [FaultCategory; 18] = [
        FaultCategory::AccessViolation,
        FaultCategory::StackOverflow,
        FaultCategory::Misalignment,
        FaultCategory::BusError,
        FaultCategory::IllegalInstruction,
        FaultCategory::PrivilegedInstruction,
        FaultCategory::IntDivideByZero,
        FaultCategory::IntOverflow,
        FaultCategory::FloatDivideByZero,
        FaultCategory::FloatOverflow,
        FaultCategory::FloatUnderflow,
        FaultCategory::FloatInexact,
        FaultCategory::FloatInvalid,
        FaultCategory::FloatFault,
        FaultCategory::BadSystemCall,
        FaultCategory::Abort,
        FaultCategory::Breakpoint,
        FaultCategory::SingleStep,
    ];

    #[test]
    fn test_first_chance_filters_debugger_traps()
    {
        for category in ALL {
            let expected = !matches!(category, FaultCategory::Breakpoint | FaultCategory::SingleStep);
            assert_eq!(HookKind::FirstChance.admits(category), expected, "{category}");
        }
    }

    #[test]
    fn test_last_resort_admits_everything()
    {
        assert!(ALL.iter().all(|category| HookKind::LastResort.admits(*category)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hooked_signals()
    {
        let first: Vec<i32> = HookKind::FirstChance.signals().iter().map(|(sig, _)| *sig).collect();
        assert!(first.contains(&libc::SIGSEGV));
        assert!(!first.contains(&libc::SIGABRT));
        assert_eq!(HookKind::LastResort.signals(), &[(libc::SIGABRT, "SIGABRT")]);
    }
}
