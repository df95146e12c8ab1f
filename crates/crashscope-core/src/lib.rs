//! # crashscope-core
//!
//! In-process crash capture: fault interception, stack walking, symbol
//! resolution and report building.
//!
//! When a thread faults, the pipeline is:
//!
//! 1. the [`interceptor`] hook captures the registers and hands the fault
//!    to the reporter thread
//! 2. the [`handler`] trips its one-shot guard and walks the stack
//!    ([`unwind`]), describing each frame through the [`symbols`] chain
//! 3. the [`report`] is built and shown by a [`present::Presenter`]
//! 4. the signal goes on to its previous disposition and the process ends
//!
//! ## Platform Support
//!
//! - **Linux**: `/proc/self/maps`, `process_vm_readv`, POSIX signals
//! - **macOS**: dyld image list, Mach VM reads, POSIX signals
//! - Other targets build, but hooks cannot be installed
//!
//! ## Why unsafe code is needed
//!
//! Signal handlers, `sigaltstack`, reading `ucontext_t` and probing memory
//! that may be unmapped are all raw OS interfaces. The unsafe calls are kept
//! in [`interceptor`], [`memory`], [`symbols::modules`] and the register
//! capture, behind safe functions.

#![allow(unsafe_code)] // Required for signal handling and raw memory access

pub mod config;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod memory;
pub mod present;
pub mod report;
pub mod symbols;
pub mod types;
pub mod unwind;

pub use config::{CrashConfig, PresenterKind};
// Re-export commonly used types
pub use error::{CrashError, CrashResult, Result};
pub use handler::{CrashHandler, HandlerState};
pub use memory::{LocalMemory, MemoryAccess};
pub use present::{Presenter, StderrPresenter};
pub use report::{CrashReport, ExtraInfoSupplier, ReportBuilder};
pub use symbols::{SymbolResolver, SymbolSearchPath};
pub use types::{Address, FaultCategory, FaultContext, Registers, ResolvedFrame};
