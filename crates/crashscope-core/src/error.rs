//! # Error Types
//!
//! General error handling for the crash handler.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Errors only surface on the lifecycle surface (`initialize`, `shutdown`,
//! configuration). Everything on the fault path degrades to less information
//! instead of returning an error to the faulting thread.

use thiserror::Error;

use crate::types::Address;

/// Main error type for crash handler operations
///
/// ## Error Categories
///
/// 1. **Configuration errors**: `SymbolEngine`, `InvalidArgument`
/// 2. **Installation errors**: `HookInstall`, `InvalidState`
/// 3. **Symbol data errors**: `Image`
/// 4. **Memory errors**: `Memory` (unreadable frame while walking)
/// 5. **I/O errors**: `Io`
#[derive(Error, Debug)]
pub enum CrashError
{
    /// The native symbol engine could not be initialized
    ///
    /// This happens when the loaded module list cannot be enumerated
    /// (for example `/proc/self/maps` is not readable inside a sandbox).
    /// Fault hooks are still installed; resolution degrades to bare
    /// addresses.
    #[error("Symbol engine initialization failed: {0}")]
    SymbolEngine(String),

    /// Installing a fault hook failed
    ///
    /// Carries the signal that could not be hooked and the OS error.
    /// When this is returned no hook from the failing call stays installed.
    #[error("Failed to install fault hook for {signal}: {source}")]
    HookInstall
    {
        /// Signal name (e.g. `SIGSEGV`)
        signal: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Operation is not valid in the current lifecycle state
    ///
    /// For example calling `initialize()` on a handler that was shut down.
    #[error("Invalid handler state: {0}")]
    InvalidState(String),

    /// Invalid argument passed to a handler function
    ///
    /// Examples:
    /// - A symbol search directory that is not valid UTF-8 when crossing the C ABI
    /// - A malformed address string on the command line
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A module image could not be parsed or its debug info could not be loaded
    #[error("Failed to load image {path}: {reason}")]
    Image
    {
        /// Path of the image on disk
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Memory at the given address could not be read
    ///
    /// The stack walker treats this as the end of the stack.
    #[error("Unreadable memory at {address}")]
    Memory
    {
        /// Address of the failed read
        address: Address,
    },

    /// I/O error (for file operations, pipes, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, CrashError>`
///
/// ```rust
/// use crashscope_core::error::CrashResult;
/// fn foo() -> CrashResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type CrashResult<T> = std::result::Result<T, CrashError>;

/// Short alias used throughout the crate.
pub type Result<T> = CrashResult<T>;
