//! # crashscope
//!
//! In-process crash reporting. When the process hits a fatal fault
//! (segmentation fault, bus error, illegal instruction, arithmetic fault,
//! `abort()`), crashscope walks the faulting thread's stack, resolves every
//! frame to a symbol and shows the report in a terminal dialog before the
//! process terminates.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crashscope::{CrashConfig, CrashError};
//!
//! match crashscope::install(CrashConfig::from_env()) {
//!     Ok(_) => {}
//!     // Hooks are installed, frames will show as raw addresses.
//!     Err(CrashError::SymbolEngine(_)) => {}
//!     Err(err) => eprintln!("crash reporting unavailable: {err}"),
//! }
//! ```
//!
//! Hosted runtimes that know their own code (JIT frames, scripts) register
//! an external resolver, which is consulted before native symbols:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crashscope::{Address, CrashHandler};
//!
//! if let Some(handler) = CrashHandler::global() {
//!     handler.register_external_resolver(Some(Arc::new(|address: Address| {
//!         (address.value() == 0x7000_0000).then(|| "Game.Update()".to_string())
//!     })));
//! }
//! ```
//!
//! The same operations are exported with a C ABI in [`ffi`].

#![allow(unsafe_code)] // C ABI entry points dereference caller-provided pointers

pub mod ffi;

pub use crashscope_core::{
    Address, CrashConfig, CrashError, CrashHandler, CrashReport, ExtraInfoSupplier, HandlerState, Presenter,
    PresenterKind, Result, StderrPresenter, SymbolResolver,
};
pub use crashscope_ui::TuiPresenter;

/// Presenter selected by `kind`
#[must_use]
pub fn presenter_for(kind: PresenterKind) -> Box<dyn Presenter>
{
    match kind {
        PresenterKind::Tui => Box::new(TuiPresenter::new()),
        PresenterKind::Stderr => Box::new(StderrPresenter),
    }
}

/// Install the global crash handler and its fault hooks
///
/// The first call builds the handler from `config`; later calls reuse it
/// and ignore `config`.
///
/// # Errors
///
/// - `CrashError::SymbolEngine`: the hooks are installed but frames will be
///   reported as raw addresses; the handler is still reachable through
///   [`CrashHandler::global`].
/// - `CrashError::HookInstall`: nothing was installed.
/// - `CrashError::InvalidState`: the global handler was already shut down.
pub fn install(config: CrashConfig) -> Result<&'static CrashHandler>
{
    let handler = CrashHandler::install_global(move || {
        let presenter = presenter_for(config.presenter);
        CrashHandler::new(config, presenter)
    });
    handler.initialize(None)?;
    Ok(handler)
}

/// Remove the global handler's hooks, if one was installed
pub fn shutdown()
{
    if let Some(handler) = CrashHandler::global() {
        handler.shutdown();
    }
}
