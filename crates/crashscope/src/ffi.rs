//! # C ABI
//!
//! Entry points for hosts that are not written in Rust, typically a managed
//! runtime that embeds crashscope as a `cdylib` and wants its own frames
//! named in reports.
//!
//! ## Strings
//!
//! Paths passed in are NUL-terminated UTF-8. Strings returned by callbacks
//! are copied before the callback's caller returns, so a callback may hand
//! out a buffer it reuses on the next call. A null return means "no
//! answer".
//!
//! ## Return codes
//!
//! | code | meaning |
//! |------|---------|
//! | `0`  | success |
//! | `1`  | hooks installed, native symbols unavailable |
//! | `-1` | invalid argument |
//! | `-2` | hooks could not be installed, or the handler was shut down |

use std::ffi::{c_char, c_int, CStr};
use std::path::PathBuf;
use std::sync::Arc;

use crashscope_core::{Address, CrashConfig, CrashError, CrashHandler, ExtraInfoSupplier, SymbolResolver};
use crashscope_utils::{debug, warn};

/// Resolver callback: address in, NUL-terminated description or null out
pub type ResolverCallback = extern "C" fn(address: u64) -> *const c_char;

/// Extra-info callback: NUL-terminated text or null
pub type ExtraInfoCallback = extern "C" fn() -> *const c_char;

pub const CRASHSCOPE_OK: c_int = 0;
pub const CRASHSCOPE_DEGRADED: c_int = 1;
pub const CRASHSCOPE_INVALID_ARGUMENT: c_int = -1;
pub const CRASHSCOPE_FAILED: c_int = -2;

/// Copy a callback result into an owned string
///
/// # Safety
///
/// `ptr` is null or points to a NUL-terminated string that stays valid for
/// the duration of this call.
unsafe fn owned_string(ptr: *const c_char) -> Option<String>
{
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (!text.is_empty()).then_some(text)
}

/// Read a path argument; `Ok(None)` for null
///
/// # Safety
///
/// Same contract as [`owned_string`].
unsafe fn path_arg(ptr: *const c_char) -> Result<Option<PathBuf>, CrashError>
{
    if ptr.is_null() {
        return Ok(None);
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let raw = unsafe { CStr::from_ptr(ptr) };
    let path = raw
        .to_str()
        .map_err(|err| CrashError::InvalidArgument(format!("path is not UTF-8: {err}")))?;
    Ok((!path.is_empty()).then(|| PathBuf::from(path)))
}

/// [`SymbolResolver`] backed by a C callback
#[derive(Debug, Clone, Copy)]
pub struct CallbackResolver(pub ResolverCallback);

impl SymbolResolver for CallbackResolver
{
    fn resolve(&self, address: Address) -> Option<String>
    {
        // SAFETY: the registered callback returns null or a NUL-terminated
        // string valid until it is called again.
        unsafe { owned_string((self.0)(address.value())) }
    }
}

/// [`ExtraInfoSupplier`] backed by a C callback
#[derive(Debug, Clone, Copy)]
pub struct CallbackExtraInfo(pub ExtraInfoCallback);

impl ExtraInfoSupplier for CallbackExtraInfo
{
    fn extra_info(&self) -> Option<String>
    {
        // SAFETY: as for `CallbackResolver`.
        unsafe { owned_string((self.0)()) }
    }
}

fn status(result: &crashscope_core::Result<()>) -> c_int
{
    match result {
        Ok(()) => CRASHSCOPE_OK,
        Err(CrashError::SymbolEngine(_)) => CRASHSCOPE_DEGRADED,
        Err(CrashError::InvalidArgument(_)) => CRASHSCOPE_INVALID_ARGUMENT,
        Err(_) => CRASHSCOPE_FAILED,
    }
}

/// Install crash handling
///
/// `search_path` is an extra directory searched for debug files; null uses
/// `CRASHSCOPE_SYMBOL_PATH`. Calling it again returns the status of the
/// call that installed the hooks, so `1` stays `1`.
///
/// # Safety
///
/// `search_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn crashscope_init(search_path: *const c_char) -> c_int
{
    // SAFETY: forwarded caller contract.
    let base = match unsafe { path_arg(search_path) } {
        Ok(base) => base,
        Err(err) => {
            warn!("crashscope_init: {err}");
            return CRASHSCOPE_INVALID_ARGUMENT;
        }
    };

    let handler = CrashHandler::install_global(|| {
        let config = CrashConfig::from_env();
        let presenter = crate::presenter_for(config.presenter);
        CrashHandler::new(config, presenter)
    });
    let result = handler.initialize(base.as_deref());
    if let Err(err) = &result {
        warn!("crashscope_init: {err}");
    }
    status(&result)
}

/// Remove the fault hooks; safe to call more than once
#[no_mangle]
pub extern "C" fn crashscope_shutdown()
{
    crate::shutdown();
}

/// Register (or, with null, clear) the external symbol resolver
#[no_mangle]
pub extern "C" fn crashscope_register_symbol_resolver(callback: Option<ResolverCallback>) -> c_int
{
    let Some(handler) = CrashHandler::global() else {
        debug!("resolver registered before crashscope_init");
        return CRASHSCOPE_FAILED;
    };
    handler.register_external_resolver(callback.map(|f| Arc::new(CallbackResolver(f)) as Arc<dyn SymbolResolver>));
    CRASHSCOPE_OK
}

/// Register (or, with null, clear) the extra-info supplier
#[no_mangle]
pub extern "C" fn crashscope_register_extra_info(callback: Option<ExtraInfoCallback>) -> c_int
{
    let Some(handler) = CrashHandler::global() else {
        debug!("extra info registered before crashscope_init");
        return CRASHSCOPE_FAILED;
    };
    handler.register_extra_info_supplier(callback.map(|f| Arc::new(CallbackExtraInfo(f)) as Arc<dyn ExtraInfoSupplier>));
    CRASHSCOPE_OK
}

/// Append a directory to the symbol search path
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn crashscope_set_symbol_path(path: *const c_char) -> c_int
{
    // SAFETY: forwarded caller contract.
    let dir = match unsafe { path_arg(path) } {
        Ok(Some(dir)) => dir,
        Ok(None) => return CRASHSCOPE_INVALID_ARGUMENT,
        Err(err) => {
            warn!("crashscope_set_symbol_path: {err}");
            return CRASHSCOPE_INVALID_ARGUMENT;
        }
    };
    let Some(handler) = CrashHandler::global() else {
        return CRASHSCOPE_FAILED;
    };
    handler.set_symbol_search_path(dir);
    CRASHSCOPE_OK
}
