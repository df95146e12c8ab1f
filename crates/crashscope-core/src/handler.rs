//! # Crash Handler
//!
//! The process-wide state behind every fault hook: configuration,
//! registered resolvers, the native symbol engine and the one-shot guard
//! that makes sure only one crash is ever reported.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --initialize()--> Active --shutdown()--> Shutdown
//! ```
//!
//! `initialize` composes the symbol search path, starts the symbol engine
//! and installs the fault hooks. `shutdown` removes the hooks and releases
//! the engine; calling it again, or before `initialize`, does nothing.
//!
//! ## Global access
//!
//! Fault hooks are process-global callbacks without a user pointer, so the
//! handler they report to lives in one global slot
//! ([`CrashHandler::install_global`]). Handlers built with
//! [`CrashHandler::new`] work the same way but can only drive
//! [`CrashHandler::handle_fault`] directly, which is what tests do.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::CrashConfig;
use crate::error::{CrashError, Result};
use crate::interceptor::{self, FaultDispatch, Interceptor};
use crate::memory::{LocalMemory, MemoryAccess};
use crate::present::Presenter;
use crate::report::{CrashReport, ExtraInfoSupplier, ReportBuilder};
use crate::symbols::{NativeSymbols, ResolutionChain, SymbolEngine, SymbolResolver, SymbolSearchPath};
use crate::types::{Address, Architecture, FaultContext, ResolvedFrame};
use crate::unwind::StackWalker;

static GLOBAL: OnceCell<CrashHandler> = OnceCell::new();

/// Title of the notice shown when the symbol engine cannot start
pub const SYMBOL_ENGINE_NOTICE_TITLE: &str = "Crash Handler";

/// How long a fault waits for the handler lock before reporting without
/// native symbols
pub const FAULT_LOCK_WAIT: Duration = Duration::from_secs(2);

const LOCK_POLL: Duration = Duration::from_millis(10);

/// Lifecycle state of a [`CrashHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState
{
    Uninitialized,
    Active,
    Shutdown,
}

impl fmt::Display for HandlerState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            HandlerState::Uninitialized => write!(f, "uninitialized"),
            HandlerState::Active => write!(f, "active"),
            HandlerState::Shutdown => write!(f, "shut down"),
        }
    }
}

/// State guarded by the handler mutex
struct Inner
{
    state: HandlerState,
    search_path: SymbolSearchPath,
    engine: Option<SymbolEngine>,
    /// Why the engine failed to start, replayed to later `initialize` calls
    engine_error: Option<String>,
    interceptor: Option<Interceptor>,
}

/// Process-wide crash handler
pub struct CrashHandler
{
    config: CrashConfig,
    presenter: Box<dyn Presenter>,
    resolver: RwLock<Option<Arc<dyn SymbolResolver>>>,
    extra_info: RwLock<Option<Arc<dyn ExtraInfoSupplier>>>,
    full_diagnostic_capture: AtomicBool,
    automatic_reporting: AtomicBool,
    /// One-shot guard; set by the first fault that produced a report.
    reported: AtomicBool,
    lock_wait: Duration,
    inner: Mutex<Inner>,
}

impl CrashHandler
{
    /// Create a handler that shows reports through `presenter`
    pub fn new(config: CrashConfig, presenter: Box<dyn Presenter>) -> Self
    {
        Self {
            full_diagnostic_capture: AtomicBool::new(config.full_diagnostic_capture),
            automatic_reporting: AtomicBool::new(config.automatic_reporting),
            config,
            presenter,
            resolver: RwLock::new(None),
            extra_info: RwLock::new(None),
            reported: AtomicBool::new(false),
            lock_wait: FAULT_LOCK_WAIT,
            inner: Mutex::new(Inner {
                state: HandlerState::Uninitialized,
                search_path: SymbolSearchPath::default(),
                engine: None,
                engine_error: None,
                interceptor: None,
            }),
        }
    }

    /// The global handler, if one was installed
    pub fn global() -> Option<&'static CrashHandler>
    {
        GLOBAL.get()
    }

    /// Install the global handler, or return the existing one.
    ///
    /// `make` only runs when no global handler exists yet.
    pub fn install_global(make: impl FnOnce() -> CrashHandler) -> &'static CrashHandler
    {
        GLOBAL.get_or_init(make)
    }

    pub fn config(&self) -> &CrashConfig
    {
        &self.config
    }

    pub fn state(&self) -> HandlerState
    {
        self.lock().state
    }

    /// Current symbol search path
    pub fn search_path(&self) -> SymbolSearchPath
    {
        self.lock().search_path.clone()
    }

    /// Whether a crash report was already produced
    pub fn has_reported(&self) -> bool
    {
        self.reported.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Inner>
    {
        // A panic while holding the lock must not stop crash reporting.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock, giving up after `limit`
    fn lock_within(&self, limit: Duration) -> Option<MutexGuard<'_, Inner>>
    {
        let deadline = Instant::now() + limit;
        loop {
            match self.inner.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => thread::sleep(LOCK_POLL),
                Err(TryLockError::WouldBlock) => return None,
            }
        }
    }

    fn registered_resolver(&self) -> Option<Arc<dyn SymbolResolver>>
    {
        self.resolver.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Configure symbol lookup and install the fault hooks.
    ///
    /// `search_base` is added to the search path after the executable's
    /// directory; `None` falls back to the configured base.
    ///
    /// ## Errors
    ///
    /// - `CrashError::SymbolEngine`: hooks **are** installed, but frames will
    ///   be reported as bare addresses. The user was already notified
    ///   through the presenter. Later calls return the same error.
    /// - `CrashError::HookInstall` / `CrashError::Io`: nothing was installed.
    /// - `CrashError::InvalidState`: the handler was shut down.
    pub fn initialize(&'static self, search_base: Option<&Path>) -> Result<()>
    {
        let mut inner = self.lock();
        match inner.state {
            HandlerState::Active => {
                debug!("crash handler already active");
                return match &inner.engine_error {
                    Some(message) => Err(CrashError::SymbolEngine(message.clone())),
                    None => Ok(()),
                };
            }
            HandlerState::Shutdown => {
                return Err(CrashError::InvalidState("crash handler was shut down".into()));
            }
            HandlerState::Uninitialized => {}
        }

        let module_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let search_base: Option<PathBuf> = search_base.map(Path::to_path_buf).or_else(|| self.config.search_base.clone());
        let mut search_path = SymbolSearchPath::compose(
            module_dir.as_deref(),
            search_base.as_deref(),
            self.config.cache_dir.as_deref(),
            self.config.symbol_server.as_deref(),
        );
        // Directories added before initialization keep their order.
        for dir in inner.search_path.directories() {
            search_path.push_directory(dir);
        }
        info!(search_path = %search_path, "initializing crash handler");

        let engine = SymbolEngine::initialize(search_path.clone(), self.config.auxiliary_modules.clone()).map_err(|err| match err {
            err @ CrashError::SymbolEngine(_) => err,
            other => CrashError::SymbolEngine(other.to_string()),
        });

        inner.interceptor = Some(Interceptor::install(self.dispatcher())?);
        inner.state = HandlerState::Active;
        inner.search_path = search_path;

        match engine {
            Ok(engine) => {
                inner.engine = Some(engine);
                Ok(())
            }
            Err(err) => {
                if let CrashError::SymbolEngine(message) = &err {
                    inner.engine_error = Some(message.clone());
                }
                drop(inner);
                error!("{err}");
                self.presenter.notify(
                    SYMBOL_ENGINE_NOTICE_TITLE,
                    &format!("Failed to initialize symbol handler: {err}. Crash reports will contain raw addresses."),
                );
                Err(err)
            }
        }
    }

    fn dispatcher(&'static self) -> FaultDispatch
    {
        Arc::new(move |fault: &FaultContext| {
            self.handle_fault(fault, &LocalMemory);
        })
    }

    /// Remove the fault hooks and release the symbol engine.
    ///
    /// Does nothing unless the handler is active.
    pub fn shutdown(&self)
    {
        let interceptor = {
            let mut inner = self.lock();
            if inner.state != HandlerState::Active {
                debug!(state = %inner.state, "shutdown ignored");
                return;
            }
            inner.state = HandlerState::Shutdown;
            inner.engine = None;
            inner.interceptor.take()
        };

        // Outside the lock: the reporter thread may be waiting for it.
        if let Some(interceptor) = interceptor {
            interceptor.uninstall();
        }
        info!("crash handler shut down");
    }

    /// Append a directory to the symbol search path.
    ///
    /// The directory is searched after previously added ones and before the
    /// symbol cache. Auxiliary modules are (re)loaded against the new path.
    pub fn set_symbol_search_path(&self, dir: impl AsRef<Path>)
    {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.search_path.push_directory(dir);
        if let Some(engine) = inner.engine.as_mut() {
            engine.set_search_path(inner.search_path.clone());
        }
        info!(search_path = %inner.search_path, "symbol search path changed");
    }

    /// Register the external resolver consulted before native symbols.
    ///
    /// `None` clears it. The latest registration wins.
    pub fn register_external_resolver(&self, resolver: Option<Arc<dyn SymbolResolver>>)
    {
        debug!(registered = resolver.is_some(), "external resolver updated");
        *self.resolver.write().unwrap_or_else(PoisonError::into_inner) = resolver;
    }

    /// Register the supplier of extra report text. `None` clears it.
    pub fn register_extra_info_supplier(&self, supplier: Option<Arc<dyn ExtraInfoSupplier>>)
    {
        debug!(registered = supplier.is_some(), "extra info supplier updated");
        *self.extra_info.write().unwrap_or_else(PoisonError::into_inner) = supplier;
    }

    pub fn enable_full_diagnostic_capture(&self, enabled: bool)
    {
        self.full_diagnostic_capture.store(enabled, Ordering::Release);
    }

    pub fn full_diagnostic_capture(&self) -> bool
    {
        self.full_diagnostic_capture.load(Ordering::Acquire)
    }

    pub fn enable_automatic_reporting(&self, enabled: bool)
    {
        self.automatic_reporting.store(enabled, Ordering::Release);
    }

    pub fn automatic_reporting(&self) -> bool
    {
        self.automatic_reporting.load(Ordering::Acquire)
    }

    /// Put the first-chance hook back in front of later handlers.
    ///
    /// ## Errors
    ///
    /// `CrashError::InvalidState` if the handler is not active, or
    /// `CrashError::HookInstall` if the hook cannot be re-installed.
    pub fn reassert_priority(&self) -> Result<()>
    {
        let inner = self.lock();
        match &inner.interceptor {
            Some(interceptor) => interceptor.reassert_priority(),
            None => Err(CrashError::InvalidState(format!("crash handler is {}", inner.state))),
        }
    }

    /// Give the calling thread an alternate signal stack.
    ///
    /// Call it on threads that may overflow their stack.
    ///
    /// ## Errors
    ///
    /// `CrashError::Io` if the stack cannot be allocated.
    pub fn prepare_thread() -> Result<()>
    {
        interceptor::prepare_thread()
    }

    /// Handle a captured fault: walk, build and present the report.
    ///
    /// Only the first call per handler produces a report; every later call,
    /// concurrent or not, returns `false` without doing anything.
    ///
    /// The handler lock is only waited on for [`FAULT_LOCK_WAIT`]: a thread
    /// that faulted while holding it is parked by the hook, so past that the
    /// report is built without native symbols.
    pub fn handle_fault<M: MemoryAccess>(&self, fault: &FaultContext, memory: &M) -> bool
    {
        if self.reported.swap(true, Ordering::AcqRel) {
            debug!(category = %fault.category, "fault ignored, a report was already produced");
            return false;
        }

        let report = self.assemble(fault, memory, Some(self.lock_wait));
        error!(
            code = report.code(),
            address = %report.address(),
            frames = report.frames().len(),
            "crash captured:\n{report}"
        );
        self.presenter.present(&report);
        true
    }

    /// Build the report for `fault` without presenting it or touching the
    /// one-shot guard
    pub fn build_report<M: MemoryAccess>(&self, fault: &FaultContext, memory: &M) -> CrashReport
    {
        self.assemble(fault, memory, None)
    }

    fn assemble<M: MemoryAccess>(&self, fault: &FaultContext, memory: &M, lock_wait: Option<Duration>) -> CrashReport
    {
        let resolver = self.registered_resolver();
        let supplier = self.extra_info.read().unwrap_or_else(PoisonError::into_inner).clone();

        let walker = StackWalker::new(Architecture::current(), memory).with_max_frames(self.config.max_frames);
        let pcs = walker.program_counters(&fault.registers);

        // The external resolver runs without the lock held.
        let external = ResolutionChain::new(resolver.as_deref(), None);
        let answers: Vec<Option<String>> = pcs.iter().map(|pc| external.resolve_external(*pc)).collect();

        let mut inner = match lock_wait {
            Some(limit) => self.lock_within(limit),
            None => Some(self.lock()),
        };
        if inner.is_none() {
            warn!("handler lock busy, native symbols skipped");
        }

        let mut engine = inner.as_mut().and_then(|inner| inner.engine.as_mut());
        if let Some(engine) = engine.as_deref_mut() {
            if let Err(err) = engine.refresh() {
                warn!("module list not refreshed: {err}");
            }
        }
        let mut chain = ResolutionChain::new(None, engine.map(|engine| engine as &mut dyn NativeSymbols));
        let frames = pcs
            .into_iter()
            .zip(answers)
            .enumerate()
            .map(|(index, (pc, answer))| ResolvedFrame::new(index, pc, answer.unwrap_or_else(|| chain.describe(pc))))
            .collect();

        ReportBuilder::for_fault(fault)
            .frames(frames)
            .extra_info(supplier.as_deref())
            .build()
    }

    /// Describe a single address through the resolution chain
    pub fn describe_address(&self, address: Address) -> String
    {
        let resolver = self.registered_resolver();
        if let Some(text) = ResolutionChain::new(resolver.as_deref(), None).resolve_external(address) {
            return text;
        }

        let mut inner = self.lock();
        let native = inner.engine.as_mut().map(|engine| engine as &mut dyn NativeSymbols);
        ResolutionChain::new(None, native).describe(address)
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::types::{FaultCategory, Registers};

    #[derive(Default)]
    struct Recording
    {
        reports: StdMutex<Vec<String>>,
        notices: StdMutex<Vec<String>>,
    }

    impl Presenter for Arc<Recording>
    {
        fn present(&self, report: &CrashReport)
        {
            self.reports.lock().unwrap().push(report.text().to_string());
        }

        fn notify(&self, title: &str, message: &str)
        {
            self.notices.lock().unwrap().push(format!("{title}: {message}"));
        }
    }

    fn fault(pc: u64) -> FaultContext
    {
        FaultContext {
            category: FaultCategory::AccessViolation,
            signal: libc::SIGSEGV,
            fault_address: Address::new(0x10),
            registers: Registers {
                pc: Address::new(pc),
                ..Registers::new()
            },
            thread_id: 1,
        }
    }

    struct NoMemory;

    impl MemoryAccess for NoMemory
    {
        fn read_u64(&self, address: Address) -> Result<u64>
        {
            Err(CrashError::Memory { address })
        }
    }

    #[test]
    fn test_guard_reports_once()
    {
        let recording = Arc::new(Recording::default());
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(recording.clone()));

        assert!(handler.handle_fault(&fault(0x1234), &NoMemory));
        assert!(!handler.handle_fault(&fault(0x5678), &NoMemory));
        assert!(handler.has_reported());

        let reports = recording.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("Exception Address: 0x1234\n"));
    }

    #[test]
    fn test_engine_unavailable_yields_bare_hex()
    {
        let recording = Arc::new(Recording::default());
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(recording.clone()));
        handler.handle_fault(&fault(0xabc), &NoMemory);
        assert!(recording.reports.lock().unwrap()[0].contains("  #0: 0xabc\n"));
    }

    #[test]
    fn test_external_resolver_and_extra_info_flow_into_report()
    {
        let recording = Arc::new(Recording::default());
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(recording.clone()));
        handler.register_external_resolver(Some(Arc::new(|_: Address| Some("Script.Run()".to_string()))));
        handler.register_extra_info_supplier(Some(Arc::new(|| Some("runtime: ok\n".to_string()))));

        handler.handle_fault(&fault(0x42), &NoMemory);
        let reports = recording.reports.lock().unwrap();
        assert!(reports[0].ends_with("  #0: Script.Run()\nruntime: ok\n"));
    }

    #[test]
    fn test_latest_registration_wins()
    {
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())));
        handler.register_external_resolver(Some(Arc::new(|_: Address| Some("first".to_string()))));
        handler.register_external_resolver(Some(Arc::new(|_: Address| Some("second".to_string()))));
        assert_eq!(handler.describe_address(Address::new(1)), "second");

        handler.register_external_resolver(None);
        assert_eq!(handler.describe_address(Address::new(1)), "0x1");
    }

    #[test]
    fn test_flags_are_stored()
    {
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())));
        assert!(handler.full_diagnostic_capture());
        assert!(!handler.automatic_reporting());
        handler.enable_full_diagnostic_capture(false);
        handler.enable_automatic_reporting(true);
        assert!(!handler.full_diagnostic_capture());
        assert!(handler.automatic_reporting());
    }

    #[test]
    fn test_shutdown_without_initialize_is_noop()
    {
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())));
        handler.shutdown();
        handler.shutdown();
        assert_eq!(handler.state(), HandlerState::Uninitialized);
        assert!(matches!(handler.reassert_priority(), Err(CrashError::InvalidState(_))));
    }

    #[test]
    fn test_search_path_without_engine_still_records_directories()
    {
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())));
        handler.set_symbol_search_path("/opt/symbols");
        handler.set_symbol_search_path("/opt/more");
        assert_eq!(handler.search_path().to_string(), "/opt/symbols;/opt/more");
    }

    #[test]
    fn test_busy_lock_reports_without_native_symbols()
    {
        let recording = Arc::new(Recording::default());
        let mut handler = CrashHandler::new(CrashConfig::new(), Box::new(recording.clone()));
        handler.lock_wait = Duration::from_millis(50);
        handler.register_external_resolver(Some(Arc::new(|address: Address| {
            (address.value() == 0x42).then(|| "Script.Run()".to_string())
        })));

        let held = handler.lock();
        assert!(handler.handle_fault(&fault(0x42), &NoMemory));
        drop(held);

        assert!(recording.reports.lock().unwrap()[0].ends_with("  #0: Script.Run()\n"));
    }

    #[test]
    fn test_describe_address_does_not_hold_lock_across_resolver()
    {
        let handler: &'static CrashHandler =
            Box::leak(Box::new(CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())))));
        handler.register_external_resolver(Some(Arc::new(move |_: Address| {
            let free = handler.inner.try_lock().is_ok();
            Some(if free { "unlocked" } else { "locked" }.to_string())
        })));
        assert_eq!(handler.describe_address(Address::new(0x10)), "unlocked");
    }

    #[test]
    fn test_repeated_initialize_replays_degraded_status()
    {
        let handler: &'static CrashHandler =
            Box::leak(Box::new(CrashHandler::new(CrashConfig::new(), Box::new(Arc::new(Recording::default())))));
        {
            let mut inner = handler.lock();
            inner.state = HandlerState::Active;
            inner.engine_error = Some("no module list".into());
        }
        assert!(matches!(handler.initialize(None), Err(CrashError::SymbolEngine(msg)) if msg == "no module list"));

        handler.lock().engine_error = None;
        assert!(handler.initialize(None).is_ok());
    }

    #[test]
    fn test_build_report_leaves_guard_untouched()
    {
        let recording = Arc::new(Recording::default());
        let handler = CrashHandler::new(CrashConfig::new(), Box::new(recording.clone()));
        let report = handler.build_report(&fault(0x99), &NoMemory);
        assert_eq!(report.frames().len(), 1);
        assert!(!handler.has_reported());
        assert!(recording.reports.lock().unwrap().is_empty());
    }
}
