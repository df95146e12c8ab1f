//! Signal hooks for Unix targets.
//!
//! Everything reachable from [`first_chance_hook`] and [`last_resort_hook`]
//! is restricted to atomics, `read`/`write` on pipes, `sigaction`, `raise`
//! and `nanosleep`. No locks, no allocation and no logging happen inside
//! the signal handler.

use std::cell::{RefCell, UnsafeCell};
use std::ffi::c_void;
use std::io;
use std::mem::{self, MaybeUninit};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use libc::{c_int, siginfo_t};
use tracing::{debug, error, info, warn};

use super::{FaultDispatch, HookKind};
use crate::error::{CrashError, Result};
use crate::types::{Address, FaultCategory, FaultContext, Registers};

/// Size of the alternate signal stack given to each prepared thread
pub const ALT_STACK_SIZE: usize = 64 * 1024;

const REPORTER_THREAD_NAME: &str = "crashscope-reporter";

const WAKE_STOP: u8 = 0;
const WAKE_FAULT: u8 = 1;

/// Signal numbers above this are never hooked.
const MAX_SIGNAL: usize = 32;

static INSTALLED: AtomicBool = AtomicBool::new(false);
/// Taken by the first thread whose fault is dispatched.
static CLAIMED: AtomicBool = AtomicBool::new(false);
/// Set once the reporter finished the claimed fault.
static DISPATCHED: AtomicBool = AtomicBool::new(false);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static DONE_FD: AtomicI32 = AtomicI32::new(-1);
static REPORTER_TID: AtomicU64 = AtomicU64::new(0);

static SLOT: FaultSlot = FaultSlot::new();
static PREVIOUS: PreviousActions = PreviousActions::new();

/// Preallocated storage for the fault being dispatched
///
/// Written only by the thread holding `CLAIMED`, read only by the reporter
/// after it was woken for that fault.
struct FaultSlot(UnsafeCell<MaybeUninit<FaultContext>>);

// SAFETY: access is serialized by the CLAIMED flag and the wake pipe.
unsafe impl Sync for FaultSlot {}

impl FaultSlot
{
    const fn new() -> Self
    {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }

    /// # Safety
    ///
    /// Caller must hold the dispatch claim.
    unsafe fn store(&self, fault: FaultContext)
    {
        (*self.0.get()).write(fault);
    }

    /// # Safety
    ///
    /// Only valid after a `store` that happened-before this call.
    unsafe fn load(&self) -> FaultContext
    {
        (*self.0.get()).assume_init_read()
    }
}

/// Signal dispositions that were in place before our hooks
struct PreviousActions
{
    /// Bit `n` is set when `actions[n]` holds a saved disposition.
    saved: AtomicU32,
    actions: UnsafeCell<MaybeUninit<[libc::sigaction; MAX_SIGNAL]>>,
}

// SAFETY: entries are written before the matching bit is published and only
// while our hook is not the installed disposition for that signal.
unsafe impl Sync for PreviousActions {}

impl PreviousActions
{
    const fn new() -> Self
    {
        Self {
            saved: AtomicU32::new(0),
            actions: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn bit(signal: c_int) -> Option<u32>
    {
        let index = usize::try_from(signal).ok().filter(|index| *index < MAX_SIGNAL)?;
        Some(1 << index)
    }

    fn entry(&self, signal: c_int) -> *mut libc::sigaction
    {
        // SAFETY: callers check `signal < MAX_SIGNAL` through `bit`.
        unsafe { (*self.actions.get()).as_mut_ptr().cast::<libc::sigaction>().add(signal as usize) }
    }

    fn get(&self, signal: c_int) -> Option<libc::sigaction>
    {
        let bit = Self::bit(signal)?;
        if self.saved.load(Ordering::Acquire) & bit == 0 {
            return None;
        }
        // SAFETY: the bit is only set after the entry was written.
        Some(unsafe { ptr::read(self.entry(signal)) })
    }

    fn set(&self, signal: c_int, action: libc::sigaction)
    {
        let Some(bit) = Self::bit(signal) else {
            return;
        };
        // SAFETY: in bounds; see the Sync impl for the aliasing argument.
        unsafe { ptr::write(self.entry(signal), action) };
        self.saved.fetch_or(bit, Ordering::Release);
    }

    fn clear(&self, signal: c_int)
    {
        if let Some(bit) = Self::bit(signal) {
            self.saved.fetch_and(!bit, Ordering::Release);
        }
    }
}

/// Installed fault hooks plus the reporter thread that serves them
///
/// Dropping the interceptor removes the hooks, restores the previous
/// dispositions and stops the reporter.
pub struct Interceptor
{
    reporter: Option<JoinHandle<()>>,
    wake_write: OwnedFd,
    _wake_read: OwnedFd,
    done_read: OwnedFd,
    _done_write: OwnedFd,
}

impl Interceptor
{
    /// Install both hooks and start the reporter thread.
    ///
    /// `dispatch` runs on the reporter thread once per admitted fault, at
    /// most once per installation.
    ///
    /// ## Errors
    ///
    /// - `CrashError::InvalidState` if hooks are already installed
    /// - `CrashError::Io` if the hand-off pipes or the reporter thread cannot be created
    /// - `CrashError::HookInstall` if `sigaction` fails; hooks installed by
    ///   this call are removed again
    pub fn install(dispatch: FaultDispatch) -> Result<Self>
    {
        if INSTALLED.swap(true, Ordering::AcqRel) {
            return Err(CrashError::InvalidState("fault hooks are already installed".into()));
        }
        Self::install_inner(dispatch).inspect_err(|_| INSTALLED.store(false, Ordering::Release))
    }

    fn install_inner(dispatch: FaultDispatch) -> Result<Self>
    {
        CLAIMED.store(false, Ordering::Release);
        DISPATCHED.store(false, Ordering::Release);

        let (wake_read, wake_write) = pipe()?;
        let (done_read, done_write) = pipe()?;

        let reporter = spawn_reporter(wake_read.as_raw_fd(), done_write.as_raw_fd(), dispatch)?;
        let mut interceptor = Self {
            reporter: Some(reporter),
            wake_write,
            _wake_read: wake_read,
            done_read,
            _done_write: done_write,
        };
        WAKE_FD.store(interceptor.wake_write.as_raw_fd(), Ordering::Release);
        DONE_FD.store(interceptor.done_read.as_raw_fd(), Ordering::Release);

        if let Err(err) = prepare_thread() {
            warn!("no alternate signal stack for the initializing thread: {err}");
        }

        for kind in [HookKind::FirstChance, HookKind::LastResort] {
            for &(signal, name) in kind.signals() {
                if let Err(source) = install_hook(signal, hook_address(kind)) {
                    error!(signal = name, "sigaction failed: {source}");
                    interceptor.teardown();
                    return Err(CrashError::HookInstall { signal: name, source });
                }
            }
        }

        info!(
            first_chance = HookKind::FirstChance.signals().len(),
            last_resort = HookKind::LastResort.signals().len(),
            "fault hooks installed"
        );
        Ok(interceptor)
    }

    /// Put the first-chance hook back in front of handlers installed after it.
    ///
    /// A handler that replaced ours becomes the previous disposition we
    /// chain to.
    ///
    /// ## Errors
    ///
    /// Returns `CrashError::HookInstall` if `sigaction` fails.
    pub fn reassert_priority(&self) -> Result<()>
    {
        let ours = hook_address(HookKind::FirstChance);
        for &(signal, name) in HookKind::FirstChance.signals() {
            let current = query_action(signal).map_err(|source| CrashError::HookInstall { signal: name, source })?;
            if current.sa_sigaction == ours {
                continue;
            }
            debug!(signal = name, "re-asserting first-chance hook");
            PREVIOUS.set(signal, current);
            set_action(signal, ours).map_err(|source| CrashError::HookInstall { signal: name, source })?;
        }
        Ok(())
    }

    /// Remove the hooks and stop the reporter
    pub fn uninstall(self) {}

    fn teardown(&mut self)
    {
        for kind in [HookKind::FirstChance, HookKind::LastResort] {
            for &(signal, name) in kind.signals() {
                if let Some(previous) = PREVIOUS.get(signal) {
                    // SAFETY: `previous` was returned by sigaction for this signal.
                    if unsafe { libc::sigaction(signal, &previous, ptr::null_mut()) } != 0 {
                        warn!(signal = name, "failed to restore previous disposition: {}", io::Error::last_os_error());
                    }
                    PREVIOUS.clear(signal);
                }
            }
        }

        WAKE_FD.store(-1, Ordering::Release);
        DONE_FD.store(-1, Ordering::Release);
        if let Some(reporter) = self.reporter.take() {
            write_byte(self.wake_write.as_raw_fd(), WAKE_STOP);
            if reporter.join().is_err() {
                warn!("reporter thread panicked");
            }
        }
        INSTALLED.store(false, Ordering::Release);
        debug!("fault hooks removed");
    }
}

impl Drop for Interceptor
{
    fn drop(&mut self)
    {
        if self.reporter.is_some() {
            self.teardown();
        }
    }
}

fn pipe() -> io::Result<(OwnedFd, OwnedFd)>
{
    let mut fds = [0 as c_int; 2];
    // SAFETY: `fds` has room for the two descriptors.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    for fd in fds {
        // SAFETY: fd was just returned by pipe().
        unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    }
    // SAFETY: both descriptors are open and owned by nobody else.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn spawn_reporter(wake_read: RawFd, done_write: RawFd, dispatch: FaultDispatch) -> io::Result<JoinHandle<()>>
{
    thread::Builder::new()
        .name(REPORTER_THREAD_NAME.into())
        .spawn(move || {
            REPORTER_TID.store(current_thread_id(), Ordering::Release);
            if let Err(err) = prepare_thread() {
                warn!("no alternate signal stack for the reporter: {err}");
            }
            debug!("reporter thread waiting for faults");

            while read_byte(wake_read) == Some(WAKE_FAULT) {
                fence(Ordering::Acquire);
                // SAFETY: WAKE_FAULT is written only after the slot was filled.
                let fault = unsafe { SLOT.load() };
                info!(category = %fault.category, thread = fault.thread_id, "dispatching fault");
                if panic::catch_unwind(AssertUnwindSafe(|| dispatch(&fault))).is_err() {
                    error!("fault dispatch panicked");
                }
                DISPATCHED.store(true, Ordering::Release);
                write_byte(done_write, 1);
            }
            debug!("reporter thread stopped");
        })
}

fn hook_address(kind: HookKind) -> libc::sighandler_t
{
    let hook: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = match kind {
        HookKind::FirstChance => first_chance_hook,
        HookKind::LastResort => last_resort_hook,
    };
    hook as libc::sighandler_t
}

fn query_action(signal: c_int) -> io::Result<libc::sigaction>
{
    // SAFETY: a zeroed sigaction is a valid out-parameter.
    let mut current: libc::sigaction = unsafe { mem::zeroed() };
    // SAFETY: null `act` only queries.
    if unsafe { libc::sigaction(signal, ptr::null(), &mut current) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(current)
}

fn set_action(signal: c_int, handler: libc::sighandler_t) -> io::Result<()>
{
    // SAFETY: the action is fully initialized before it is passed on.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Save the current disposition, then install `handler`.
fn install_hook(signal: c_int, handler: libc::sighandler_t) -> io::Result<()>
{
    let previous = query_action(signal)?;
    PREVIOUS.set(signal, previous);
    set_action(signal, handler).inspect_err(|_| PREVIOUS.clear(signal))
}

extern "C" fn first_chance_hook(signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    // SAFETY: invoked by the kernel with the arguments of an SA_SIGINFO handler.
    unsafe { on_signal(HookKind::FirstChance, signal, info, context) }
}

extern "C" fn last_resort_hook(signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    // SAFETY: invoked by the kernel with the arguments of an SA_SIGINFO handler.
    unsafe { on_signal(HookKind::LastResort, signal, info, context) }
}

unsafe fn on_signal(kind: HookKind, signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    let saved_errno = errno::get();

    let registers = registers_from_context(context);
    let (si_code, fault_address) = siginfo_details(info);
    let category = FaultCategory::from_signal(signal, si_code, fault_address, registers.sp)
        .filter(|category| kind.admits(*category));

    if let Some(category) = category {
        let fault = FaultContext {
            category,
            signal,
            fault_address,
            registers,
            thread_id: current_thread_id(),
        };
        hand_off(&fault);
    }

    errno::set(saved_errno);
    forward(signal, info, context);
}

/// Pass `fault` to the reporter and wait until it is done.
unsafe fn hand_off(fault: &FaultContext)
{
    let wake = WAKE_FD.load(Ordering::Acquire);
    let done = DONE_FD.load(Ordering::Acquire);
    if wake < 0 || done < 0 || fault.thread_id == REPORTER_TID.load(Ordering::Acquire) {
        return;
    }

    if CLAIMED.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
        // Another thread's fault is being reported; park until it is done.
        while !DISPATCHED.load(Ordering::Acquire) && WAKE_FD.load(Ordering::Acquire) >= 0 {
            let pause = libc::timespec {
                tv_sec: 0,
                tv_nsec: 10_000_000,
            };
            libc::nanosleep(&pause, ptr::null_mut());
        }
        return;
    }

    SLOT.store(*fault);
    fence(Ordering::Release);
    if write_byte(wake, WAKE_FAULT) {
        let _ = read_byte(done);
    }
}

/// Hand the signal to whatever disposition preceded ours.
unsafe fn forward(signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    match PREVIOUS.get(signal) {
        Some(previous) if previous.sa_sigaction == libc::SIG_IGN => {}
        Some(previous) if previous.sa_sigaction != libc::SIG_DFL => {
            if previous.sa_flags & libc::SA_SIGINFO != 0 {
                let handler: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = mem::transmute(previous.sa_sigaction);
                handler(signal, info, context);
            } else {
                let handler: extern "C" fn(c_int) = mem::transmute(previous.sa_sigaction);
                handler(signal);
            }
        }
        _ => {
            // Default disposition: restore it and re-raise. The signal stays
            // pending until the handler returns, then terminates the process.
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = libc::SIG_DFL;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signal, &action, ptr::null_mut());
            libc::raise(signal);
        }
    }
}

fn write_byte(fd: RawFd, byte: u8) -> bool
{
    loop {
        // SAFETY: writes one byte from a live local.
        let written = unsafe { libc::write(fd, ptr::addr_of!(byte).cast(), 1) };
        if written == 1 {
            return true;
        }
        if written < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return false;
    }
}

fn read_byte(fd: RawFd) -> Option<u8>
{
    let mut byte = 0u8;
    loop {
        // SAFETY: reads one byte into a live local.
        let read = unsafe { libc::read(fd, ptr::addr_of_mut!(byte).cast(), 1) };
        if read == 1 {
            return Some(byte);
        }
        if read < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return None;
    }
}

unsafe fn siginfo_details(info: *const siginfo_t) -> (c_int, Address)
{
    if info.is_null() {
        return (0, Address::ZERO);
    }
    let info = &*info;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    let address = info.si_addr() as usize;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let address = info.si_addr as usize;

    (info.si_code, Address::from(address))
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
unsafe fn registers_from_context(context: *mut c_void) -> Registers
{
    if context.is_null() {
        return Registers::new();
    }
    let gregs = &(*context.cast::<libc::ucontext_t>()).uc_mcontext.gregs;
    Registers {
        pc: Address::new(gregs[libc::REG_RIP as usize] as u64),
        sp: Address::new(gregs[libc::REG_RSP as usize] as u64),
        fp: Address::new(gregs[libc::REG_RBP as usize] as u64),
        lr: Address::ZERO,
    }
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
unsafe fn registers_from_context(context: *mut c_void) -> Registers
{
    if context.is_null() {
        return Registers::new();
    }
    let mcontext = &(*context.cast::<libc::ucontext_t>()).uc_mcontext;
    Registers {
        pc: Address::new(mcontext.pc),
        sp: Address::new(mcontext.sp),
        fp: Address::new(mcontext.regs[29]),
        lr: Address::new(mcontext.regs[30]),
    }
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
unsafe fn registers_from_context(context: *mut c_void) -> Registers
{
    if context.is_null() {
        return Registers::new();
    }
    let mcontext = (*context.cast::<libc::ucontext_t>()).uc_mcontext;
    if mcontext.is_null() {
        return Registers::new();
    }
    let state = &(*mcontext).__ss;
    Registers {
        pc: Address::new(state.__rip),
        sp: Address::new(state.__rsp),
        fp: Address::new(state.__rbp),
        lr: Address::ZERO,
    }
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
unsafe fn registers_from_context(context: *mut c_void) -> Registers
{
    if context.is_null() {
        return Registers::new();
    }
    let mcontext = (*context.cast::<libc::ucontext_t>()).uc_mcontext;
    if mcontext.is_null() {
        return Registers::new();
    }
    let state = &(*mcontext).__ss;
    Registers {
        pc: Address::new(state.__pc),
        sp: Address::new(state.__sp),
        fp: Address::new(state.__fp),
        lr: Address::new(state.__lr),
    }
}

#[cfg(not(any(
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_os = "macos", any(target_arch = "x86_64", target_arch = "aarch64"))
)))]
unsafe fn registers_from_context(_context: *mut c_void) -> Registers
{
    Registers::new()
}

/// OS id of the calling thread
pub(crate) fn current_thread_id() -> u64
{
    #[cfg(target_os = "linux")]
    // SAFETY: gettid has no preconditions.
    unsafe {
        libc::syscall(libc::SYS_gettid) as u64
    }

    #[cfg(target_os = "macos")]
    {
        let mut tid = 0u64;
        // SAFETY: `tid` is a valid out-pointer.
        unsafe { libc::pthread_threadid_np(libc::pthread_self(), &mut tid) };
        tid
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    // SAFETY: pthread_self has no preconditions.
    unsafe {
        libc::pthread_self() as usize as u64
    }
}

mod errno
{
    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn location() -> *mut libc::c_int
    {
        libc::__errno_location()
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe fn location() -> *mut libc::c_int
    {
        libc::__error()
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    unsafe fn location() -> *mut libc::c_int
    {
        std::ptr::null_mut()
    }

    pub(super) fn get() -> libc::c_int
    {
        // SAFETY: the errno location is thread local and always valid.
        unsafe { location().as_ref().copied().unwrap_or(0) }
    }

    pub(super) fn set(value: libc::c_int)
    {
        // SAFETY: see `get`.
        unsafe {
            if let Some(slot) = location().as_mut() {
                *slot = value;
            }
        }
    }
}

/// Alternate signal stack owned by one thread
struct AltStack
{
    mapping: *mut c_void,
    mapping_len: usize,
    stack: *mut c_void,
}

impl Drop for AltStack
{
    fn drop(&mut self)
    {
        // SAFETY: only disables the alternate stack if it is still ours,
        // then unmaps the region allocated in `prepare_thread`.
        unsafe {
            let mut current: libc::stack_t = mem::zeroed();
            if libc::sigaltstack(ptr::null(), &mut current) == 0 && current.ss_sp == self.stack {
                let mut disable: libc::stack_t = mem::zeroed();
                disable.ss_flags = libc::SS_DISABLE;
                libc::sigaltstack(&disable, ptr::null_mut());
            }
            libc::munmap(self.mapping, self.mapping_len);
        }
    }
}

thread_local! {
    static ALT_STACK: RefCell<Option<AltStack>> = const { RefCell::new(None) };
}

fn page_size() -> usize
{
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|size| *size > 0).unwrap_or(4096)
}

/// Give the calling thread an alternate signal stack.
///
/// Needed for threads that may exhaust their stack: without it the fault
/// hook has no stack to run on. The stack is released when the thread
/// exits. Calling this more than once per thread is a no-op.
///
/// ## Errors
///
/// Returns `CrashError::Io` if the stack cannot be mapped or registered.
pub fn prepare_thread() -> Result<()>
{
    if ALT_STACK.with(|slot| slot.borrow().is_some()) {
        return Ok(());
    }

    let guard = page_size();
    let mapping_len = ALT_STACK_SIZE + guard;

    // SAFETY: anonymous private mapping; the result is checked before use.
    let mapping = unsafe {
        libc::mmap(
            ptr::null_mut(),
            mapping_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if mapping == libc::MAP_FAILED {
        return Err(io::Error::last_os_error().into());
    }

    // SAFETY: the lowest page of the mapping becomes a guard page; the rest
    // is registered as this thread's signal stack.
    unsafe {
        libc::mprotect(mapping, guard, libc::PROT_NONE);
        let stack = mapping.cast::<u8>().add(guard).cast::<c_void>();
        let mut alt: libc::stack_t = mem::zeroed();
        alt.ss_sp = stack;
        alt.ss_size = ALT_STACK_SIZE;
        alt.ss_flags = 0;
        if libc::sigaltstack(&alt, ptr::null_mut()) != 0 {
            let err = io::Error::last_os_error();
            libc::munmap(mapping, mapping_len);
            return Err(err.into());
        }
        ALT_STACK.with(|slot| {
            *slot.borrow_mut() = Some(AltStack {
                mapping,
                mapping_len,
                stack,
            });
        });
    }

    debug!(size = ALT_STACK_SIZE, "alternate signal stack installed");
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_prepare_thread_is_idempotent()
    {
        thread::spawn(|| {
            prepare_thread().unwrap();
            prepare_thread().unwrap();

            // SAFETY: query only.
            let mut current: libc::stack_t = unsafe { mem::zeroed() };
            assert_eq!(unsafe { libc::sigaltstack(ptr::null(), &mut current) }, 0);
            assert_eq!(current.ss_flags & libc::SS_DISABLE, 0);
            assert_eq!(current.ss_size, ALT_STACK_SIZE);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_pipe_round_trip()
    {
        let (read, write) = pipe().unwrap();
        assert!(write_byte(write.as_raw_fd(), WAKE_FAULT));
        assert_eq!(read_byte(read.as_raw_fd()), Some(WAKE_FAULT));
        drop(write);
        assert_eq!(read_byte(read.as_raw_fd()), None);
    }

    #[test]
    fn test_previous_actions_track_saved_bits()
    {
        let actions = PreviousActions::new();
        assert!(actions.get(libc::SIGUSR1).is_none());

        // SAFETY: zeroed sigaction is SIG_DFL with no flags.
        let action: libc::sigaction = unsafe { mem::zeroed() };
        actions.set(libc::SIGUSR1, action);
        assert_eq!(actions.get(libc::SIGUSR1).map(|a| a.sa_sigaction), Some(libc::SIG_DFL));
        actions.clear(libc::SIGUSR1);
        assert!(actions.get(libc::SIGUSR1).is_none());

        actions.set(64, action);
        assert!(actions.get(64).is_none());
    }

    #[test]
    fn test_thread_ids_differ_between_threads()
    {
        let here = current_thread_id();
        let there = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, 0);
        assert_ne!(here, there);
    }
}
