//! Tests for the last-resort `SIGABRT` hook

#![cfg(unix)]

use std::mem;
use std::ptr;
use std::sync::{Arc, Mutex};

use crashscope_core::{CrashConfig, CrashError, CrashHandler, CrashReport, Presenter, PresenterKind};

#[derive(Clone, Default)]
struct Recording
{
    reports: Arc<Mutex<Vec<String>>>,
}

impl Presenter for Recording
{
    fn present(&self, report: &CrashReport)
    {
        self.reports.lock().unwrap().push(report.text().to_string());
    }

    fn notify(&self, _title: &str, _message: &str) {}
}

fn disposition(signal: libc::c_int) -> libc::sighandler_t
{
    // SAFETY: query only.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        libc::sigaction(signal, ptr::null(), &mut action);
        action.sa_sigaction
    }
}

#[test]
fn test_abort_is_reported_by_last_resort_hook()
{
    // SAFETY: installs SIG_IGN for a signal this test owns.
    unsafe { libc::signal(libc::SIGABRT, libc::SIG_IGN) };

    let recording = Recording::default();
    let config = CrashConfig::new()
        .with_presenter(PresenterKind::Stderr)
        .with_symbol_server(None);
    let handler: &'static CrashHandler = Box::leak(Box::new(CrashHandler::new(config, Box::new(recording.clone()))));
    match handler.initialize(None) {
        Ok(()) | Err(CrashError::SymbolEngine(_)) => {}
        Err(err) => panic!("hooks not installed: {err}"),
    }
    assert_ne!(disposition(libc::SIGABRT), libc::SIG_IGN);

    // SAFETY: SIGABRT is reported, then falls through to SIG_IGN.
    unsafe { libc::raise(libc::SIGABRT) };

    {
        let reports = recording.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("Exception Code: 0x40000015\n"));
        assert!(reports[0].contains("\nStack Trace:\n  #0: "));
    }

    handler.shutdown();
    assert_eq!(disposition(libc::SIGABRT), libc::SIG_IGN);
}
