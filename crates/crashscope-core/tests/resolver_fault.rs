//! Tests for an external resolver that faults while naming a frame
//!
//! The hook parks the faulting thread until the reporter is done, so the
//! reporter must never wait on anything that thread holds.

#![cfg(unix)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crashscope_core::{Address, CrashConfig, CrashError, CrashHandler, CrashReport, Presenter, PresenterKind};

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

#[test]
fn test_faulting_resolver_still_produces_report()
{
    // SAFETY: installs SIG_IGN for a signal this test owns.
    unsafe { libc::signal(libc::SIGFPE, libc::SIG_IGN) };

    let recording = Recording::default();
    let config = CrashConfig::new()
        .with_presenter(PresenterKind::Stderr)
        .with_symbol_server(None);
    let handler: &'static CrashHandler = Box::leak(Box::new(CrashHandler::new(config, Box::new(recording.clone()))));
    match handler.initialize(None) {
        Ok(()) | Err(CrashError::SymbolEngine(_)) => {}
        Err(err) => panic!("hooks not installed: {err}"),
    }

    handler.register_external_resolver(Some(Arc::new(|_: Address| {
        // SAFETY: SIGFPE is reported once, then falls through to SIG_IGN.
        unsafe { libc::raise(libc::SIGFPE) };
        Some("Script.Run()".to_string())
    })));

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(handler.describe_address(Address::new(0x1000)));
    });
    let described = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("faulting thread never resumed");
    assert_eq!(described, "Script.Run()");

    {
        let reports = recording.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("Exception Code: 0xc00002b4\n"));
        assert!(reports[0].contains("\nStack Trace:\n  #0: Script.Run()\n"));
    }

    handler.shutdown();
}
