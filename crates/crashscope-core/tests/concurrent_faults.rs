//! Tests for several threads faulting at the same time through the real
//! signal hooks
//!
//! `SIGFPE` is set to `SIG_IGN` before the hooks go in, so every thread
//! returns once its fault was handed off or parked.

#![cfg(unix)]

use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use crashscope_core::{CrashConfig, CrashError, CrashHandler, CrashReport, Presenter, PresenterKind};

const THREADS: usize = 4;

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
fn test_simultaneous_signals_produce_one_report()
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

    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // SAFETY: the first fault is reported, the rest park and then
                // fall through to SIG_IGN.
                unsafe { libc::raise(libc::SIGFPE) };
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let reports = recording.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("Exception Code: 0xc00002b4\n"));
    drop(reports);
    assert!(handler.has_reported());

    handler.shutdown();
}
