//! # crashscope-ui
//!
//! Terminal crash report dialog for crashscope.
//!
//! [`TuiPresenter`] implements [`crashscope_core::Presenter`]: it takes over
//! the terminal (raw mode, alternate screen), shows the report in a modal
//! dialog and returns once the user dismisses it. Without a terminal it
//! writes the report to stderr instead.
//!
//! ## Keys
//!
//! - `↑`/`↓`, `PgUp`/`PgDn`, `Home`/`End`: scroll the report
//! - `Tab`, `←`/`→`: move focus between **Send Report** and **Cancel**
//! - `Enter`: activate the focused button
//! - `Esc`, `q`: close
//!
//! ## Usage
//!
//! ```rust,no_run
//! use crashscope_core::{CrashConfig, CrashHandler};
//! use crashscope_ui::TuiPresenter;
//!
//! let handler = CrashHandler::install_global(|| {
//!     CrashHandler::new(CrashConfig::from_env(), Box::new(TuiPresenter::new()))
//! });
//! let _ = handler.initialize(None);
//! ```

pub mod dialog;
pub mod tui;
pub mod ui;

pub use dialog::{Dialog, Focus, MessageBox, ReportDialog};
pub use tui::{Tui, TuiPresenter};

/// Show a report in the terminal dialog and wait for it to be closed
///
/// # Errors
///
/// Returns an error if the terminal cannot be set up or drawn to.
pub fn show_report(report: &crashscope_core::CrashReport) -> std::io::Result<()>
{
    let mut dialog = ReportDialog::new(report);
    Tui::new()?.run(&mut dialog)
}
