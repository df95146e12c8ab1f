//! Terminal setup and the blocking dialog loop

use std::io::{self, IsTerminal, Stdout};
use std::time::Duration;

use crashscope_core::{CrashReport, Presenter, StderrPresenter};
use crashscope_utils::{debug, warn};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::dialog::{Dialog, MessageBox, ReportDialog};

/// How long to wait for input before redrawing
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Owns the terminal while a dialog is shown
///
/// Raw mode and the alternate screen are left again on drop, including when
/// the dialog loop unwinds.
pub struct Tui
{
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui
{
    /// Enter raw mode and the alternate screen
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be switched; whatever was
    /// already changed is restored first.
    pub fn new() -> io::Result<Self>
    {
        enable_raw_mode()?;
        let setup = execute!(io::stdout(), EnterAlternateScreen)
            .and_then(|()| Terminal::new(CrosstermBackend::new(io::stdout())));
        match setup {
            Ok(terminal) => Ok(Self { terminal }),
            Err(err) => {
                let _ = Self::restore();
                Err(err)
            }
        }
    }

    /// Draw `dialog` and feed it key presses until it closes
    ///
    /// # Errors
    ///
    /// Returns an error if drawing or reading terminal events fails.
    pub fn run(&mut self, dialog: &mut dyn Dialog) -> io::Result<()>
    {
        loop {
            self.terminal.draw(|frame| dialog.render(frame))?;

            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            // Resize and focus events just trigger the redraw above.
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press && dialog.handle_key_event(key_event) {
                    return Ok(());
                }
            }
        }
    }

    /// Leave the alternate screen and raw mode
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be restored.
    pub fn restore() -> io::Result<()>
    {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)
    }
}

impl Drop for Tui
{
    fn drop(&mut self)
    {
        let _ = Self::restore();
    }
}

/// [`Presenter`] showing reports in a terminal dialog
///
/// Falls back to [`StderrPresenter`] when stdin or stdout is not a terminal,
/// or when the terminal cannot be used.
#[derive(Debug, Default, Clone, Copy)]
pub struct TuiPresenter
{
    fallback: StderrPresenter,
}

impl TuiPresenter
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn has_terminal() -> bool
    {
        io::stdin().is_terminal() && io::stdout().is_terminal()
    }

    fn show(dialog: &mut dyn Dialog) -> io::Result<()>
    {
        if !Self::has_terminal() {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "not attached to a terminal"));
        }
        let mut tui = Tui::new()?;
        tui.run(dialog)
    }
}

impl Presenter for TuiPresenter
{
    fn present(&self, report: &CrashReport)
    {
        debug!("Showing crash report dialog");
        let mut dialog = ReportDialog::new(report);
        if let Err(err) = Self::show(&mut dialog) {
            warn!("Crash report dialog unavailable, writing to stderr: {err}");
            self.fallback.present(report);
        }
    }

    fn notify(&self, title: &str, message: &str)
    {
        let mut message_box = MessageBox::new(title, message);
        if let Err(err) = Self::show(&mut message_box) {
            warn!("Message box unavailable, writing to stderr: {err}");
            self.fallback.notify(title, message);
        }
    }
}
