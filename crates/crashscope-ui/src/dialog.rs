//! Dialog state and key handling

use crashscope_core::CrashReport;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;

/// Title of the crash report dialog
pub const REPORT_TITLE: &str = "Application Crash Report";

/// Text above the report
pub const REPORT_MESSAGE: &str = "The application has crashed. Please send this report to help us fix the issue:";

/// Shown when **Send Report** is activated
pub const SEND_REPORT_NOTICE: &str = "Send report functionality will be implemented later.";

/// A modal the terminal loop can draw and feed keys to
pub trait Dialog
{
    /// Draw the dialog over the whole frame
    fn render(&mut self, frame: &mut Frame);

    /// Handle a key press
    ///
    /// Returns `true` once the dialog is closed.
    fn handle_key_event(&mut self, key_event: KeyEvent) -> bool;
}

/// Focusable buttons of the report dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus
{
    #[default]
    SendReport,
    Cancel,
}

impl Focus
{
    #[must_use]
    pub const fn toggled(self) -> Self
    {
        match self {
            Focus::SendReport => Focus::Cancel,
            Focus::Cancel => Focus::SendReport,
        }
    }
}

/// State of the crash report dialog
#[derive(Debug, Clone)]
pub struct ReportDialog
{
    lines: Vec<String>,
    scroll: usize,
    /// Report rows visible in the last drawn frame
    viewport: usize,
    focus: Focus,
    notice: Option<&'static str>,
    closed: bool,
}

impl ReportDialog
{
    #[must_use]
    pub fn new(report: &CrashReport) -> Self
    {
        Self::from_text(report.text())
    }

    /// Dialog over arbitrary report text
    #[must_use]
    pub fn from_text(text: &str) -> Self
    {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            scroll: 0,
            viewport: 1,
            focus: Focus::default(),
            notice: None,
            closed: false,
        }
    }

    pub fn lines(&self) -> &[String]
    {
        &self.lines
    }

    pub const fn scroll(&self) -> usize
    {
        self.scroll
    }

    pub const fn focus(&self) -> Focus
    {
        self.focus
    }

    /// Notice currently shown over the dialog
    pub const fn notice(&self) -> Option<&'static str>
    {
        self.notice
    }

    pub const fn is_closed(&self) -> bool
    {
        self.closed
    }

    /// Record how many report rows fit; keeps the scroll offset in range
    pub fn set_viewport(&mut self, rows: usize)
    {
        self.viewport = rows.max(1);
        self.scroll = self.scroll.min(self.max_scroll());
    }

    fn max_scroll(&self) -> usize
    {
        self.lines.len().saturating_sub(self.viewport)
    }

    fn scroll_up(&mut self, rows: usize)
    {
        self.scroll = self.scroll.saturating_sub(rows);
    }

    fn scroll_down(&mut self, rows: usize)
    {
        self.scroll = self.scroll.saturating_add(rows).min(self.max_scroll());
    }

    fn activate(&mut self)
    {
        match self.focus {
            Focus::SendReport => self.notice = Some(SEND_REPORT_NOTICE),
            Focus::Cancel => self.closed = true,
        }
    }
}

impl Dialog for ReportDialog
{
    fn render(&mut self, frame: &mut Frame)
    {
        crate::ui::draw_report(frame, self);
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) -> bool
    {
        if is_interrupt(key_event) {
            self.closed = true;
            return true;
        }

        // The notice is modal: it only takes keys that dismiss it.
        if self.notice.is_some() {
            if matches!(key_event.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.notice = None;
            }
            return false;
        }

        match key_event.code {
            KeyCode::Esc | KeyCode::Char('q' | 'Q') => {
                self.closed = true;
            }
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(self.viewport),
            KeyCode::PageDown => self.scroll_down(self.viewport),
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => self.scroll = self.max_scroll(),
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Left | KeyCode::Right => {
                self.focus = self.focus.toggled();
            }
            KeyCode::Enter => self.activate(),
            _ => {}
        }

        self.closed
    }
}

/// One-button message box used for notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBox
{
    title: String,
    message: String,
    closed: bool,
}

impl MessageBox
{
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self
    {
        Self {
            title: title.into(),
            message: message.into(),
            closed: false,
        }
    }

    pub fn title(&self) -> &str
    {
        &self.title
    }

    pub fn message(&self) -> &str
    {
        &self.message
    }

    pub const fn is_closed(&self) -> bool
    {
        self.closed
    }
}

impl Dialog for MessageBox
{
    fn render(&mut self, frame: &mut Frame)
    {
        crate::ui::draw_message_box(frame, self);
    }

    fn handle_key_event(&mut self, key_event: KeyEvent) -> bool
    {
        if is_interrupt(key_event)
            || matches!(key_event.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ' | 'q' | 'Q'))
        {
            self.closed = true;
        }
        self.closed
    }
}

/// Ctrl+C; raw mode delivers it as a key instead of a signal
fn is_interrupt(key_event: KeyEvent) -> bool
{
    key_event.code == KeyCode::Char('c') && key_event.modifiers.contains(KeyModifiers::CONTROL)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn key(code: KeyCode) -> KeyEvent
    {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn dialog_with_lines(count: usize) -> ReportDialog
    {
        let text: Vec<String> = (0..count).map(|i| format!("line {i}")).collect();
        ReportDialog::from_text(&text.join("\n"))
    }

    #[test]
    fn test_scroll_is_clamped()
    {
        let mut dialog = dialog_with_lines(30);
        dialog.set_viewport(10);

        dialog.handle_key_event(key(KeyCode::Up));
        assert_eq!(dialog.scroll(), 0);

        dialog.handle_key_event(key(KeyCode::PageDown));
        assert_eq!(dialog.scroll(), 10);
        dialog.handle_key_event(key(KeyCode::PageDown));
        dialog.handle_key_event(key(KeyCode::PageDown));
        assert_eq!(dialog.scroll(), 20);

        dialog.handle_key_event(key(KeyCode::Home));
        assert_eq!(dialog.scroll(), 0);
        dialog.handle_key_event(key(KeyCode::End));
        assert_eq!(dialog.scroll(), 20);
    }

    #[test]
    fn test_short_report_does_not_scroll()
    {
        let mut dialog = dialog_with_lines(3);
        dialog.set_viewport(10);
        dialog.handle_key_event(key(KeyCode::Down));
        dialog.handle_key_event(key(KeyCode::End));
        assert_eq!(dialog.scroll(), 0);
    }

    #[test]
    fn test_growing_viewport_pulls_scroll_back()
    {
        let mut dialog = dialog_with_lines(30);
        dialog.set_viewport(5);
        dialog.handle_key_event(key(KeyCode::End));
        assert_eq!(dialog.scroll(), 25);
        dialog.set_viewport(20);
        assert_eq!(dialog.scroll(), 10);
    }

    #[test]
    fn test_focus_toggles()
    {
        let mut dialog = dialog_with_lines(1);
        assert_eq!(dialog.focus(), Focus::SendReport);
        dialog.handle_key_event(key(KeyCode::Tab));
        assert_eq!(dialog.focus(), Focus::Cancel);
        dialog.handle_key_event(key(KeyCode::Left));
        assert_eq!(dialog.focus(), Focus::SendReport);
    }

    #[test]
    fn test_interrupt_closes_message_box()
    {
        let mut message = MessageBox::new("Crash Handler", "symbols unavailable");
        assert!(!message.handle_key_event(key(KeyCode::Char('x'))));
        assert!(message.handle_key_event(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }
}
