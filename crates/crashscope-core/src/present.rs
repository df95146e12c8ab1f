//! # Presentation
//!
//! The last step of handling a fault: putting the report in front of a
//! human. Presentation is blocking; the faulting thread stays parked until
//! the presenter returns.
//!
//! The interactive dialog lives in `crashscope-ui`. This module only defines
//! the seam and the plain-text fallback used when no terminal UI is
//! available.

use std::io::{self, Write};

use crate::report::CrashReport;

/// Displays crash reports and configuration notices
pub trait Presenter: Send + Sync
{
    /// Show a finished crash report; returns once the user dismissed it
    fn present(&self, report: &CrashReport);

    /// Show a one-off notice (for example a symbol engine failure)
    fn notify(&self, title: &str, message: &str);
}

/// Writes reports to standard error
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrPresenter;

const BANNER: &str = "==================== crash report ====================";

impl StderrPresenter
{
    /// Render `report` the way [`Presenter::present`] prints it
    pub fn write_report(out: &mut impl Write, report: &CrashReport) -> io::Result<()>
    {
        writeln!(out, "{BANNER}")?;
        out.write_all(report.text().as_bytes())?;
        if !report.text().ends_with('\n') {
            writeln!(out)?;
        }
        writeln!(out, "{}", "=".repeat(BANNER.len()))?;
        out.flush()
    }
}

impl Presenter for StderrPresenter
{
    fn present(&self, report: &CrashReport)
    {
        let stderr = io::stderr();
        // Nothing useful can be done if stderr is gone.
        let _ = Self::write_report(&mut stderr.lock(), report);
    }

    fn notify(&self, title: &str, message: &str)
    {
        let _ = writeln!(io::stderr().lock(), "{title}: {message}");
    }
}

impl<P: Presenter + ?Sized> Presenter for Box<P>
{
    fn present(&self, report: &CrashReport)
    {
        (**self).present(report);
    }

    fn notify(&self, title: &str, message: &str)
    {
        (**self).notify(title, message);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::report::ReportBuilder;
    use crate::types::Address;

    #[test]
    fn test_stderr_layout_wraps_report()
    {
        let report = ReportBuilder::new(0xc000_0005, Address::new(0x10)).build();
        let mut out = Vec::new();
        StderrPresenter::write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(BANNER));
        assert!(text.contains("Exception Code: 0xc0000005\n"));
        assert!(text.trim_end().ends_with("======"));
    }

    #[test]
    fn test_unterminated_extra_info_gets_newline()
    {
        let extra = || Some("no trailing newline".to_string());
        let report = ReportBuilder::new(1, Address::new(1)).extra_info(Some(&extra)).build();
        let mut out = Vec::new();
        StderrPresenter::write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("no trailing newline\n===="));
    }
}
