//! # Crash Report
//!
//! Builds the text shown to the user and written to logs. The layout is
//! parsed by external tooling and must stay exactly:
//!
//! ```text
//! Exception Code: 0x<hex>
//! Exception Address: 0x<hex>
//!
//! Stack Trace:
//!   #0: <description>
//!   #1: <description>
//! <extra info, verbatim, when supplied>
//! ```
//!
//! Hex is lowercase without padding; every line ends in `\n`.

use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::types::{Address, FaultContext, ResolvedFrame};

/// Supplier of free-form diagnostic text appended to the report
///
/// A hosted runtime typically registers one to dump its own stacks and
/// thread state. Implemented for any `Fn() -> Option<String>` closure.
pub trait ExtraInfoSupplier: Send + Sync
{
    fn extra_info(&self) -> Option<String>;
}

impl<F> ExtraInfoSupplier for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn extra_info(&self) -> Option<String>
    {
        self()
    }
}

/// A finished crash report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport
{
    code: u32,
    address: Address,
    frames: Vec<ResolvedFrame>,
    extra_info: Option<String>,
    text: String,
}

impl CrashReport
{
    /// Exception code of the fault
    pub fn code(&self) -> u32
    {
        self.code
    }

    /// Address of the faulting instruction
    pub fn address(&self) -> Address
    {
        self.address
    }

    pub fn frames(&self) -> &[ResolvedFrame]
    {
        &self.frames
    }

    /// Extra diagnostic text, if a supplier provided any
    pub fn extra_info(&self) -> Option<&str>
    {
        self.extra_info.as_deref()
    }

    /// The rendered report
    pub fn text(&self) -> &str
    {
        &self.text
    }
}

impl fmt::Display for CrashReport
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.text)
    }
}

/// Assembles a [`CrashReport`]; building never fails
pub struct ReportBuilder<'a>
{
    code: u32,
    address: Address,
    frames: Vec<ResolvedFrame>,
    supplier: Option<&'a dyn ExtraInfoSupplier>,
}

impl<'a> ReportBuilder<'a>
{
    pub fn new(code: u32, address: Address) -> Self
    {
        Self {
            code,
            address,
            frames: Vec::new(),
            supplier: None,
        }
    }

    /// Builder seeded with the code and address of a captured fault
    pub fn for_fault(fault: &FaultContext) -> Self
    {
        Self::new(fault.code(), fault.exception_address())
    }

    #[must_use]
    pub fn frames(mut self, frames: Vec<ResolvedFrame>) -> Self
    {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn extra_info(mut self, supplier: Option<&'a dyn ExtraInfoSupplier>) -> Self
    {
        self.supplier = supplier;
        self
    }

    pub fn build(self) -> CrashReport
    {
        let extra_info = self.supplier.and_then(collect_extra_info);

        let mut text = String::with_capacity(64 + self.frames.len() * 64);
        // Writing to a String cannot fail.
        let _ = writeln!(text, "Exception Code: {:#x}", self.code);
        let _ = writeln!(text, "Exception Address: {:#x}", self.address);
        text.push('\n');
        text.push_str("Stack Trace:\n");
        for frame in &self.frames {
            let _ = writeln!(text, "{frame}");
        }
        if let Some(extra) = &extra_info {
            text.push_str(extra);
        }

        CrashReport {
            code: self.code,
            address: self.address,
            frames: self.frames,
            extra_info,
            text,
        }
    }
}

fn collect_extra_info(supplier: &dyn ExtraInfoSupplier) -> Option<String>
{
    match panic::catch_unwind(AssertUnwindSafe(|| supplier.extra_info())) {
        Ok(text) => text.filter(|text| !text.is_empty()),
        Err(_) => {
            warn!("extra info supplier panicked; omitting its section");
            None
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn frames() -> Vec<ResolvedFrame>
    {
        vec![
            ResolvedFrame::new(0, Address::new(0x1000), "app!crash at src/main.rs:3"),
            ResolvedFrame::new(1, Address::new(0x2000), "app!main at src/main.rs:9"),
        ]
    }

    #[test]
    fn test_report_layout()
    {
        let report = ReportBuilder::new(0xc000_0005, Address::new(0x7ff6_1234)).frames(frames()).build();
        let lines: Vec<&str> = report.text().lines().collect();
        assert_eq!(lines[0], "Exception Code: 0xc0000005");
        assert_eq!(lines[1], "Exception Address: 0x7ff61234");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Stack Trace:");
        assert_eq!(lines[4], "  #0: app!crash at src/main.rs:3");
        assert_eq!(lines[5], "  #1: app!main at src/main.rs:9");
        assert_eq!(lines.len(), 6);
        assert!(report.text().ends_with('\n'));
    }

    #[test]
    fn test_extra_info_appended_verbatim()
    {
        let supplier = || Some("Managed stack:\n  at Game.Update()\n".to_string());
        let report = ReportBuilder::new(1, Address::new(2))
            .frames(frames())
            .extra_info(Some(&supplier))
            .build();
        assert!(report
            .text()
            .ends_with("  #1: app!main at src/main.rs:9\nManaged stack:\n  at Game.Update()\n"));
        assert_eq!(report.extra_info(), Some("Managed stack:\n  at Game.Update()\n"));
    }

    #[test]
    fn test_empty_extra_info_is_omitted()
    {
        let supplier = || Some(String::new());
        let with_empty = ReportBuilder::new(1, Address::new(2))
            .frames(frames())
            .extra_info(Some(&supplier))
            .build();
        let without = ReportBuilder::new(1, Address::new(2)).frames(frames()).build();
        assert_eq!(with_empty.text(), without.text());
        assert!(with_empty.extra_info().is_none());
    }

    #[test]
    fn test_failing_extra_info_is_omitted()
    {
        let none = || None::<String>;
        let panics = || -> Option<String> { panic!("supplier bug") };
        let baseline = ReportBuilder::new(1, Address::new(2)).build();

        let report = ReportBuilder::new(1, Address::new(2)).extra_info(Some(&none)).build();
        assert_eq!(report.text(), baseline.text());
        let report = ReportBuilder::new(1, Address::new(2)).extra_info(Some(&panics)).build();
        assert_eq!(report.text(), baseline.text());
    }

    #[test]
    fn test_report_with_no_frames()
    {
        let report = ReportBuilder::new(0x4000_0015, Address::ZERO).build();
        assert_eq!(report.text(), "Exception Code: 0x40000015\nException Address: 0x0\n\nStack Trace:\n");
    }
}
