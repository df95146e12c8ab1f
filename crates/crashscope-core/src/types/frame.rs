//! Resolved stack frame.

use std::fmt;

use super::Address;

/// One frame of a crash stack, innermost first
///
/// `description` is whatever the symbol resolution chain produced for `pc`;
/// it is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame
{
    /// Zero-based position, `0` is the faulting instruction
    pub index: usize,
    /// Program counter of the frame
    pub pc: Address,
    /// Resolved description of `pc`
    pub description: String,
}

impl ResolvedFrame
{
    /// Create a frame record
    pub fn new(index: usize, pc: Address, description: impl Into<String>) -> Self
    {
        Self {
            index,
            pc,
            description: description.into(),
        }
    }
}

impl fmt::Display for ResolvedFrame
{
    /// Renders the report line for this frame, without the trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "  #{}: {}", self.index, self.description)
    }
}
