//! Instruction and data address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed address in the current process
///
/// Program counters, frame pointers and fault addresses all travel as
/// `Address` so they cannot be confused with displacements or sizes.
///
/// Formatting follows the crash report convention: lowercase hex with a
/// `0x` prefix and no zero padding.
///
/// ## Example
///
/// ```rust
/// use crashscope_core::types::Address;
///
/// let addr = Address::new(0x1000);
/// assert_eq!((addr + 0x10).to_string(), "0x1010");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address, used as the end-of-stack sentinel
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts)
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the null sentinel
    pub const fn is_zero(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow
    ///
    /// ```rust
    /// use crashscope_core::types::Address;
    ///
    /// assert_eq!(Address::new(0x1000).checked_add(8), Some(Address::new(0x1008)));
    /// assert_eq!(Address::new(u64::MAX).checked_add(1), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
