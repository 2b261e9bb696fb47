//! Virtual addresses in the inspected system.

use std::fmt;
use std::ops::{Add, Sub};

/// Virtual address in the inspected system's address space
///
/// Module bases, kernel object addresses and symbol addresses travel as
/// `Address`. Offsets from a module base stay plain integers, so `base +
/// offset` reads naturally while an offset can never be passed where a
/// kernel address is expected. Arithmetic wraps, matching how the inspected
/// system's pointers behave.
///
/// ```rust
/// use symdb_core::types::Address;
///
/// let ntoskrnl = Address::new(0xfffff800_04000000);
/// let symbol = ntoskrnl + 0x1234;
/// assert_eq!(symbol.value(), 0xfffff800_04001234);
/// assert_eq!(symbol.to_string(), "0xfffff80004001234");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Unknown addresses (for example a kernel base the host could not find)
    /// are zero.
    pub const fn is_zero(self) -> bool
    {
        self.0 == 0
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

/// Always 16 hex digits, the way kernel debuggers print 64-bit pointers.
impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, offset: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(offset))
    }
}

/// Walking backwards from an object body to its headers.
impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, len: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(len))
    }
}
