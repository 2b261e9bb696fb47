//! Symbol handles.

use std::fmt;

/// Opaque reference to a registered debug-info entry
///
/// A handle is the entry's content hash, so the same (name, GUID, age) triple
/// always yields the same handle, even across database restarts. Two values
/// are reserved:
///
/// - [`SymbolHandle::NONE`] (zero) never names an entry and is rejected by
///   every query
/// - [`SymbolHandle::KERNEL`] resolves the running kernel's own entry by name
///   each time it is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolHandle(u64);

impl SymbolHandle
{
    /// The "no entry" handle.
    pub const NONE: Self = SymbolHandle(0);

    /// Sentinel for the running kernel's entry.
    pub const KERNEL: Self = SymbolHandle(u64::MAX);

    /// Wrap a raw handle value (for example a content hash).
    pub const fn from_raw(raw: u64) -> Self
    {
        SymbolHandle(raw)
    }

    /// The raw handle value.
    pub const fn raw(self) -> u64
    {
        self.0
    }

    pub const fn is_none(self) -> bool
    {
        self.0 == 0
    }

    pub const fn is_kernel(self) -> bool
    {
        self.0 == u64::MAX
    }
}

impl fmt::Display for SymbolHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_kernel() {
            write!(f, "<kernel>")
        } else {
            write!(f, "0x{:016x}", self.0)
        }
    }
}
