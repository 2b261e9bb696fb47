//! Process and target architecture types.

use std::fmt;

use super::Address;

/// Process identifier in the inspected system
///
/// Module bases are only meaningful together with the process whose address
/// space they live in, so every memory read carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// The privileged system process that owns the kernel address space.
    pub const SYSTEM: Self = ProcessId(4);
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Pointer width of the inspected system
///
/// Drives the symbol offset strategy, the kernel address check used when
/// decorating string payloads, and the object header geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Architecture
{
    /// 32-bit x86
    X86,
    /// 64-bit x86-64
    #[default]
    X64,
}

impl Architecture
{
    /// Pointer size in bytes.
    pub const fn pointer_size(self) -> u64
    {
        match self {
            Architecture::X86 => 4,
            Architecture::X64 => 8,
        }
    }

    pub const fn is_32bit(self) -> bool
    {
        matches!(self, Architecture::X86)
    }

    /// Whether `address` lies in the kernel half of the address space.
    ///
    /// ```rust
    /// use symdb_core::types::{Address, Architecture};
    ///
    /// assert!(Architecture::X64.is_kernel_address(Address::new(0xffff_f800_0000_1000)));
    /// assert!(!Architecture::X64.is_kernel_address(Address::new(0x0000_7ff0_0000_0000)));
    /// assert!(Architecture::X86.is_kernel_address(Address::new(0x8000_1000)));
    /// ```
    pub const fn is_kernel_address(self, address: Address) -> bool
    {
        let va = address.value();
        match self {
            Architecture::X86 => va <= u32::MAX as u64 && (va & 0x8000_0000) != 0,
            Architecture::X64 => (va >> 47) == 0x1_ffff,
        }
    }

    /// Kernel address that is also pointer aligned.
    pub const fn is_aligned_kernel_address(self, address: Address) -> bool
    {
        self.is_kernel_address(address) && address.value() % self.pointer_size() == 0
    }

    /// Size of the fixed `_OBJECT_HEADER` preceding an object body.
    pub const fn object_header_size(self) -> u64
    {
        match self {
            Architecture::X86 => 0x18,
            Architecture::X64 => 0x30,
        }
    }

    /// Offset of the `InfoMask` byte inside `_OBJECT_HEADER`.
    pub const fn info_mask_offset(self) -> usize
    {
        match self {
            Architecture::X86 => 0x0e,
            Architecture::X64 => 0x1a,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
        };
        write!(f, "{label}")
    }
}
