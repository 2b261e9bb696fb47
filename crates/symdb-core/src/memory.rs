//! # Memory Access
//!
//! Narrow view of the inspected system's virtual memory.
//!
//! The symbol database reads memory for three things: module headers (through
//! an [`ImageParser`](crate::image::ImageParser)), the kernel image during the
//! bootstrap scan, and live values when rendering a type. Everything goes
//! through [`MemoryReader`], so the database works the same against a live
//! system, a memory dump, or a test double.

use crate::error::{SymbolError, SymbolResult};
use crate::types::{Address, ProcessId};

/// Reads virtual memory of processes in the inspected system
pub trait MemoryReader: Send + Sync
{
    /// Read exactly `len` bytes at `address` in `pid`'s address space.
    ///
    /// Implementations must fail rather than return a short or partially
    /// filled buffer.
    fn read_exact(&self, pid: ProcessId, address: Address, len: usize) -> SymbolResult<Vec<u8>>;

    /// Best-effort read of `len` bytes; unreadable ranges are zero filled.
    ///
    /// The default implementation falls back page by page to
    /// [`Self::read_exact`].
    fn read_padded(&self, pid: ProcessId, address: Address, len: usize) -> Vec<u8>
    {
        const PAGE: usize = 0x1000;

        if let Ok(bytes) = self.read_exact(pid, address, len) {
            return bytes;
        }

        let mut buffer = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let page_va = address + done as u64;
            let chunk = (PAGE - (page_va.value() as usize & (PAGE - 1))).min(len - done);
            if let Ok(bytes) = self.read_exact(pid, page_va, chunk) {
                buffer[done..done + chunk].copy_from_slice(&bytes);
            }
            done += chunk;
        }
        buffer
    }

    /// Whether `pid` exists in the inspected system.
    fn process_exists(&self, _pid: ProcessId) -> bool
    {
        true
    }
}

/// Read a little-endian `u16` at `offset` in `bytes`.
pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> Option<u16>
{
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

/// Read a little-endian `u32` at `offset` in `bytes`.
pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> Option<u32>
{
    let raw = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Read a little-endian `u64` at `offset` in `bytes`.
pub(crate) fn le_u64(bytes: &[u8], offset: usize) -> Option<u64>
{
    let raw = bytes.get(offset..offset + 8)?;
    let mut value = [0u8; 8];
    value.copy_from_slice(raw);
    Some(u64::from_le_bytes(value))
}

/// Error for a failed read, for implementors of [`MemoryReader`].
pub fn read_error(pid: ProcessId, address: Address, len: usize) -> SymbolError
{
    SymbolError::Memory { pid, address, len }
}
