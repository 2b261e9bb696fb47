//! Debug-info identity types.
//!
//! A module's debug-info package is identified by the triple (file name,
//! GUID, age) recorded in the module's CodeView `RSDS` record. The same triple
//! names the package on a symbol server, and the content hash of the triple is
//! the module's [`SymbolHandle`](super::SymbolHandle).

use std::fmt;
use std::str::FromStr;

use crate::error::SymbolError;

/// Signature of a CodeView 7.0 (`RSDS`) debug record, little endian.
pub const RSDS_SIGNATURE: u32 = 0x5344_5352;

/// Byte length of the fixed part of an `RSDS` record (signature, GUID, age).
pub const RSDS_HEADER_LEN: usize = 4 + 16 + 4;

/// 16-byte debug-info GUID in its on-disk (mixed endian) byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid(pub [u8; 16]);

impl Guid
{
    /// Raw bytes as stored in the CodeView record.
    pub const fn bytes(&self) -> &[u8; 16]
    {
        &self.0
    }

    /// First eight bytes read as a little-endian qword.
    pub fn low_qword(&self) -> u64
    {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(low)
    }

    /// Last eight bytes read as a little-endian qword.
    pub fn high_qword(&self) -> u64
    {
        let mut high = [0u8; 8];
        high.copy_from_slice(&self.0[8..]);
        u64::from_le_bytes(high)
    }

    /// Symbol server form: 32 upper-case hex digits, no separators.
    pub fn to_symbol_server_string(&self) -> String
    {
        self.to_string().replace('-', "")
    }
}

impl fmt::Display for Guid
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);
        write!(f, "{data1:08X}-{data2:04X}-{data3:04X}-{:02X}{:02X}-", b[8], b[9])?;
        for byte in &b[10..] {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Guid
{
    type Err = SymbolError;

    /// Parse either the dashed display form (optionally in braces) or the
    /// 32-digit symbol server form.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let digits: String = s
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .chars()
            .filter(|c| *c != '-')
            .collect();
        if digits.len() != 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SymbolError::Config(format!("Invalid GUID '{s}'")));
        }

        let mut text = [0u8; 16];
        for (i, slot) in text.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| SymbolError::Config(format!("Invalid GUID '{s}'")))?;
        }

        // Text order is big endian per field; the first three fields are
        // stored little endian.
        let mut bytes = text;
        bytes[0..4].reverse();
        bytes[4..6].reverse();
        bytes[6..8].reverse();
        Ok(Guid(bytes))
    }
}

/// Debug-info identity of one module build
///
/// ## Example
///
/// ```rust
/// use symdb_core::types::{DebugInfoId, Guid};
///
/// let id = DebugInfoId::new("ntkrnlmp.pdb", Guid([0x11; 16]), 1);
/// assert_eq!(id.module_name(), "ntkrnlmp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugInfoId
{
    /// Debug-info file name, for example `ntkrnlmp.pdb`
    pub file_name: String,
    /// Build GUID
    pub guid: Guid,
    /// Build age
    pub age: u32,
}

impl DebugInfoId
{
    pub fn new(file_name: impl Into<String>, guid: Guid, age: u32) -> Self
    {
        Self {
            file_name: file_name.into(),
            guid,
            age,
        }
    }

    /// Display name derived from the file name: everything before the first
    /// `.pdb`, or the whole name when there is none.
    pub fn module_name(&self) -> &str
    {
        match self.file_name.find(".pdb") {
            Some(cut) => &self.file_name[..cut],
            None => &self.file_name,
        }
    }

    /// Parse a CodeView `RSDS` record.
    ///
    /// Returns `None` when the signature does not match or the record is too
    /// short to hold the fixed fields. The file name ends at the first NUL
    /// byte or at the end of `record`.
    pub fn parse_codeview(record: &[u8]) -> Option<Self>
    {
        if record.len() < RSDS_HEADER_LEN {
            return None;
        }
        let signature = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        if signature != RSDS_SIGNATURE {
            return None;
        }

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&record[4..20]);
        let age = u32::from_le_bytes([record[20], record[21], record[22], record[23]]);

        let name = &record[RSDS_HEADER_LEN..];
        let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
        let file_name = String::from_utf8_lossy(&name[..end]).into_owned();
        if file_name.is_empty() {
            return None;
        }

        Some(Self::new(file_name, Guid(guid), age))
    }
}

impl fmt::Display for DebugInfoId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {{{}}} age {}", self.file_name, self.guid, self.age)
    }
}
