//! # Hashing
//!
//! The two hashes that key the entry store.
//!
//! - The **content hash** of a debug-info identity is the entry's handle. It
//!   mixes the file name hash with the age and both GUID qwords, in that
//!   order, so every input (and their order) changes the result.
//! - The **module name hash** keys the by-name map. Names are normalized
//!   first so lookups ignore case and path-hostile characters.
//!
//! Both are pure functions and stable across runs.

use crate::types::{DebugInfoId, Guid, SymbolHandle};

/// Characters replaced by `_` during module name normalization.
const RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// 32-bit rolling hash of a byte string: rotate right 13, add the byte.
pub fn string_hash(text: &str) -> u32
{
    text.bytes()
        .fold(0u32, |hash, c| hash.rotate_right(13).wrapping_add(u32::from(c)))
}

/// Content hash of a debug-info identity.
///
/// ```rust
/// use symdb_core::hash::content_hash;
/// use symdb_core::types::Guid;
///
/// let a = content_hash("drv.pdb", &Guid([1; 16]), 1);
/// let b = content_hash("drv.pdb", &Guid([1; 16]), 2);
/// assert_ne!(a, b);
/// ```
pub fn content_hash(file_name: &str, guid: &Guid, age: u32) -> u64
{
    let mut hash = u64::from(string_hash(file_name));
    hash = u64::from(age).wrapping_add(hash.rotate_right(13));
    hash = guid.low_qword().wrapping_add(hash.rotate_right(13));
    guid.high_qword().wrapping_add(hash.rotate_right(13))
}

/// Handle for a debug-info identity.
pub fn handle_for(id: &DebugInfoId) -> SymbolHandle
{
    SymbolHandle::from_raw(content_hash(&id.file_name, &id.guid, id.age))
}

/// Normalized form of a module display name: upper case, with path
/// separators and other reserved characters replaced by `_`.
pub fn normalize_module_name(name: &str) -> String
{
    name.chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .flat_map(char::to_uppercase)
        .collect()
}

/// 32-bit hash of a normalized module name, folded over UTF-16 code units.
///
/// ```rust
/// use symdb_core::hash::module_name_hash;
///
/// assert_eq!(module_name_hash("ntoskrnl"), module_name_hash("NTOSKRNL"));
/// ```
pub fn module_name_hash(name: &str) -> u32
{
    normalize_module_name(name)
        .encode_utf16()
        .fold(0u32, |hash, unit| hash.rotate_right(13).wrapping_add(u32::from(unit)))
}
