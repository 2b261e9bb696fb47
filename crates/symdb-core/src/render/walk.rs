//! Recursive walk over a type's children.

use tracing::debug;

use super::format::{format_value, primitive_name, Line, RenderBuffer, VALUE_COLUMN};
use crate::memory::{le_u16, le_u32, le_u64, MemoryReader};
use crate::service::{BaseKind, FieldInfo, SymTag, SymbolService, TypeId, TypeInfo};
use crate::types::{Address, Architecture, ProcessId};

/// Longest `_UNICODE_STRING` payload decoded, in bytes.
const MAX_UNICODE_PAYLOAD: u16 = 520;

/// Struct types printed as a single value instead of being expanded.
fn is_opaque(type_name: &str) -> bool
{
    type_name == "_LARGE_INTEGER"
        || type_name == "_KEVENT"
        || type_name.get(..4).is_some_and(|prefix| prefix.eq_ignore_ascii_case("_EX_"))
}

/// Walks a type tree and writes one line per field
pub(crate) struct TypeWalker<'a>
{
    pub service: &'a mut dyn SymbolService,
    pub base: u64,
    pub architecture: Architecture,
    pub memory: &'a dyn MemoryReader,
    pub max_depth: u8,
    pub out: &'a mut RenderBuffer,
}

impl TypeWalker<'_>
{
    /// Write the children of `type_id` at indentation `level`.
    ///
    /// `memory` holds the live bytes of the type, if any. A level whose child
    /// records do not match `child_count` is skipped.
    pub fn walk(&mut self, level: u8, type_id: TypeId, child_count: u32, parent: Option<&str>, memory: Option<&[u8]>)
    {
        let Some((fields, types)) = self.children(type_id, child_count) else {
            return;
        };

        let mut bit_base = 0u64;
        let mut last_size = 0u64;
        for (index, (field, info)) in fields.iter().zip(&types).enumerate() {
            let size = if info.array_count != 0 {
                info.length / u64::from(info.array_count)
            } else {
                info.length
            };

            let mut type_name = info.name.clone();
            let is_indirect = matches!(info.tag, Some(SymTag::ArrayType | SymTag::PointerType));
            if type_name.is_none() && info.element_type != 0 && is_indirect {
                type_name = self.service.symbol_name(self.base, info.element_type).ok();
            }

            if bit_base != 0 && (last_size != size || bit_base >= size << 3 || !matches!(size, 1 | 2 | 4 | 8)) {
                bit_base = 0;
            }
            let Some(bit_end) = bit_base.checked_add(field.bit_length) else {
                debug!("Type {type_id}: bit-field '{}' overflows its bit range", field.name);
                return;
            };

            let mut line = Line::new();
            let indent = usize::from(level) * 2;
            let pad = 24usize.saturating_sub(indent);
            line.push(&format!("{:indent$}  +0x{:03x} {:<pad$} : ", "", field.offset, field.name));
            if info.array_count != 0 {
                line.push(&format!("[{}] ", info.array_count));
            }
            if info.tag == Some(SymTag::PointerType) {
                line.push("Ptr: ");
            }

            let mut kind = info.base_kind;
            if info.element_type != 0 && type_name.is_none() {
                kind = self.element_kind(info.element_type);
            }

            let mut tag = info.tag;
            if tag == Some(SymTag::Udt) && type_name.as_deref().is_some_and(is_opaque) {
                tag = Some(SymTag::BaseType);
            }

            if tag == Some(SymTag::Udt) {
                line.push(type_name.as_deref().unwrap_or_default());
                self.out.push_line(&line);

                let end = u64::from(field.offset).saturating_add(info.length);
                let fits = memory.is_none_or(|bytes| end <= bytes.len() as u64);
                if info.child_count != 0 && level < self.max_depth && fits {
                    let nested = memory.map(|bytes| &bytes[field.offset as usize..]);
                    self.walk(level + 1, field.type_id, info.child_count, type_name.as_deref(), nested);
                }
            } else {
                let name = type_name.as_deref().unwrap_or_else(|| primitive_name(kind, size));
                line.push(name);
                if field.bit_length != 0 {
                    line.push(&format!(" bit[{}:{}]", bit_base, bit_end - 1));
                }

                let has_value = matches!(tag, Some(SymTag::BaseType | SymTag::PointerType)) && matches!(size, 1 | 2 | 4 | 8);
                if let Some(bytes) = memory.filter(|_| has_value) {
                    if let Some(value) = read_value(bytes, field, size, bit_base) {
                        let pad = VALUE_COLUMN.saturating_sub(line.len());
                        line.push(&format!("{:pad$} : {}", "", format_value(value, size)));
                    }
                }

                if let Some(bytes) = memory {
                    if child_count == 3 && index == 2 && parent == Some("_UNICODE_STRING") {
                        if let Some(text) = self.unicode_payload(bytes) {
                            line.push(" - ");
                            line.push(&text);
                        }
                    }
                }
            }

            if !line.is_empty() && tag != Some(SymTag::Udt) {
                self.out.push_line(&line);
            }
            last_size = size;
            bit_base = bit_end;
        }
    }

    /// Field and type records for every child, verified against the count.
    fn children(&mut self, type_id: TypeId, child_count: u32) -> Option<(Vec<FieldInfo>, Vec<TypeInfo>)>
    {
        let fields = self.service.field_infos(self.base, type_id).ok()?;
        if fields.len() != child_count as usize {
            debug!(
                "Type {type_id} reported {child_count} children but {} field records",
                fields.len()
            );
            return None;
        }
        let ids: Vec<TypeId> = fields.iter().map(|field| field.type_id).collect();
        let types = self.service.type_infos(self.base, &ids).ok()?;
        if types.len() != fields.len() {
            debug!("Type {type_id}: {} type records for {} fields", types.len(), fields.len());
            return None;
        }
        Some((fields, types))
    }

    /// Primitive kind of an array element or pointee, with synthetic kinds
    /// for function and pointer targets.
    fn element_kind(&mut self, element: TypeId) -> BaseKind
    {
        let kind = self.service.base_kind(self.base, element).unwrap_or_default();
        if !kind.is_none() {
            return kind;
        }
        match self.service.tag(self.base, element) {
            Ok(SymTag::FunctionType) => BaseKind::Function,
            Ok(SymTag::PointerType) => BaseKind::Pointer,
            _ => kind,
        }
    }

    /// Decode the string a live `_UNICODE_STRING` points at.
    fn unicode_payload(&self, bytes: &[u8]) -> Option<String>
    {
        let len = le_u16(bytes, 0)?;
        let buffer = if self.architecture.is_32bit() {
            u64::from(le_u32(bytes, 4)?)
        } else {
            le_u64(bytes, 8)?
        };
        let address = Address::new(buffer);
        if !self.architecture.is_kernel_address(address) || len == 0 || len % 2 != 0 || len >= MAX_UNICODE_PAYLOAD {
            return None;
        }
        let payload = self
            .memory
            .read_exact(ProcessId::SYSTEM, address, usize::from(len))
            .ok()?;
        let units: Vec<u16> = payload
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    }
}

/// Little-endian value of a field, narrowed to its bit range for bit-fields.
fn read_value(bytes: &[u8], field: &FieldInfo, size: u64, bit_base: u64) -> Option<u64>
{
    let start = field.offset as usize;
    let raw = bytes.get(start..start + size as usize)?;
    let mut value = [0u8; 8];
    value[..raw.len()].copy_from_slice(raw);
    let mut value = u64::from_le_bytes(value);

    if field.bit_length != 0 {
        value = value.checked_shr(bit_base as u32).unwrap_or(0);
        if field.bit_length < 64 {
            value &= (1u64 << field.bit_length) - 1;
        }
    }
    Some(value)
}
