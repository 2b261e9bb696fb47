//! # Type Renderer
//!
//! `dt`-style listings of struct layouts, optionally decorated with live
//! values read from the inspected system.
//!
//! ```text
//! dt nt!_LIST_ENTRY  0xFFFFF80004001000
//!   +0x000 Flink                    : Ptr: _LIST_ENTRY            : 0xFFFFF80004001000
//!   +0x008 Blink                    : Ptr: _LIST_ENTRY            : 0xFFFFF80004001000
//! ```
//!
//! Nested structs are expanded up to [`RenderOptions::max_depth`] levels and
//! only while their bytes lie inside the live buffer. Pointers are never
//! followed. A few struct types that read better as a single value
//! (`_LARGE_INTEGER`, `_KEVENT` and the `_EX_*` family) are printed as one.
//!
//! The object header variant renders the `_OBJECT_HEADER` in front of an
//! object body, followed by whichever optional sub-headers its `InfoMask`
//! announces and the pool header in front of those.

mod format;
mod walk;

use tracing::debug;

use self::format::{hexdump, RenderBuffer};
use self::walk::TypeWalker;
use crate::context::State;
use crate::error::{SymbolError, SymbolResult};
use crate::memory::MemoryReader;
use crate::service::SymTag;
use crate::types::{Address, Architecture, ProcessId, SymbolHandle};

/// Output budget of one rendering, in bytes.
pub const MAX_OUTPUT_LEN: usize = 0x1_0000;

/// Live memory is only read for types in this size range.
const LIVE_TYPE_SIZE: std::ops::Range<u32> = 4..0x2000;

/// Hex dumps are capped at this many bytes.
const MAX_HEXDUMP_LEN: usize = 0x2000;

/// Depth used for object sub-headers.
const SUB_HEADER_DEPTH: u8 = 2;

/// How to render a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions
{
    /// Nesting levels to expand below the top-level fields
    pub max_depth: u8,
    /// Kernel address of a live instance to read values from
    pub address: Option<Address>,
    /// Append a hex and ASCII dump of the live bytes
    pub hex_ascii: bool,
    /// Render the object header in front of the object at `address`
    /// instead of the named type
    pub object_header: bool,
}

impl Default for RenderOptions
{
    fn default() -> Self
    {
        Self {
            max_depth: 1,
            address: None,
            hex_ascii: false,
            object_header: false,
        }
    }
}

/// Result of a rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRendering
{
    pub text: String,
    /// Byte size of the rendered type
    pub type_size: u32,
}

/// Sizes of the optional object sub-headers on the inspected system
///
/// A zero size means "unknown". The object header variant only looks at
/// sub-headers once `creator_info` is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectHeaderLayout
{
    pub creator_info: u32,
    pub name_info: u32,
    pub handle_info: u32,
    pub quota_info: u32,
    pub process_info: u32,
    pub audit_info: u32,
    pub pool_header: u32,
}

impl ObjectHeaderLayout
{
    /// Index of the pool header, which is always attempted.
    const POOL_HEADER_INDEX: u32 = 8;

    /// Type name and size of the sub-header selected by `InfoMask` bit
    /// `index`.
    fn sub_header(&self, index: u32) -> Option<(&'static str, u32)>
    {
        let entry = match index {
            0 => ("_OBJECT_HEADER_CREATOR_INFO", self.creator_info),
            1 => ("_OBJECT_HEADER_NAME_INFO", self.name_info),
            2 => ("_OBJECT_HEADER_HANDLE_INFO", self.handle_info),
            3 => ("_OBJECT_HEADER_QUOTA_INFO", self.quota_info),
            4 => ("_OBJECT_HEADER_PROCESS_INFO", self.process_info),
            6 => ("_OBJECT_HEADER_AUDIT_INFO", self.audit_info),
            8 => ("_POOL_HEADER", self.pool_header),
            _ => return None,
        };
        Some(entry).filter(|(_, size)| *size != 0)
    }
}

/// What a rendering needs besides the locked state
pub(crate) struct RenderEnv<'a>
{
    pub architecture: Architecture,
    pub memory: &'a dyn MemoryReader,
    pub layout: ObjectHeaderLayout,
    /// Module alias printed in the header line
    pub alias: &'a str,
}

impl State
{
    /// Render `type_name` from the entry behind `handle`.
    pub(crate) fn render_type(
        &mut self,
        handle: SymbolHandle,
        type_name: &str,
        options: &RenderOptions,
        env: &RenderEnv<'_>,
    ) -> SymbolResult<TypeRendering>
    {
        let base = self.ensure_loaded(handle)?;
        let architecture = env.architecture;

        let type_name = if options.object_header { "_OBJECT_HEADER" } else { type_name };
        let mut address = options.address;
        if options.object_header {
            address = address.map(|va| va - architecture.object_header_size());
        }

        let info = self.service.type_from_name(base, type_name).map_err(|e| {
            debug!("Type lookup for '{type_name}' failed: {e}");
            SymbolError::TypeNotFound(type_name.to_string())
        })?;
        if info.tag != SymTag::Udt {
            return Err(SymbolError::NotComplexType(type_name.to_string()));
        }
        let child_count = self.service.children_count(base, info.type_index).unwrap_or(0);
        if child_count == 0 {
            return Err(SymbolError::NotComplexType(type_name.to_string()));
        }

        let live = address
            .filter(|va| architecture.is_aligned_kernel_address(*va) && LIVE_TYPE_SIZE.contains(&info.size))
            .and_then(|va| {
                env.memory
                    .read_exact(ProcessId::SYSTEM, va, info.size as usize)
                    .ok()
                    .map(|bytes| (va, bytes))
            });

        let mut out = RenderBuffer::new(MAX_OUTPUT_LEN);
        match &live {
            Some((va, _)) if architecture.is_32bit() => {
                out.push(&format!("dt {}!{}  0x{:08X}\n", env.alias, info.name, va.value()));
            }
            Some((va, _)) => out.push(&format!("dt {}!{}  0x{:016X}\n", env.alias, info.name, va.value())),
            None => out.push(&format!("dt {}!{}\n", env.alias, info.name)),
        }

        TypeWalker {
            service: self.service.as_mut(),
            base,
            architecture,
            memory: env.memory,
            max_depth: options.max_depth,
            out: &mut out,
        }
        .walk(0, info.type_index, child_count, None, live.as_ref().map(|(_, bytes)| bytes.as_slice()));

        if let Some((va, bytes)) = live.as_ref().filter(|_| options.hex_ascii && !out.is_empty()) {
            let header = if architecture.is_32bit() {
                format!("\n---\n\ndb  0x{:08X}  L{:03X}\n", va.value(), info.size)
            } else {
                format!("\n---\n\ndb  0x{:016X}  L{:03X}\n", va.value(), info.size)
            };
            out.push(&header);
            out.push(&hexdump(&bytes[..bytes.len().min(MAX_HEXDUMP_LEN)]));
        }

        if let Some((va, bytes)) = live.as_ref().filter(|_| options.object_header && env.layout.creator_info != 0) {
            let info_mask = bytes.get(architecture.info_mask_offset()).copied().unwrap_or(0);
            self.render_sub_headers(handle, *va, u16::from(info_mask), options.hex_ascii, env, &mut out);
        }

        Ok(TypeRendering {
            text: out.into_string(),
            type_size: info.size,
        })
    }

    /// Append the optional sub-headers selected by `info_mask`, walking
    /// backwards from the object header at `header`.
    fn render_sub_headers(
        &mut self,
        handle: SymbolHandle,
        header: Address,
        info_mask: u16,
        hex_ascii: bool,
        env: &RenderEnv<'_>,
        out: &mut RenderBuffer,
    )
    {
        let mut address = header;
        for index in 0..=ObjectHeaderLayout::POOL_HEADER_INDEX {
            let present = info_mask & (1 << index) != 0 || index == ObjectHeaderLayout::POOL_HEADER_INDEX;
            if !present {
                continue;
            }
            let Some((name, size)) = env.layout.sub_header(index) else {
                break;
            };
            address = address - u64::from(size);
            let options = RenderOptions {
                max_depth: SUB_HEADER_DEPTH,
                address: Some(address),
                hex_ascii,
                object_header: false,
            };
            match self.render_type(handle, name, &options, env) {
                Ok(rendering) => {
                    out.push("\n======\n\n");
                    out.push(&rendering.text);
                }
                Err(e) => debug!("Skipping {name} at {address}: {e}"),
            }
        }
    }
}
