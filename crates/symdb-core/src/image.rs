//! # Module Images
//!
//! Extracting a module's in-memory size and debug-info identity from its PE
//! header, read straight out of the inspected process.
//!
//! Layouts come from the `object` crate's PE definitions. Only the header page,
//! the debug directory and the CodeView record are read, never the whole
//! image.

use std::mem::size_of;
use std::sync::Arc;

use object::pe::{ImageDebugDirectory, ImageDosHeader, ImageNtHeaders32, ImageNtHeaders64};
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader};
use object::LittleEndian as LE;
use tracing::debug;

use crate::memory::MemoryReader;
use crate::types::{Address, DebugInfoId, ProcessId};

/// Bytes read for the DOS and NT headers.
const HEADER_PAGE: usize = 0x1000;

/// Upper bound on a CodeView record read.
const MAX_CODEVIEW_LEN: usize = 0x400;

/// Upper bound on debug directory entries considered.
const MAX_DEBUG_ENTRIES: usize = 32;

/// Module image header parser
///
/// Both operations return `None` when the header is unreadable or does not
/// carry the requested information.
pub trait ImageParser: Send + Sync
{
    /// Declared in-memory size of the module mapped at `base`.
    fn module_size(&self, pid: ProcessId, base: Address) -> Option<u64>;

    /// Debug-info identity from the module's CodeView record.
    fn debug_info(&self, pid: ProcessId, base: Address) -> Option<DebugInfoId>;
}

/// Parsed view of the parts of a PE header the database needs
struct PeHeader
{
    size_of_image: u64,
    debug_directory: Option<(u32, u32)>,
}

impl PeHeader
{
    fn parse(page: &[u8]) -> Option<Self>
    {
        let dos = ImageDosHeader::parse(page).ok()?;
        let nt_offset = u64::from(dos.nt_headers_offset());

        let mut offset = nt_offset;
        if let Ok((nt, directories)) = ImageNtHeaders64::parse(page, &mut offset) {
            return Some(Self {
                size_of_image: u64::from(nt.optional_header().size_of_image()),
                debug_directory: directories
                    .get(object::pe::IMAGE_DIRECTORY_ENTRY_DEBUG)
                    .map(|dir| dir.address_range()),
            });
        }

        let mut offset = nt_offset;
        let (nt, directories) = ImageNtHeaders32::parse(page, &mut offset).ok()?;
        Some(Self {
            size_of_image: u64::from(nt.optional_header().size_of_image()),
            debug_directory: directories
                .get(object::pe::IMAGE_DIRECTORY_ENTRY_DEBUG)
                .map(|dir| dir.address_range()),
        })
    }
}

/// [`ImageParser`] over PE images in live memory
pub struct PeImageParser
{
    memory: Arc<dyn MemoryReader>,
}

impl PeImageParser
{
    pub fn new(memory: Arc<dyn MemoryReader>) -> Self
    {
        Self { memory }
    }

    fn header(&self, pid: ProcessId, base: Address) -> Option<PeHeader>
    {
        let page = self.memory.read_exact(pid, base, HEADER_PAGE).ok()?;
        PeHeader::parse(&page)
    }

    fn codeview(&self, pid: ProcessId, base: Address, rva: u32, len: u32) -> Option<DebugInfoId>
    {
        let len = (len as usize).min(MAX_CODEVIEW_LEN);
        let record = self.memory.read_exact(pid, base + u64::from(rva), len).ok()?;
        DebugInfoId::parse_codeview(&record)
    }
}

impl ImageParser for PeImageParser
{
    fn module_size(&self, pid: ProcessId, base: Address) -> Option<u64>
    {
        self.header(pid, base).map(|header| header.size_of_image)
    }

    fn debug_info(&self, pid: ProcessId, base: Address) -> Option<DebugInfoId>
    {
        let header = self.header(pid, base)?;
        let (rva, size) = header.debug_directory.filter(|(rva, size)| *rva != 0 && *size != 0)?;

        let count = (size as usize / size_of::<ImageDebugDirectory>()).min(MAX_DEBUG_ENTRIES);
        let bytes = self
            .memory
            .read_exact(pid, base + u64::from(rva), count * size_of::<ImageDebugDirectory>())
            .ok()?;
        let (entries, _) = object::pod::slice_from_bytes::<ImageDebugDirectory>(&bytes, count).ok()?;

        let found = entries
            .iter()
            .filter(|entry| entry.typ.get(LE) == object::pe::IMAGE_DEBUG_TYPE_CODEVIEW)
            .find_map(|entry| {
                self.codeview(pid, base, entry.address_of_raw_data.get(LE), entry.size_of_data.get(LE))
            });
        if found.is_none() {
            debug!("No CodeView record in module at {base} (pid {pid})");
        }
        found
    }
}
