//! Tests for reading module identities out of PE headers in memory

mod common;

use std::sync::Arc;

use common::{MockMemory, DRIVER_BASE, SYSTEM};
use symdb_core::types::debug_info::RSDS_SIGNATURE;
use symdb_core::{Address, DebugInfoId, Guid, ImageParser, PeImageParser};

const NT_OFFSET: usize = 0x80;
const DEBUG_DIR_RVA: u32 = 0x200;
const CODEVIEW_RVA: u32 = 0x300;

fn put_u16(buf: &mut [u8], at: usize, value: u16)
{
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32)
{
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Header page of a PE32+ image with one debug directory entry.
fn pe64_image(size_of_image: u32, debug_type: u32) -> Vec<u8>
{
    let mut page = vec![0u8; 0x1000];
    page[0..2].copy_from_slice(b"MZ");
    put_u32(&mut page, 0x3c, NT_OFFSET as u32);

    page[NT_OFFSET..NT_OFFSET + 4].copy_from_slice(b"PE\0\0");
    let file_header = NT_OFFSET + 4;
    put_u16(&mut page, file_header, 0x8664);
    put_u16(&mut page, file_header + 16, 0xf0);
    put_u16(&mut page, file_header + 18, 0x22);

    let optional = file_header + 20;
    put_u16(&mut page, optional, 0x20b);
    put_u32(&mut page, optional + 56, size_of_image);
    put_u32(&mut page, optional + 60, 0x400);
    put_u32(&mut page, optional + 108, 16);
    let debug_dir = optional + 112 + 6 * 8;
    put_u32(&mut page, debug_dir, DEBUG_DIR_RVA);
    put_u32(&mut page, debug_dir + 4, 28);

    let mut record = RSDS_SIGNATURE.to_le_bytes().to_vec();
    record.extend_from_slice(&[0x42; 16]);
    record.extend_from_slice(&7u32.to_le_bytes());
    record.extend_from_slice(b"drv.pdb\0");

    let entry = DEBUG_DIR_RVA as usize;
    put_u32(&mut page, entry + 12, debug_type);
    put_u32(&mut page, entry + 16, record.len() as u32);
    put_u32(&mut page, entry + 20, CODEVIEW_RVA);
    put_u32(&mut page, entry + 24, CODEVIEW_RVA);

    let cv = CODEVIEW_RVA as usize;
    page[cv..cv + record.len()].copy_from_slice(&record);
    page
}

fn parser_over(page: Vec<u8>) -> PeImageParser
{
    let memory = Arc::new(MockMemory::default());
    memory.map(SYSTEM, DRIVER_BASE, page);
    PeImageParser::new(memory)
}

#[test]
fn test_pe64_module_size_and_identity()
{
    let parser = parser_over(pe64_image(0x0003_5000, 2));
    let base = Address::new(DRIVER_BASE);

    assert_eq!(parser.module_size(SYSTEM, base), Some(0x0003_5000));
    assert_eq!(
        parser.debug_info(SYSTEM, base),
        Some(DebugInfoId::new("drv.pdb", Guid([0x42; 16]), 7))
    );
}

#[test]
fn test_image_without_codeview_entry()
{
    let parser = parser_over(pe64_image(0x0003_5000, 4));
    let base = Address::new(DRIVER_BASE);

    assert_eq!(parser.module_size(SYSTEM, base), Some(0x0003_5000));
    assert_eq!(parser.debug_info(SYSTEM, base), None);
}

#[test]
fn test_unreadable_or_invalid_header()
{
    let parser = parser_over(vec![0u8; 0x1000]);

    assert_eq!(parser.module_size(SYSTEM, Address::new(DRIVER_BASE)), None);
    assert_eq!(parser.debug_info(SYSTEM, Address::new(DRIVER_BASE)), None);
    assert_eq!(parser.module_size(SYSTEM, Address::new(DRIVER_BASE + 0x10_0000)), None);
}
