//! Test doubles shared by the integration tests.
//!
//! - `MockSymbolService` serves one scripted package (symbols plus a type
//!   table) at whatever synthetic base it is loaded at, and counts calls
//! - `MockMemory` serves byte regions per process
//! - `MockImageParser` answers module sizes and identities per base address
//! - `TestBed` wires them into an `Environment`

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use symdb_core::config::MemorySettingsStore;
use symdb_core::memory::read_error;
use symdb_core::service::{BaseKind, FieldInfo, SymTag, SymbolInfo, TypeId, TypeInfo};
use symdb_core::{
    Address, Architecture, BootstrapMode, ConfigSeed, DebugInfoId, Environment, Guid, ImageParser, InitOptions,
    KernelImage, MemoryReader, ProcessId, ServiceProvider, SymbolDatabase, SymbolError, SymbolPath, SymbolResult,
    SymbolService, ThreadWorkQueue,
};

pub const KERNEL_BASE: u64 = 0xffff_f800_0400_0000;
pub const KERNEL_SIZE: u64 = 0x0080_0000;
pub const DRIVER_BASE: u64 = 0xffff_f800_1000_0000;
pub const SYSTEM: ProcessId = ProcessId(4);

/// Field symbol ids live above every type id.
const FIELD_ID_BASE: TypeId = 0x0010_0000;

pub fn kernel_debug_info() -> DebugInfoId
{
    DebugInfoId::new("ntkrnlmp.pdb", Guid([0x4b; 16]), 1)
}

pub fn driver_debug_info() -> DebugInfoId
{
    DebugInfoId::new("drv.pdb", Guid([0x11; 16]), 1)
}

// --------------------------------------------------------------------------
// Symbol service
// --------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockField
{
    pub name: String,
    pub offset: u32,
    pub bit_length: u64,
    pub type_id: TypeId,
}

impl MockField
{
    pub fn new(name: &str, offset: u32, type_id: TypeId) -> Self
    {
        Self {
            name: name.to_string(),
            offset,
            bit_length: 0,
            type_id,
        }
    }

    pub fn bits(mut self, bit_length: u64) -> Self
    {
        self.bit_length = bit_length;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockType
{
    pub name: Option<String>,
    pub tag: SymTag,
    pub length: u64,
    pub array_count: u32,
    pub element_type: TypeId,
    pub base_kind: BaseKind,
    pub fields: Vec<MockField>,
    /// Child count reported in type records, if different from `fields`
    pub reported_children: Option<u32>,
}

impl MockType
{
    pub fn udt(name: &str, length: u64, fields: Vec<MockField>) -> Self
    {
        Self {
            name: Some(name.to_string()),
            tag: SymTag::Udt,
            length,
            array_count: 0,
            element_type: 0,
            base_kind: BaseKind::NoType,
            fields,
            reported_children: None,
        }
    }

    pub fn base(kind: BaseKind, length: u64) -> Self
    {
        Self {
            name: None,
            tag: SymTag::BaseType,
            length,
            array_count: 0,
            element_type: 0,
            base_kind: kind,
            fields: Vec::new(),
            reported_children: None,
        }
    }

    pub fn pointer(element_type: TypeId, length: u64) -> Self
    {
        Self {
            name: None,
            tag: SymTag::PointerType,
            length,
            array_count: 0,
            element_type,
            base_kind: BaseKind::NoType,
            fields: Vec::new(),
            reported_children: None,
        }
    }

    pub fn array(element_type: TypeId, count: u32, length: u64) -> Self
    {
        Self {
            name: None,
            tag: SymTag::ArrayType,
            length,
            array_count: count,
            element_type,
            base_kind: BaseKind::NoType,
            fields: Vec::new(),
            reported_children: None,
        }
    }

    pub fn function() -> Self
    {
        Self {
            name: None,
            tag: SymTag::FunctionType,
            length: 0,
            array_count: 0,
            element_type: 0,
            base_kind: BaseKind::NoType,
            fields: Vec::new(),
            reported_children: None,
        }
    }
}

/// Scripted package contents and recorded calls
#[derive(Debug, Default)]
pub struct ServiceState
{
    /// Symbol name and offset from the package base
    pub symbols: Vec<(String, u64)>,
    pub types: HashMap<TypeId, MockType>,
    /// Debug-info file names that cannot be located
    pub missing_files: HashSet<String>,
    /// Debug-info file names whose load returns zero
    pub refused_files: HashSet<String>,
    /// Packages loaded so far: path, requested base, size
    pub loaded: Vec<(PathBuf, u64, u32)>,
    pub find_calls: usize,
    pub load_calls: usize,
    pub opened: Vec<String>,
}

impl ServiceState
{
    pub fn add_symbol(&mut self, name: &str, offset: u64)
    {
        self.symbols.push((name.to_string(), offset));
    }

    pub fn add_type(&mut self, id: TypeId, ty: MockType)
    {
        self.types.insert(id, ty);
    }

    fn field(&self, id: TypeId) -> Option<&MockField>
    {
        let packed = id.checked_sub(FIELD_ID_BASE)?;
        let parent = packed / 256;
        let index = (packed % 256) as usize;
        self.types.get(&parent)?.fields.get(index)
    }

    fn named_type(&self, name: &str) -> Option<(TypeId, &MockType)>
    {
        let mut matches: Vec<_> = self
            .types
            .iter()
            .filter(|(_, ty)| ty.name.as_deref().is_some_and(|n| glob_match(name, n)))
            .collect();
        matches.sort_by_key(|(id, _)| **id);
        matches.first().map(|(id, ty)| (**id, *ty))
    }
}

/// Case-insensitive wildcard match with `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool
{
    fn inner(p: &[char], t: &[char]) -> bool
    {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some('?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}

pub struct MockSymbolService
{
    state: Arc<Mutex<ServiceState>>,
}

impl MockSymbolService
{
    fn loaded_base(state: &ServiceState, base: u64) -> SymbolResult<()>
    {
        if state.loaded.iter().any(|(_, loaded, _)| *loaded == base) {
            Ok(())
        } else {
            Err(SymbolError::Service(format!("no package at 0x{base:x}")))
        }
    }
}

impl SymbolService for MockSymbolService
{
    fn find_debug_file(&mut self, id: &DebugInfoId) -> SymbolResult<PathBuf>
    {
        let mut state = self.state.lock().unwrap();
        state.find_calls += 1;
        if state.missing_files.contains(&id.file_name) {
            return Err(SymbolError::Service(format!("{} not found", id.file_name)));
        }
        Ok(PathBuf::from("/cache").join(&id.file_name))
    }

    fn load_module(&mut self, path: &Path, base: u64, size: u32) -> SymbolResult<u64>
    {
        let mut state = self.state.lock().unwrap();
        state.load_calls += 1;
        let file = path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        if state.refused_files.contains(&file) {
            return Ok(0);
        }
        state.loaded.push((path.to_path_buf(), base, size));
        Ok(base)
    }

    fn enum_symbols(
        &mut self,
        base: u64,
        mask: &str,
        visit: &mut dyn FnMut(&SymbolInfo) -> ControlFlow<()>,
    ) -> SymbolResult<()>
    {
        let state = self.state.lock().unwrap();
        Self::loaded_base(&state, base)?;
        for (name, offset) in &state.symbols {
            if !glob_match(mask, name) {
                continue;
            }
            let info = SymbolInfo {
                name: name.clone(),
                address: base + offset,
                module_base: base,
                size: 0,
                type_index: 0,
                tag: SymTag::Data,
            };
            if visit(&info).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn enum_types(
        &mut self,
        base: u64,
        mask: &str,
        visit: &mut dyn FnMut(&SymbolInfo) -> ControlFlow<()>,
    ) -> SymbolResult<()>
    {
        let state = self.state.lock().unwrap();
        Self::loaded_base(&state, base)?;
        let mut ids: Vec<_> = state.types.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let ty = &state.types[&id];
            let Some(name) = ty.name.as_deref().filter(|n| glob_match(mask, n)) else {
                continue;
            };
            let info = SymbolInfo {
                name: name.to_string(),
                address: base,
                module_base: base,
                size: ty.length as u32,
                type_index: id,
                tag: ty.tag,
            };
            if visit(&info).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn type_from_name(&mut self, base: u64, name: &str) -> SymbolResult<SymbolInfo>
    {
        let state = self.state.lock().unwrap();
        Self::loaded_base(&state, base)?;
        if let Some((symbol, offset)) = state.symbols.iter().find(|(s, _)| glob_match(name, s)) {
            return Ok(SymbolInfo {
                name: symbol.clone(),
                address: base + offset,
                module_base: base,
                size: 0,
                type_index: 0,
                tag: SymTag::Data,
            });
        }
        let (id, ty) = state
            .named_type(name)
            .ok_or_else(|| SymbolError::Service(format!("{name} not found")))?;
        Ok(SymbolInfo {
            name: ty.name.clone().unwrap_or_default(),
            address: base,
            module_base: base,
            size: ty.length as u32,
            type_index: id,
            tag: ty.tag,
        })
    }

    fn symbol_from_address(&mut self, address: u64) -> SymbolResult<(SymbolInfo, u64)>
    {
        let state = self.state.lock().unwrap();
        let base = state
            .loaded
            .iter()
            .map(|(_, base, _)| *base)
            .filter(|base| *base <= address)
            .max()
            .ok_or_else(|| SymbolError::Service("address outside packages".to_string()))?;
        let (name, offset) = state
            .symbols
            .iter()
            .filter(|(_, offset)| base + offset <= address)
            .max_by_key(|(_, offset)| *offset)
            .ok_or_else(|| SymbolError::Service("no symbol".to_string()))?;
        Ok((
            SymbolInfo {
                name: name.clone(),
                address: base + offset,
                module_base: base,
                size: 0,
                type_index: 0,
                tag: SymTag::Function,
            },
            address - (base + offset),
        ))
    }

    fn children_count(&mut self, _base: u64, type_id: TypeId) -> SymbolResult<u32>
    {
        let state = self.state.lock().unwrap();
        state
            .types
            .get(&type_id)
            .map(|ty| ty.fields.len() as u32)
            .ok_or_else(|| SymbolError::Service("unknown type".to_string()))
    }

    fn find_children(&mut self, _base: u64, type_id: TypeId) -> SymbolResult<Vec<TypeId>>
    {
        let state = self.state.lock().unwrap();
        let ty = state
            .types
            .get(&type_id)
            .ok_or_else(|| SymbolError::Service("unknown type".to_string()))?;
        Ok((0..ty.fields.len() as u32).map(|i| FIELD_ID_BASE + type_id * 256 + i).collect())
    }

    fn symbol_name(&mut self, _base: u64, id: TypeId) -> SymbolResult<String>
    {
        let state = self.state.lock().unwrap();
        if let Some(field) = state.field(id) {
            return Ok(field.name.clone());
        }
        state
            .types
            .get(&id)
            .and_then(|ty| ty.name.clone())
            .ok_or_else(|| SymbolError::Service("no name".to_string()))
    }

    fn offset(&mut self, _base: u64, id: TypeId) -> SymbolResult<u32>
    {
        let state = self.state.lock().unwrap();
        state
            .field(id)
            .map(|field| field.offset)
            .ok_or_else(|| SymbolError::Service("not a field".to_string()))
    }

    fn base_kind(&mut self, _base: u64, id: TypeId) -> SymbolResult<BaseKind>
    {
        let state = self.state.lock().unwrap();
        state
            .types
            .get(&id)
            .map(|ty| ty.base_kind)
            .ok_or_else(|| SymbolError::Service("unknown type".to_string()))
    }

    fn tag(&mut self, _base: u64, id: TypeId) -> SymbolResult<SymTag>
    {
        let state = self.state.lock().unwrap();
        state
            .types
            .get(&id)
            .map(|ty| ty.tag)
            .ok_or_else(|| SymbolError::Service("unknown type".to_string()))
    }

    fn field_infos(&mut self, _base: u64, parent: TypeId) -> SymbolResult<Vec<FieldInfo>>
    {
        let state = self.state.lock().unwrap();
        let ty = state
            .types
            .get(&parent)
            .ok_or_else(|| SymbolError::Service("unknown type".to_string()))?;
        Ok(ty
            .fields
            .iter()
            .map(|field| FieldInfo {
                name: field.name.clone(),
                bit_length: field.bit_length,
                offset: field.offset,
                type_id: field.type_id,
            })
            .collect())
    }

    fn type_infos(&mut self, _base: u64, ids: &[TypeId]) -> SymbolResult<Vec<TypeInfo>>
    {
        let state = self.state.lock().unwrap();
        ids.iter()
            .map(|id| {
                let ty = state
                    .types
                    .get(id)
                    .ok_or_else(|| SymbolError::Service(format!("unknown type {id}")))?;
                Ok(TypeInfo {
                    name: ty.name.clone(),
                    length: ty.length,
                    tag: Some(ty.tag),
                    array_count: ty.array_count,
                    child_count: ty.reported_children.unwrap_or(ty.fields.len() as u32),
                    element_type: ty.element_type,
                    array_index_type: 0,
                    base_kind: ty.base_kind,
                })
            })
            .collect()
    }
}

pub struct MockProvider
{
    pub state: Arc<Mutex<ServiceState>>,
    pub fail_open: bool,
}

impl ServiceProvider for MockProvider
{
    fn open(&self, path: &SymbolPath) -> SymbolResult<Box<dyn SymbolService>>
    {
        if self.fail_open {
            return Err(SymbolError::Service("symbol service unavailable".to_string()));
        }
        self.state.lock().unwrap().opened.push(path.to_string());
        Ok(Box::new(MockSymbolService {
            state: Arc::clone(&self.state),
        }))
    }
}

// --------------------------------------------------------------------------
// Memory and images
// --------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MockMemory
{
    regions: Mutex<Vec<(ProcessId, u64, Vec<u8>)>>,
    missing_processes: Mutex<HashSet<u32>>,
}

impl MockMemory
{
    pub fn map(&self, pid: ProcessId, address: u64, bytes: Vec<u8>)
    {
        self.regions.lock().unwrap().push((pid, address, bytes));
    }

    pub fn remove_process(&self, pid: ProcessId)
    {
        self.missing_processes.lock().unwrap().insert(pid.0);
    }
}

impl MemoryReader for MockMemory
{
    fn read_exact(&self, pid: ProcessId, address: Address, len: usize) -> SymbolResult<Vec<u8>>
    {
        let regions = self.regions.lock().unwrap();
        let start = address.value();
        regions
            .iter()
            .filter(|(owner, _, _)| *owner == pid)
            .find_map(|(_, base, bytes)| {
                let offset = start.checked_sub(*base)? as usize;
                bytes.get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
            })
            .ok_or_else(|| read_error(pid, address, len))
    }

    fn process_exists(&self, pid: ProcessId) -> bool
    {
        !self.missing_processes.lock().unwrap().contains(&pid.0)
    }
}

#[derive(Debug, Default)]
pub struct MockImageParser
{
    modules: Mutex<HashMap<u64, (Option<u64>, Option<DebugInfoId>)>>,
    pub calls: Mutex<usize>,
}

impl MockImageParser
{
    pub fn add(&self, base: u64, size: Option<u64>, debug_info: Option<DebugInfoId>)
    {
        self.modules.lock().unwrap().insert(base, (size, debug_info));
    }

    pub fn call_count(&self) -> usize
    {
        *self.calls.lock().unwrap()
    }
}

impl ImageParser for MockImageParser
{
    fn module_size(&self, _pid: ProcessId, base: Address) -> Option<u64>
    {
        *self.calls.lock().unwrap() += 1;
        self.modules.lock().unwrap().get(&base.value()).and_then(|(size, _)| *size)
    }

    fn debug_info(&self, _pid: ProcessId, base: Address) -> Option<DebugInfoId>
    {
        *self.calls.lock().unwrap() += 1;
        self.modules
            .lock()
            .unwrap()
            .get(&base.value())
            .and_then(|(_, id)| id.clone())
    }
}

// --------------------------------------------------------------------------
// Test bed
// --------------------------------------------------------------------------

pub struct TestBed
{
    pub memory: Arc<MockMemory>,
    pub images: Arc<MockImageParser>,
    pub service: Arc<Mutex<ServiceState>>,
    pub settings: Arc<MemorySettingsStore>,
    pub architecture: Architecture,
    pub fail_open: bool,
}

impl TestBed
{
    /// 64-bit system whose kernel header carries `ntkrnlmp.pdb`.
    pub fn new() -> Self
    {
        let bed = Self {
            memory: Arc::new(MockMemory::default()),
            images: Arc::new(MockImageParser::default()),
            service: Arc::new(Mutex::new(ServiceState::default())),
            settings: Arc::new(MemorySettingsStore::new()),
            architecture: Architecture::X64,
            fail_open: false,
        };
        bed.images.add(KERNEL_BASE, Some(KERNEL_SIZE), Some(kernel_debug_info()));
        bed
    }

    pub fn x86() -> Self
    {
        let mut bed = Self::new();
        bed.architecture = Architecture::X86;
        bed
    }

    pub fn environment(&self) -> Environment
    {
        Environment {
            memory: self.memory.clone(),
            images: self.images.clone(),
            provider: Arc::new(MockProvider {
                state: Arc::clone(&self.service),
                fail_open: self.fail_open,
            }),
            settings: self.settings.clone(),
            work_queue: Arc::new(ThreadWorkQueue::with_name("symdb-test")),
            kernel: KernelImage::new(Address::new(KERNEL_BASE), KERNEL_SIZE),
            architecture: self.architecture,
            seed: ConfigSeed::new("/opt/symdb"),
        }
    }

    pub fn database(&self) -> SymbolDatabase
    {
        SymbolDatabase::new(self.environment())
    }

    /// Database initialized with a synchronous bootstrap.
    pub fn started(&self) -> SymbolDatabase
    {
        let db = self.database();
        db.initialize(InitOptions {
            kernel_debug_info: None,
            bootstrap: BootstrapMode::Sync,
        })
        .unwrap();
        db
    }

    pub fn with_service<R>(&self, f: impl FnOnce(&mut ServiceState) -> R) -> R
    {
        f(&mut self.service.lock().unwrap())
    }
}
