//! # Entry Store
//!
//! Debug-info entries, kept in an arena and indexed two ways:
//!
//! - by **content hash** (the handle), one entry per distinct identity
//! - by **module name hash**, pointing at the first entry registered under a
//!   name
//!
//! Entries are never removed while the store lives, so arena indices stay
//! valid and handles stay stable. Only the loader mutates an entry after
//! registration, and only its [`LoadState`].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::hash::{handle_for, module_name_hash};
use crate::types::{Address, DebugInfoId, SymbolHandle};

/// Load progress of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadState
{
    /// Registered; the package has not been looked for yet
    Pending,
    /// Located and loaded into the symbol service
    Loaded
    {
        path: PathBuf,
        load_address: u64,
    },
    /// Locating or loading failed; never retried
    Failed,
}

/// Internal record of one module's debug-info identity and load state
#[derive(Debug, Clone)]
pub(crate) struct DebugInfoEntry
{
    pub handle: SymbolHandle,
    pub module_base: Address,
    pub module_size: u32,
    pub module_name: String,
    pub debug_info: DebugInfoId,
    pub state: LoadState,
}

impl DebugInfoEntry
{
    pub fn is_failed(&self) -> bool
    {
        self.state == LoadState::Failed
    }

    pub fn snapshot(&self) -> ModuleEntry
    {
        let (local_path, load_address) = match &self.state {
            LoadState::Loaded { path, load_address } => (Some(path.clone()), Some(*load_address)),
            LoadState::Pending | LoadState::Failed => (None, None),
        };
        ModuleEntry {
            handle: self.handle,
            module_base: self.module_base,
            module_size: self.module_size,
            module_name: self.module_name.clone(),
            debug_info: self.debug_info.clone(),
            local_path,
            load_address,
            load_failed: self.is_failed(),
        }
    }
}

/// A module to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistration
{
    /// Base address of the module in the inspected system
    pub base: Address,
    /// In-memory size of the module, zero if unknown
    pub size: u32,
    /// Display name used for by-name lookups
    pub module_name: String,
    pub debug_info: DebugInfoId,
}

impl ModuleRegistration
{
    pub fn new(base: Address, size: u32, module_name: impl Into<String>, debug_info: DebugInfoId) -> Self
    {
        Self {
            base,
            size,
            module_name: module_name.into(),
            debug_info,
        }
    }
}

/// Point-in-time copy of an entry, for callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry
{
    pub handle: SymbolHandle,
    pub module_base: Address,
    pub module_size: u32,
    pub module_name: String,
    pub debug_info: DebugInfoId,
    /// Cached package path, once loaded
    pub local_path: Option<PathBuf>,
    /// Synthetic load address, once loaded
    pub load_address: Option<u64>,
    pub load_failed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EntryStore
{
    entries: Vec<DebugInfoEntry>,
    by_hash: HashMap<SymbolHandle, usize>,
    by_module: HashMap<u32, usize>,
}

impl EntryStore
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Register a module and return its handle.
    ///
    /// A known identity keeps its existing entry untouched; the module name is
    /// still indexed so either name reaches the shared entry. Names already
    /// indexed keep pointing at the first entry registered under them.
    pub fn register(&mut self, registration: ModuleRegistration) -> SymbolHandle
    {
        let handle = handle_for(&registration.debug_info);
        let name_hash = module_name_hash(&registration.module_name);

        let index = match self.by_hash.get(&handle) {
            Some(&index) => index,
            None => {
                let index = self.entries.len();
                self.entries.push(DebugInfoEntry {
                    handle,
                    module_base: registration.base,
                    module_size: registration.size,
                    module_name: registration.module_name,
                    debug_info: registration.debug_info,
                    state: LoadState::Pending,
                });
                self.by_hash.insert(handle, index);
                index
            }
        };
        self.by_module.entry(name_hash).or_insert(index);
        handle
    }

    pub fn get(&self, handle: SymbolHandle) -> Option<&DebugInfoEntry>
    {
        self.by_hash.get(&handle).map(|&index| &self.entries[index])
    }

    pub fn get_mut(&mut self, handle: SymbolHandle) -> Option<&mut DebugInfoEntry>
    {
        let index = *self.by_hash.get(&handle)?;
        self.entries.get_mut(index)
    }

    /// Entry indexed under a module name, failed or not.
    pub fn by_module_name(&self, name: &str) -> Option<&DebugInfoEntry>
    {
        self.by_module
            .get(&module_name_hash(name))
            .map(|&index| &self.entries[index])
    }

    /// First entry registered at exactly `base`.
    pub fn by_module_base(&self, base: Address) -> Option<&DebugInfoEntry>
    {
        self.entries.iter().find(|entry| entry.module_base == base)
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DebugInfoEntry>
    {
        self.entries.iter()
    }
}
