//! Live subsystem state shared by the database front end and the bootstrap.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::config::{SymbolConfig, SymbolPath};
use crate::error::{SymbolError, SymbolResult};
use crate::service::SymbolService;
use crate::store::EntryStore;
use crate::types::SymbolHandle;

/// First synthetic load address handed to the symbol service.
pub(crate) const LOAD_ADDRESS_BASE: u64 = 0x0000_511f_0000_0000;

/// Distance between consecutive synthetic load addresses.
pub(crate) const LOAD_ADDRESS_STRIDE: u64 = 0x1000_0000;

/// Module name the running kernel is registered under.
pub(crate) const KERNEL_MODULE_NAME: &str = "ntoskrnl";

/// Everything guarded by the subsystem lock
pub(crate) struct State
{
    pub store: EntryStore,
    pub service: Box<dyn SymbolService>,
    pub next_load_address: u64,
}

impl State
{
    pub fn new(service: Box<dyn SymbolService>) -> Self
    {
        Self {
            store: EntryStore::new(),
            service,
            next_load_address: LOAD_ADDRESS_BASE,
        }
    }

    /// Turn a caller handle into a registered one.
    ///
    /// The kernel sentinel resolves through the kernel's module name and,
    /// like any by-name lookup, refuses entries whose load failed.
    pub fn resolve(&self, handle: SymbolHandle) -> SymbolResult<SymbolHandle>
    {
        if handle.is_none() {
            return Err(SymbolError::InvalidHandle);
        }
        if handle.is_kernel() {
            return self.handle_by_name(KERNEL_MODULE_NAME);
        }
        if self.store.get(handle).is_none() {
            return Err(SymbolError::EntryNotFound(handle));
        }
        Ok(handle)
    }

    /// Handle of the usable entry indexed under `name`.
    pub fn handle_by_name(&self, name: &str) -> SymbolResult<SymbolHandle>
    {
        self.store
            .by_module_name(name)
            .filter(|entry| !entry.is_failed())
            .map(|entry| entry.handle)
            .ok_or_else(|| SymbolError::ModuleNotFound(name.to_string()))
    }
}

/// One initialized instance of the subsystem
///
/// Created disabled; only a successful bootstrap enables it. Dropping the
/// last reference drops the symbol service session.
pub(crate) struct Context
{
    disabled: AtomicBool,
    state: Mutex<State>,
    pub config: SymbolConfig,
    pub symbol_path: SymbolPath,
}

impl Context
{
    pub fn new(config: SymbolConfig, service: Box<dyn SymbolService>) -> Self
    {
        let symbol_path = config.symbol_path();
        Self {
            disabled: AtomicBool::new(true),
            state: Mutex::new(State::new(service)),
            config,
            symbol_path,
        }
    }

    pub fn is_disabled(&self) -> bool
    {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn enable(&self)
    {
        self.disabled.store(false, Ordering::Release);
    }

    pub fn lock(&self) -> MutexGuard<'_, State>
    {
        self.state.lock()
    }
}
