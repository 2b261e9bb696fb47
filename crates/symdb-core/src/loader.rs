//! Lazy loading of debug-info packages into the symbol service.

use tracing::debug;

use crate::context::{State, LOAD_ADDRESS_STRIDE};
use crate::error::{SymbolError, SymbolResult};
use crate::store::LoadState;
use crate::types::SymbolHandle;

impl State
{
    /// Make sure the entry's package is loaded and return its synthetic base.
    ///
    /// Locating or loading happens at most once per entry. The load address
    /// counter advances once a package has been located, whether or not the
    /// load itself succeeds, and any failure marks the entry failed for good.
    pub(crate) fn ensure_loaded(&mut self, handle: SymbolHandle) -> SymbolResult<u64>
    {
        let entry = self.store.get(handle).ok_or(SymbolError::EntryNotFound(handle))?;
        match &entry.state {
            LoadState::Loaded { load_address, .. } => return Ok(*load_address),
            LoadState::Failed => {
                return Err(SymbolError::LoadFailed {
                    module: entry.module_name.clone(),
                })
            }
            LoadState::Pending => {}
        }

        let debug_info = entry.debug_info.clone();
        let module_size = entry.module_size;
        let module = entry.module_name.clone();

        let path = match self.service.find_debug_file(&debug_info) {
            Ok(path) => path,
            Err(e) => {
                debug!("Unable to locate debug info {debug_info} for '{module}': {e}");
                return Err(self.mark_failed(handle, module));
            }
        };

        let requested = self.next_load_address;
        let loaded = self.service.load_module(&path, requested, module_size);
        self.next_load_address = self.next_load_address.wrapping_add(LOAD_ADDRESS_STRIDE);

        match loaded {
            Ok(load_address) if load_address != 0 => {
                debug!(
                    "Loaded debug info for '{module}' from {} at 0x{load_address:016x}",
                    path.display()
                );
                if let Some(entry) = self.store.get_mut(handle) {
                    entry.state = LoadState::Loaded { path, load_address };
                }
                Ok(load_address)
            }
            Ok(_) => {
                debug!("Symbol service refused to load {} for '{module}'", path.display());
                Err(self.mark_failed(handle, module))
            }
            Err(e) => {
                debug!("Failed to load {} for '{module}': {e}", path.display());
                Err(self.mark_failed(handle, module))
            }
        }
    }

    fn mark_failed(&mut self, handle: SymbolHandle, module: String) -> SymbolError
    {
        if let Some(entry) = self.store.get_mut(handle) {
            entry.state = LoadState::Failed;
        }
        SymbolError::LoadFailed { module }
    }
}
