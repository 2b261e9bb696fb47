//! Symbol and type queries against a loaded package.
//!
//! Every query loads the entry first, then asks the symbol service. Service
//! errors surface as lookup misses; the underlying error is logged at debug
//! level.

use std::ops::ControlFlow;

use tracing::debug;

use crate::context::State;
use crate::error::{SymbolError, SymbolResult};
use crate::types::{Architecture, SymbolHandle, SymbolMatch};

/// Offsets at or above this are not plausible for a symbol inside a module.
const MAX_SYMBOL_OFFSET: u64 = 0x1000_0000;

impl State
{
    /// Offset of `name` from the module base.
    ///
    /// 32-bit targets enumerate matching symbols and keep the first one that
    /// lies inside the module; a zero offset counts as a miss. 64-bit targets
    /// use a direct name lookup.
    pub(crate) fn symbol_offset(
        &mut self,
        handle: SymbolHandle,
        name: &str,
        architecture: Architecture,
    ) -> SymbolResult<u32>
    {
        let base = self.ensure_loaded(handle)?;
        let miss = || SymbolError::SymbolNotFound(name.to_string());

        if architecture.is_32bit() {
            let mut found = None;
            self.service
                .enum_symbols(base, name, &mut |symbol| {
                    match symbol.address.checked_sub(symbol.module_base) {
                        Some(offset) if offset < MAX_SYMBOL_OFFSET => {
                            found = Some(offset);
                            ControlFlow::Break(())
                        }
                        _ => ControlFlow::Continue(()),
                    }
                })
                .map_err(|e| {
                    debug!("Symbol enumeration for '{name}' failed: {e}");
                    miss()
                })?;
            return match found {
                Some(offset) if offset != 0 => u32::try_from(offset).map_err(|_| miss()),
                _ => Err(miss()),
            };
        }

        let symbol = self.service.type_from_name(base, name).map_err(|e| {
            debug!("Symbol lookup for '{name}' failed: {e}");
            miss()
        })?;
        symbol
            .address
            .checked_sub(symbol.module_base)
            .and_then(|offset| u32::try_from(offset).ok())
            .ok_or_else(miss)
    }

    /// Nearest symbol at or before `offset` from the module base.
    pub(crate) fn symbol_from_offset(&mut self, handle: SymbolHandle, offset: u32) -> SymbolResult<SymbolMatch>
    {
        let base = self.ensure_loaded(handle)?;
        let (symbol, displacement) = self
            .service
            .symbol_from_address(base.wrapping_add(u64::from(offset)))
            .map_err(|e| {
                debug!("No symbol near offset 0x{offset:x}: {e}");
                SymbolError::SymbolNotFound(format!("+0x{offset:x}"))
            })?;
        Ok(SymbolMatch::new(&symbol.name, displacement))
    }

    /// Size of the first type matching `type_name`; zero counts as a miss.
    pub(crate) fn type_size(&mut self, handle: SymbolHandle, type_name: &str) -> SymbolResult<u32>
    {
        let base = self.ensure_loaded(handle)?;
        let miss = || SymbolError::TypeNotFound(type_name.to_string());
        let info = self.service.type_from_name(base, type_name).map_err(|e| {
            debug!("Type lookup for '{type_name}' failed: {e}");
            miss()
        })?;
        if info.size == 0 {
            return Err(miss());
        }
        Ok(info.size)
    }

    /// Offset of the child named exactly `child` in the first type matching
    /// the wildcard `type_name`.
    pub(crate) fn type_child_offset(&mut self, handle: SymbolHandle, type_name: &str, child: &str)
        -> SymbolResult<u32>
    {
        let base = self.ensure_loaded(handle)?;
        let miss = || SymbolError::TypeNotFound(type_name.to_string());

        let mut type_id = 0;
        self.service
            .enum_types(base, type_name, &mut |symbol| {
                type_id = symbol.type_index;
                ControlFlow::Break(())
            })
            .map_err(|e| {
                debug!("Type enumeration for '{type_name}' failed: {e}");
                miss()
            })?;
        if type_id == 0 {
            return Err(miss());
        }

        let count = self.service.children_count(base, type_id).unwrap_or(0);
        if count == 0 {
            return Err(SymbolError::NotComplexType(type_name.to_string()));
        }
        let children = self
            .service
            .find_children(base, type_id)
            .map_err(|_| SymbolError::NotComplexType(type_name.to_string()))?;

        for id in children.into_iter().take(count as usize) {
            let Ok(name) = self.service.symbol_name(base, id) else {
                continue;
            };
            if name == child {
                if let Ok(offset) = self.service.offset(base, id) {
                    return Ok(offset);
                }
            }
        }
        Err(SymbolError::ChildNotFound {
            type_name: type_name.to_string(),
            child: child.to_string(),
        })
    }
}
