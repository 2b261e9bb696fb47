//! # Symbol Database
//!
//! The public front end: lifecycle (initialize, close, reconfigure) and every
//! query, each of which takes a [`SymbolHandle`].
//!
//! ## Locking
//!
//! Two locks are involved:
//!
//! - a coarse `RwLock` around the current context. Reconfiguration holds it
//!   for writing while it swaps the context; queries only *try* to read it,
//!   so a query racing a reconfiguration fails with
//!   [`SymbolError::Disabled`] instead of blocking
//! - the subsystem lock inside the context, held for every store mutation,
//!   package load, symbol service call and rendering
//!
//! Queries check the context's disabled flag before taking the subsystem
//! lock, so they fail fast while the kernel bootstrap runs.

use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::bootstrap::{Bootstrap, KernelImage, STARTED_TIMEOUT};
use crate::config::{ConfigSeed, SettingsStore, SymbolConfig, SymbolPath};
use crate::context::{Context, KERNEL_MODULE_NAME};
use crate::error::{SymbolError, SymbolResult};
use crate::image::ImageParser;
use crate::memory::MemoryReader;
use crate::render::{ObjectHeaderLayout, RenderEnv, RenderOptions, TypeRendering};
use crate::service::ServiceProvider;
use crate::store::{ModuleEntry, ModuleRegistration};
use crate::types::{Address, Architecture, DebugInfoId, ProcessId, SymbolHandle, SymbolMatch};
use crate::work::WorkQueue;

/// Largest module size accepted when deriving an identity from an image.
pub const MAX_MODULE_SIZE: u64 = 0x0400_0000;

/// Alias the kernel's entry is shown under in rendered output.
const KERNEL_ALIAS: &str = "nt";

/// Collaborators and facts about the inspected system
pub struct Environment
{
    pub memory: Arc<dyn MemoryReader>,
    pub images: Arc<dyn ImageParser>,
    pub provider: Arc<dyn ServiceProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub work_queue: Arc<dyn WorkQueue>,
    pub kernel: KernelImage,
    pub architecture: Architecture,
    pub seed: ConfigSeed,
}

/// Where the kernel bootstrap runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapMode
{
    /// On the work queue; initialization waits briefly for it to start
    #[default]
    Async,
    /// On the calling thread, before initialization returns
    Sync,
}

/// Options for [`SymbolDatabase::initialize`]
#[derive(Debug, Clone, Default)]
pub struct InitOptions
{
    /// Kernel debug-info identity, when the host already knows it
    pub kernel_debug_info: Option<DebugInfoId>,
    pub bootstrap: BootstrapMode,
}

/// The symbol database
///
/// ## Example
///
/// ```rust,no_run
/// use symdb_core::{Address, ProcessId, SymbolDatabase};
/// # fn db() -> SymbolDatabase { unimplemented!() }
///
/// let db = db();
/// let handle = db.handle_from_module_address(ProcessId(4), Address::new(0xfffff800_12340000))?;
/// let size = db.type_size(handle, "_DRIVER_OBJECT")?;
/// # Ok::<(), symdb_core::SymbolError>(())
/// ```
pub struct SymbolDatabase
{
    env: Environment,
    slot: RwLock<Option<Arc<Context>>>,
    /// Effective configuration of the last initialization, enabled or not
    config: Mutex<Option<SymbolConfig>>,
    object_headers: RwLock<ObjectHeaderLayout>,
}

impl SymbolDatabase
{
    pub fn new(env: Environment) -> Self
    {
        Self {
            env,
            slot: RwLock::new(None),
            config: Mutex::new(None),
            object_headers: RwLock::new(ObjectHeaderLayout::default()),
        }
    }

    pub fn environment(&self) -> &Environment
    {
        &self.env
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Bring the subsystem up.
    ///
    /// Does nothing when already initialized. When the configuration disables
    /// the subsystem it stays uninitialized and this returns `Ok`. Otherwise a
    /// symbol service session is opened and the kernel bootstrap is started;
    /// queries fail with [`SymbolError::Disabled`] until it succeeds.
    pub fn initialize(&self, options: InitOptions) -> SymbolResult<()>
    {
        let mut slot = self.slot.write();
        self.initialize_locked(&mut slot, None, options)
    }

    fn initialize_locked(
        &self,
        slot: &mut Option<Arc<Context>>,
        current: Option<&SymbolConfig>,
        options: InitOptions,
    ) -> SymbolResult<()>
    {
        if slot.is_some() {
            return Ok(());
        }

        let config = SymbolConfig::load(self.env.settings.as_ref(), &self.env.seed, current)?;
        *self.config.lock() = Some(config.clone());
        if !config.enabled {
            debug!("Debug symbol functionality disabled by configuration");
            return Ok(());
        }

        let symbol_path = config.symbol_path();
        let service = self.env.provider.open(&symbol_path).map_err(|e| {
            warn!(
                "WARNING: Functionality may be limited. Extended debug information disabled.\n         Reason: Failed to initialize the symbol service: {e}"
            );
            e
        })?;
        debug!("Opened symbol service [ {symbol_path} ]");

        let context = Arc::new(Context::new(config, service));
        *slot = Some(Arc::clone(&context));

        let mut bootstrap = Bootstrap {
            context,
            memory: Arc::clone(&self.env.memory),
            images: Arc::clone(&self.env.images),
            kernel: self.env.kernel,
            debug_info: options.kernel_debug_info,
            started: None,
        };

        match options.bootstrap {
            BootstrapMode::Sync => {
                run_bootstrap(bootstrap);
                Ok(())
            }
            BootstrapMode::Async => {
                let (started_tx, started_rx) = mpsc::sync_channel(1);
                bootstrap.started = Some(started_tx);
                self.env.work_queue.submit(Box::new(move || run_bootstrap(bootstrap)))?;
                if started_rx.recv_timeout(STARTED_TIMEOUT).is_err() {
                    debug!("Kernel bootstrap did not report start within {STARTED_TIMEOUT:?}");
                }
                Ok(())
            }
        }
    }

    /// Block until an in-progress bootstrap has finished.
    pub fn wait_for_bootstrap(&self)
    {
        let context = self.slot.read().clone();
        if let Some(context) = context {
            drop(context.lock());
        }
    }

    /// Tear the subsystem down.
    ///
    /// The context is detached first, so new queries fail with
    /// [`SymbolError::Uninitialized`]; then this waits for in-flight users of
    /// the subsystem lock before dropping the symbol service session.
    pub fn close(&self)
    {
        let mut slot = self.slot.write();
        Self::close_locked(&mut slot);
    }

    fn close_locked(slot: &mut Option<Arc<Context>>)
    {
        if let Some(context) = slot.take() {
            drop(context.lock());
            debug!("Closed symbol database");
        }
    }

    /// Apply a new configuration.
    ///
    /// The configuration is persisted under the save rules of
    /// [`SymbolConfig::to_stored`], then the subsystem is closed and
    /// initialized again with the kernel bootstrap run synchronously. The
    /// enable flags come from `config`; the cache and server come back from
    /// the store, so values the save rules refuse fall back to their
    /// defaults. The context swap happens under the coarse lock.
    pub fn reconfigure(&self, config: &SymbolConfig) -> SymbolResult<()>
    {
        if let Err(e) = config.persist(self.env.settings.as_ref(), &self.env.seed) {
            warn!("Failed to persist symbol configuration: {e}");
        }

        let mut slot = self.slot.write();
        Self::close_locked(&mut slot);
        let options = InitOptions {
            kernel_debug_info: None,
            bootstrap: BootstrapMode::Sync,
        };
        self.initialize_locked(&mut slot, Some(config), options)
    }

    /// Whether queries are currently served.
    pub fn is_enabled(&self) -> bool
    {
        self.slot
            .try_read()
            .is_some_and(|slot| slot.as_ref().is_some_and(|context| !context.is_disabled()))
    }

    /// Whether a context exists (the bootstrap may still be running).
    pub fn is_initialized(&self) -> bool
    {
        self.slot.read().is_some()
    }

    /// Effective configuration of the last initialization.
    pub fn config(&self) -> Option<SymbolConfig>
    {
        self.config.lock().clone()
    }

    /// Symbol path the current session searches.
    pub fn symbol_path(&self) -> Option<SymbolPath>
    {
        self.slot.read().as_ref().map(|context| context.symbol_path.clone())
    }

    /// Set the object sub-header sizes used by object header rendering.
    pub fn set_object_header_layout(&self, layout: ObjectHeaderLayout)
    {
        *self.object_headers.write() = layout;
    }

    pub fn object_header_layout(&self) -> ObjectHeaderLayout
    {
        *self.object_headers.read()
    }

    // ----------------------------------------------------------------------
    // Handles
    // ----------------------------------------------------------------------

    /// Context for queries that need an enabled subsystem.
    fn enabled_context(&self) -> SymbolResult<Arc<Context>>
    {
        let context = self.any_context()?;
        if context.is_disabled() {
            return Err(SymbolError::Disabled);
        }
        Ok(context)
    }

    /// Context for operations that work while the bootstrap is pending.
    fn any_context(&self) -> SymbolResult<Arc<Context>>
    {
        let slot = self.slot.try_read().ok_or(SymbolError::Disabled)?;
        slot.as_ref().cloned().ok_or(SymbolError::Uninitialized)
    }

    /// Register a module; the package is not loaded until first needed.
    ///
    /// Registering a known identity returns the existing handle and leaves
    /// the entry as it was.
    pub fn register_module(&self, registration: ModuleRegistration) -> SymbolResult<SymbolHandle>
    {
        let context = self.any_context()?;
        let mut state = context.lock();
        let name = registration.module_name.clone();
        let handle = state.store.register(registration);
        debug!("Registered module '{name}' as {handle} ({} entries)", state.store.len());
        Ok(handle)
    }

    /// Handle of the module mapped at `base` in `pid`.
    ///
    /// An entry registered at exactly `base` (in any process) is reused.
    /// Otherwise the identity is read from the module's image header and the
    /// module is registered under the debug-info file name minus `.pdb`.
    pub fn handle_from_module_address(&self, pid: ProcessId, base: Address) -> SymbolResult<SymbolHandle>
    {
        let context = self.any_context()?;
        if let Some(handle) = context.lock().store.by_module_base(base).map(|entry| entry.handle) {
            return Ok(handle);
        }

        let size = self
            .env
            .images
            .module_size(pid, base)
            .ok_or(SymbolError::IdentityUnresolvable { pid, address: base })?;
        if size == 0 || size > MAX_MODULE_SIZE {
            return Err(SymbolError::ModuleTooLarge { address: base, size });
        }
        let debug_info = self
            .env
            .images
            .debug_info(pid, base)
            .ok_or(SymbolError::IdentityUnresolvable { pid, address: base })?;

        let module_name = debug_info.module_name().to_string();
        let size = u32::try_from(size).map_err(|_| SymbolError::ModuleTooLarge { address: base, size })?;
        let registration = ModuleRegistration::new(base, size, module_name, debug_info);
        let handle = context.lock().store.register(registration);
        Ok(handle)
    }

    /// Handle of the module registered under `name`.
    ///
    /// `None` and `"nt"` both mean the kernel. Entries whose load failed
    /// are reported as not found.
    pub fn handle_from_module_name(&self, name: Option<&str>) -> SymbolResult<SymbolHandle>
    {
        let context = self.enabled_context()?;
        let name = match name {
            None | Some("nt") => KERNEL_MODULE_NAME,
            Some(name) => name,
        };
        let result = context.lock().handle_by_name(name);
        result
    }

    /// Display name of the module behind `handle`. Never loads the package.
    pub fn module_name(&self, handle: SymbolHandle) -> SymbolResult<String>
    {
        let context = self.enabled_context()?;
        let state = context.lock();
        let handle = state.resolve(handle)?;
        state
            .store
            .get(handle)
            .map(|entry| entry.module_name.clone())
            .ok_or(SymbolError::EntryNotFound(handle))
    }

    /// Snapshot of the entry behind `handle`.
    pub fn module_entry(&self, handle: SymbolHandle) -> SymbolResult<ModuleEntry>
    {
        let context = self.enabled_context()?;
        let state = context.lock();
        let handle = state.resolve(handle)?;
        state
            .store
            .get(handle)
            .map(|entry| entry.snapshot())
            .ok_or(SymbolError::EntryNotFound(handle))
    }

    /// Snapshots of every registered entry, in registration order.
    pub fn modules(&self) -> SymbolResult<Vec<ModuleEntry>>
    {
        let context = self.any_context()?;
        let state = context.lock();
        Ok(state.store.iter().map(|entry| entry.snapshot()).collect())
    }

    // ----------------------------------------------------------------------
    // Symbols
    // ----------------------------------------------------------------------

    /// Offset of `symbol` from the module base. Wildcards pick the first match.
    pub fn symbol_offset(&self, handle: SymbolHandle, symbol: &str) -> SymbolResult<u32>
    {
        let context = self.enabled_context()?;
        let mut state = context.lock();
        let handle = state.resolve(handle)?;
        state.symbol_offset(handle, symbol, self.env.architecture)
    }

    /// Address of `symbol`: the module base plus the symbol offset.
    pub fn symbol_address(&self, handle: SymbolHandle, symbol: &str) -> SymbolResult<Address>
    {
        let context = self.enabled_context()?;
        let mut state = context.lock();
        let handle = state.resolve(handle)?;
        let offset = state.symbol_offset(handle, symbol, self.env.architecture)?;
        let base = state
            .store
            .get(handle)
            .map(|entry| entry.module_base)
            .ok_or(SymbolError::EntryNotFound(handle))?;
        Ok(base + u64::from(offset))
    }

    /// Nearest symbol at or before `offset` from the module base.
    pub fn symbol_from_offset(&self, handle: SymbolHandle, offset: u32) -> SymbolResult<SymbolMatch>
    {
        let context = self.enabled_context()?;
        let mut state = context.lock();
        let handle = state.resolve(handle)?;
        state.symbol_from_offset(handle, offset)
    }

    /// Read `len` bytes at `symbol` in `pid`. Never returns partial data.
    pub fn read_at_symbol(&self, handle: SymbolHandle, symbol: &str, pid: ProcessId, len: usize)
        -> SymbolResult<Vec<u8>>
    {
        let address = self.symbol_address(handle, symbol)?;
        let bytes = self.env.memory.read_exact(pid, address, len)?;
        if bytes.len() != len {
            return Err(SymbolError::Memory { pid, address, len });
        }
        Ok(bytes)
    }

    // ----------------------------------------------------------------------
    // Types
    // ----------------------------------------------------------------------

    /// Byte size of `type_name`. Wildcards pick the first match.
    pub fn type_size(&self, handle: SymbolHandle, type_name: &str) -> SymbolResult<u32>
    {
        let context = self.enabled_context()?;
        let mut state = context.lock();
        let handle = state.resolve(handle)?;
        state.type_size(handle, type_name)
    }

    /// [`Self::type_size`] for sizes that must fit 16 bits.
    pub fn type_size_u16(&self, handle: SymbolHandle, type_name: &str) -> SymbolResult<u16>
    {
        narrow(self.type_size(handle, type_name)?)
    }

    /// Offset of the child named exactly `child` in the first type matching
    /// `type_name`.
    pub fn type_child_offset(&self, handle: SymbolHandle, type_name: &str, child: &str) -> SymbolResult<u32>
    {
        let context = self.enabled_context()?;
        let mut state = context.lock();
        let handle = state.resolve(handle)?;
        state.type_child_offset(handle, type_name, child)
    }

    /// [`Self::type_child_offset`] for offsets that must fit 16 bits.
    pub fn type_child_offset_u16(&self, handle: SymbolHandle, type_name: &str, child: &str) -> SymbolResult<u16>
    {
        narrow(self.type_child_offset(handle, type_name, child)?)
    }

    /// Render the layout of `type_name` as text.
    pub fn render_type(&self, handle: SymbolHandle, type_name: &str, options: &RenderOptions)
        -> SymbolResult<TypeRendering>
    {
        let context = self.enabled_context()?;
        let layout = self.object_header_layout();
        let mut state = context.lock();
        let resolved = state.resolve(handle)?;

        let module_name = state
            .store
            .get(resolved)
            .map(|entry| entry.module_name.clone())
            .unwrap_or_default();
        let alias = if module_name == KERNEL_MODULE_NAME { KERNEL_ALIAS } else { module_name.as_str() };

        let env = RenderEnv {
            architecture: self.env.architecture,
            memory: self.env.memory.as_ref(),
            layout,
            alias,
        };
        state.render_type(resolved, type_name, options, &env)
    }
}

impl Drop for SymbolDatabase
{
    fn drop(&mut self)
    {
        Self::close_locked(self.slot.get_mut());
    }
}

/// Run a bootstrap to completion. A failure has already been reported as a
/// diagnostic and leaves the subsystem disabled.
fn run_bootstrap(bootstrap: Bootstrap)
{
    match bootstrap.run() {
        Ok(handle) => debug!("Kernel bootstrap registered {handle}"),
        Err(e) => debug!("Kernel bootstrap failed: {e}"),
    }
}

fn narrow(value: u32) -> SymbolResult<u16>
{
    u16::try_from(value).map_err(|_| SymbolError::ValueOutOfRange {
        value: u64::from(value),
        bits: 16,
    })
}
