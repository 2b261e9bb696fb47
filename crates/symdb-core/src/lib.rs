//! # symdb-core
//!
//! Debug-info symbol database for memory forensics and virtual machine
//! introspection.
//!
//! Given a module loaded in an inspected process (base address, size) and the
//! module's debug-info identity (file name, GUID, age), this crate resolves
//! symbol offsets, nearest symbols, type sizes, struct field offsets and full
//! type layouts. The heavy lifting (parsing debug-info packages, fetching them
//! from a symbol server) is done by a native symbol service reached through the
//! [`SymbolService`] trait. This crate owns everything around it:
//!
//! - **Entry store**: entries keyed by content hash and by module name
//! - **Loader**: lazy, sticky-on-failure loading under synthetic base addresses
//! - **Query layer**: offsets, addresses, reverse lookups, type sizes, field offsets
//! - **Bootstrap**: locating and loading the kernel's own symbols off the startup path
//! - **Type renderer**: `dt`-style layout listings decorated with live memory
//!
//! ## Collaborators
//!
//! The database never touches a process directly. Memory comes from a
//! [`MemoryReader`], module identities from an [`ImageParser`], persisted
//! settings from a [`SettingsStore`] and background work runs on a
//! [`WorkQueue`]. All of them are traits so hosts can plug in their own
//! implementations (and tests can plug in doubles).
//!
//! ## Example
//!
//! ```rust,no_run
//! use symdb_core::{InitOptions, SymbolDatabase, SymbolHandle};
//! # fn env() -> symdb_core::Environment { unimplemented!() }
//!
//! let db = SymbolDatabase::new(env());
//! db.initialize(InitOptions::default())?;
//! db.wait_for_bootstrap();
//!
//! let offset = db.symbol_offset(SymbolHandle::KERNEL, "PsInitialSystemProcess")?;
//! println!("PsInitialSystemProcess at +0x{offset:x}");
//! # Ok::<(), symdb_core::SymbolError>(())
//! ```

pub mod bootstrap;
pub mod config;
mod context;
pub mod database;
pub mod error;
pub mod hash;
pub mod image;
mod loader;
pub mod memory;
mod query;
pub mod render;
pub mod service;
pub mod store;
pub mod types;
pub mod work;

pub use bootstrap::KernelImage;
pub use config::{
    ConfigSeed, MemorySettingsStore, SettingsStore, StoredSettings, SymbolConfig, SymbolPath, TomlSettingsStore,
};
pub use database::{BootstrapMode, Environment, InitOptions, SymbolDatabase};
pub use error::{SymbolError, SymbolResult};
pub use image::{ImageParser, PeImageParser};
pub use memory::MemoryReader;
pub use render::{ObjectHeaderLayout, RenderOptions, TypeRendering};
pub use service::{ServiceProvider, SymbolService};
pub use store::{ModuleEntry, ModuleRegistration};
pub use types::{Address, Architecture, DebugInfoId, Guid, ProcessId, SymbolHandle, SymbolMatch};
pub use work::{ThreadWorkQueue, WorkQueue};
#[cfg(feature = "tokio")]
pub use work::TokioWorkQueue;
