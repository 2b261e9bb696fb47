//! # Error Types
//!
//! Error handling for the symbol database.
//!
//! Failures fall into four groups, and every variant below belongs to one of
//! them:
//!
//! 1. **Unavailable**: the subsystem is uninitialized, disabled, or the native
//!    symbol service could not be opened (`Uninitialized`, `Disabled`,
//!    `Service`, `Config`, `Bootstrap`)
//! 2. **Identity unresolvable**: a module's debug-info identity cannot be
//!    determined, so the module is never registered (`IdentityUnresolvable`,
//!    `ModuleTooLarge`)
//! 3. **Load failure**: the debug-info package could not be located or loaded.
//!    This is sticky per entry (`LoadFailed`)
//! 4. **Lookup miss**: nothing matched (`InvalidHandle`, `EntryNotFound`,
//!    `ModuleNotFound`, `SymbolNotFound`, `TypeNotFound`, `ChildNotFound`,
//!    `NotComplexType`, `ValueOutOfRange`, `Memory`)
//!
//! None of them leave shared state half-modified.

use thiserror::Error;

use crate::types::{Address, ProcessId, SymbolHandle};

/// Main error type for symbol database operations.
#[derive(Error, Debug)]
pub enum SymbolError
{
    /// No context exists: the database was never initialized or has been closed.
    #[error("Symbol database is not initialized")]
    Uninitialized,

    /// The context exists but the kernel bootstrap has not (or could not) finish.
    ///
    /// Queries fail fast with this error until the bootstrap clears the
    /// disabled flag. A failed bootstrap leaves the database in this state
    /// until it is reconfigured.
    #[error("Symbol database is disabled")]
    Disabled,

    /// The zero handle was passed to an operation.
    #[error("Invalid symbol handle")]
    InvalidHandle,

    /// No entry is registered under the handle.
    #[error("No debug-info entry for handle {0}")]
    EntryNotFound(SymbolHandle),

    /// No usable entry is registered under the module name.
    ///
    /// This is also returned for entries whose load previously failed, so
    /// callers cannot tell "unknown" apart from "known to be broken".
    #[error("No debug-info entry for module '{0}'")]
    ModuleNotFound(String),

    /// The debug-info package could not be located or loaded.
    #[error("Failed to load debug info for module '{module}'")]
    LoadFailed
    {
        /// Display name of the module whose package failed to load
        module: String,
    },

    /// The module's debug-info identity could not be extracted.
    #[error("Unable to resolve debug-info identity of module at {address} in process {pid}")]
    IdentityUnresolvable
    {
        /// Process the module was read from
        pid: ProcessId,
        /// Module base address
        address: Address,
    },

    /// The module's declared size is zero or above the sanity bound.
    #[error("Module at {address} has implausible size 0x{size:x}")]
    ModuleTooLarge
    {
        /// Module base address
        address: Address,
        /// Declared in-memory size
        size: u64,
    },

    /// A symbol lookup matched nothing usable.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// A type lookup matched nothing usable.
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// The type exists but has no child with the requested name.
    #[error("Type '{type_name}' has no child named '{child}'")]
    ChildNotFound
    {
        /// Type that was searched
        type_name: String,
        /// Exact child name that was requested
        child: String,
    },

    /// The type is not a struct-like type with children.
    #[error("Type '{0}' is not a complex type")]
    NotComplexType(String),

    /// A value does not fit the requested narrower width.
    #[error("Value 0x{value:x} does not fit in {bits} bits")]
    ValueOutOfRange
    {
        /// The value that was produced
        value: u64,
        /// Width that was requested
        bits: u32,
    },

    /// A memory read from the inspected system failed.
    #[error("Failed to read 0x{len:x} bytes at {address} in process {pid}")]
    Memory
    {
        /// Process being read
        pid: ProcessId,
        /// Start address of the read
        address: Address,
        /// Requested length
        len: usize,
    },

    /// The native symbol service reported a failure.
    #[error("Symbol service error: {0}")]
    Service(String),

    /// Configuration could not be loaded, stored, or disables the subsystem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The kernel bootstrap could not be started.
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// I/O error (settings files, worker threads).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, SymbolError>`
///
/// ```rust
/// use symdb_core::error::SymbolResult;
/// fn foo() -> SymbolResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type SymbolResult<T> = std::result::Result<T, SymbolError>;
