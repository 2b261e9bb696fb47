//! # Types
//!
//! Value types shared by every layer of the symbol database.
//!
//! These are small `Copy` newtypes and plain records. They carry no behaviour
//! beyond validation and formatting, so the store, loader, query layer and
//! renderer can pass them around freely.

pub mod address;
pub mod debug_info;
pub mod handle;
pub mod process;
pub mod symbol;

// Re-export all public types
pub use address::Address;
pub use debug_info::{DebugInfoId, Guid};
pub use handle::SymbolHandle;
pub use process::{Architecture, ProcessId};
pub use symbol::SymbolMatch;
