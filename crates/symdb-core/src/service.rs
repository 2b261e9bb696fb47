//! # Symbol Service
//!
//! The native debug-info service the database delegates to.
//!
//! A service session parses debug-info packages, fetches them from a symbol
//! server into the local cache, and answers symbol and type queries against
//! packages loaded at synthetic base addresses. The database never parses a
//! package itself; it only decides *which* package to load *where*, and
//! serializes access to the session.
//!
//! Query results are small typed records ([`SymbolInfo`], [`FieldInfo`],
//! [`TypeInfo`]) rather than raw buffers, one per batch query purpose.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::config::SymbolPath;
use crate::error::SymbolResult;
use crate::types::DebugInfoId;

/// Service-side type identifier, scoped to one loaded package.
pub type TypeId = u32;

/// Symbol tags as reported by the service (debug-info `SymTagEnum` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymTag
{
    Function,
    Data,
    PublicSymbol,
    Udt,
    Enum,
    FunctionType,
    PointerType,
    ArrayType,
    BaseType,
    Typedef,
    BaseClass,
    Other(u32),
}

impl SymTag
{
    pub fn from_raw(raw: u32) -> Self
    {
        match raw {
            5 => SymTag::Function,
            7 => SymTag::Data,
            10 => SymTag::PublicSymbol,
            11 => SymTag::Udt,
            12 => SymTag::Enum,
            13 => SymTag::FunctionType,
            14 => SymTag::PointerType,
            15 => SymTag::ArrayType,
            16 => SymTag::BaseType,
            17 => SymTag::Typedef,
            18 => SymTag::BaseClass,
            other => SymTag::Other(other),
        }
    }

    pub fn raw(self) -> u32
    {
        match self {
            SymTag::Function => 5,
            SymTag::Data => 7,
            SymTag::PublicSymbol => 10,
            SymTag::Udt => 11,
            SymTag::Enum => 12,
            SymTag::FunctionType => 13,
            SymTag::PointerType => 14,
            SymTag::ArrayType => 15,
            SymTag::BaseType => 16,
            SymTag::Typedef => 17,
            SymTag::BaseClass => 18,
            SymTag::Other(raw) => raw,
        }
    }
}

/// Primitive kind of a base type
///
/// Raw codes follow the debug-info `BasicType` enumeration. `Function` and
/// `Pointer` never come from the service; the renderer uses them for pointers
/// whose target is a function or another pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaseKind
{
    #[default]
    NoType,
    Void,
    Char,
    WChar,
    Int,
    UInt,
    Float,
    Bcd,
    Bool,
    Long,
    ULong,
    Currency,
    Date,
    Variant,
    Complex,
    Bit,
    Bstr,
    HResult,
    Function,
    Pointer,
    Other(u32),
}

impl BaseKind
{
    pub fn from_raw(raw: u32) -> Self
    {
        match raw {
            0 => BaseKind::NoType,
            1 => BaseKind::Void,
            2 => BaseKind::Char,
            3 => BaseKind::WChar,
            6 => BaseKind::Int,
            7 => BaseKind::UInt,
            8 => BaseKind::Float,
            9 => BaseKind::Bcd,
            10 => BaseKind::Bool,
            13 => BaseKind::Long,
            14 => BaseKind::ULong,
            25 => BaseKind::Currency,
            26 => BaseKind::Date,
            27 => BaseKind::Variant,
            28 => BaseKind::Complex,
            29 => BaseKind::Bit,
            30 => BaseKind::Bstr,
            31 => BaseKind::HResult,
            other => BaseKind::Other(other),
        }
    }

    pub fn is_none(self) -> bool
    {
        self == BaseKind::NoType
    }
}

/// One symbol returned by an enumeration or a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo
{
    pub name: String,
    /// Address inside the synthetic load range
    pub address: u64,
    /// Synthetic base the package was loaded at
    pub module_base: u64,
    pub size: u32,
    pub type_index: TypeId,
    pub tag: SymTag,
}

/// Per-child record of a struct-like type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo
{
    pub name: String,
    /// Bit count for bit-fields, zero otherwise
    pub bit_length: u64,
    /// Byte offset from the start of the parent
    pub offset: u32,
    pub type_id: TypeId,
}

/// Per-type record describing a child's type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeInfo
{
    /// Type name, absent for anonymous, pointer, array and base types
    pub name: Option<String>,
    /// Total byte length (all elements for arrays)
    pub length: u64,
    pub tag: Option<SymTag>,
    /// Element count for arrays, zero otherwise
    pub array_count: u32,
    pub child_count: u32,
    /// Element type of arrays and pointee of pointers, zero if none
    pub element_type: TypeId,
    pub array_index_type: TypeId,
    pub base_kind: BaseKind,
}

/// An open session with the native symbol service
///
/// Calls take `&mut self`: the database serializes every call behind its
/// subsystem lock, so implementations need not be thread safe internally.
/// Addresses are synthetic; `base` always names a load address previously
/// returned by [`SymbolService::load_module`].
pub trait SymbolService: Send
{
    /// Locate (and download into the cache if needed) the package for `id`.
    fn find_debug_file(&mut self, id: &DebugInfoId) -> SymbolResult<PathBuf>;

    /// Load the package at `path` at synthetic address `base`, returning the
    /// address actually used. Zero means failure.
    fn load_module(&mut self, path: &Path, base: u64, size: u32) -> SymbolResult<u64>;

    /// Enumerate symbols matching the wildcard `mask` until `visit` breaks.
    fn enum_symbols(
        &mut self,
        base: u64,
        mask: &str,
        visit: &mut dyn FnMut(&SymbolInfo) -> ControlFlow<()>,
    ) -> SymbolResult<()>;

    /// Enumerate types matching the wildcard `mask` until `visit` breaks.
    fn enum_types(
        &mut self,
        base: u64,
        mask: &str,
        visit: &mut dyn FnMut(&SymbolInfo) -> ControlFlow<()>,
    ) -> SymbolResult<()>;

    /// Direct lookup of a symbol or type by name.
    fn type_from_name(&mut self, base: u64, name: &str) -> SymbolResult<SymbolInfo>;

    /// Nearest symbol at or before `address`, with the displacement into it.
    fn symbol_from_address(&mut self, address: u64) -> SymbolResult<(SymbolInfo, u64)>;

    /// Number of children of a type.
    fn children_count(&mut self, base: u64, type_id: TypeId) -> SymbolResult<u32>;

    /// Identifiers of all children of a type.
    fn find_children(&mut self, base: u64, type_id: TypeId) -> SymbolResult<Vec<TypeId>>;

    /// Name of a symbol or type.
    fn symbol_name(&mut self, base: u64, id: TypeId) -> SymbolResult<String>;

    /// Byte offset of a field inside its parent.
    fn offset(&mut self, base: u64, id: TypeId) -> SymbolResult<u32>;

    /// Primitive kind of a type.
    fn base_kind(&mut self, base: u64, id: TypeId) -> SymbolResult<BaseKind>;

    /// Tag of a symbol or type.
    fn tag(&mut self, base: u64, id: TypeId) -> SymbolResult<SymTag>;

    /// Batch query: field records for every child of `parent`.
    fn field_infos(&mut self, base: u64, parent: TypeId) -> SymbolResult<Vec<FieldInfo>>;

    /// Batch query: type records for each id in `ids`, in order.
    fn type_infos(&mut self, base: u64, ids: &[TypeId]) -> SymbolResult<Vec<TypeInfo>>;
}

/// Opens symbol service sessions
pub trait ServiceProvider: Send + Sync
{
    /// Open a session searching `path`. Failure means the native service is
    /// unavailable and the subsystem stays off.
    fn open(&self, path: &SymbolPath) -> SymbolResult<Box<dyn SymbolService>>;
}
