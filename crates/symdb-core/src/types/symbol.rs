//! Reverse lookup results.

/// Nearest symbol at or before a module-relative offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatch
{
    /// Symbol name, truncated to [`SymbolMatch::MAX_NAME_LEN`] characters
    pub name: String,
    /// Distance from the symbol's start to the queried offset
    pub displacement: u64,
}

impl SymbolMatch
{
    /// Longest name kept from the symbol service.
    pub const MAX_NAME_LEN: usize = 259;

    pub(crate) fn new(name: &str, displacement: u64) -> Self
    {
        let name = match name.char_indices().nth(Self::MAX_NAME_LEN) {
            Some((cut, _)) => name[..cut].to_string(),
            None => name.to_string(),
        };
        Self { name, displacement }
    }
}
