//! Text helpers for the type renderer.

use crate::service::BaseKind;

/// Longest line the renderer emits, in characters.
pub(crate) const MAX_LINE_CHARS: usize = 259;

/// Column the value separator of a field line is aligned to.
pub(crate) const VALUE_COLUMN: usize = 60;

/// Name printed for a field whose type has no name of its own.
pub(crate) fn primitive_name(kind: BaseKind, size: u64) -> &'static str
{
    match kind {
        BaseKind::Void => "void",
        BaseKind::Char => "char",
        BaseKind::WChar => "wchar",
        BaseKind::Float => "float",
        BaseKind::Bcd => "bcd",
        BaseKind::Bool => "bool",
        BaseKind::Currency => "currency",
        BaseKind::Date => "date",
        BaseKind::Variant => "variant",
        BaseKind::Complex => "complex",
        BaseKind::Bit => "bit",
        BaseKind::Bstr => "BSTR",
        BaseKind::HResult => "HRESULT",
        BaseKind::Int | BaseKind::Long => match size {
            1 => "int8",
            2 => "int16",
            4 => "int32",
            8 => "int64",
            _ => "int??",
        },
        BaseKind::UInt | BaseKind::ULong => match size {
            1 => "byte",
            2 => "word",
            4 => "dword",
            8 => "uint64",
            _ => "uint??",
        },
        BaseKind::Function => "function",
        BaseKind::Pointer => "pointer",
        BaseKind::NoType | BaseKind::Other(_) => "???",
    }
}

/// Live value of a field: small values bare, larger ones zero padded to the
/// field width.
pub(crate) fn format_value(value: u64, size: u64) -> String
{
    if value < 10 {
        return format!("{value:X}");
    }
    match size {
        1 => format!("0x{value:02X}"),
        2 => format!("0x{value:04X}"),
        4 => format!("0x{value:08X}"),
        _ => format!("0x{value:016X}"),
    }
}

/// Classic 16-bytes-per-line hex and ASCII dump.
pub(crate) fn hexdump(bytes: &[u8]) -> String
{
    let mut out = String::with_capacity(bytes.len() / 16 * 76 + 76);
    for (line, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("{:04x}    ", line * 16));
        for column in 0..16 {
            match chunk.get(column) {
                Some(byte) => out.push_str(&format!("{byte:02x} ")),
                None => out.push_str("   "),
            }
            if column == 7 {
                out.push(' ');
            }
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' }));
        out.push('\n');
    }
    out
}

/// One output line, capped at [`MAX_LINE_CHARS`] characters
#[derive(Debug, Default)]
pub(crate) struct Line
{
    text: String,
    chars: usize,
}

impl Line
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn push(&mut self, s: &str)
    {
        for c in s.chars() {
            if self.chars >= MAX_LINE_CHARS {
                return;
            }
            self.text.push(c);
            self.chars += 1;
        }
    }

    /// Characters written so far.
    pub fn len(&self) -> usize
    {
        self.chars
    }

    pub fn is_empty(&self) -> bool
    {
        self.chars == 0
    }

    pub fn as_str(&self) -> &str
    {
        &self.text
    }
}

/// Rendered text, capped at a byte budget
#[derive(Debug)]
pub(crate) struct RenderBuffer
{
    text: String,
    capacity: usize,
}

impl RenderBuffer
{
    pub fn new(capacity: usize) -> Self
    {
        Self {
            text: String::new(),
            capacity,
        }
    }

    /// Append as much of `s` as fits, never splitting a character.
    pub fn push(&mut self, s: &str)
    {
        let room = self.capacity.saturating_sub(self.text.len());
        if s.len() <= room {
            self.text.push_str(s);
            return;
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&s[..cut]);
    }

    pub fn push_line(&mut self, line: &Line)
    {
        self.push(line.as_str());
        self.push("\n");
    }

    pub fn is_empty(&self) -> bool
    {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String
    {
        self.text
    }
}
