//! Rendering of raw value payloads into display text.
//!
//! Rendering is pure: the same kind and bytes always give the same text.
//! Host strings are UTF-16LE and may carry one or more terminators.

use std::fmt::Write as _;

use super::kind::ValueKind;

/// Separator placed between the parts of a multi-string value.
pub const MULTI_STRING_SEPARATOR: &str = ", ";

/// A rendered value: its kind and display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedValue {
    pub kind: ValueKind,
    pub text: String,
}

/// Render a payload whose kind code may be outside the known set.
///
/// Returns `None` for an unknown code; the caller decides how to report it.
#[must_use]
pub fn render_raw(code: u32, data: &[u8]) -> Option<RenderedValue> {
    ValueKind::from_code(code).map(|kind| RenderedValue {
        kind,
        text: render(kind, data),
    })
}

/// Render a payload of a known kind.
#[must_use]
pub fn render(kind: ValueKind, data: &[u8]) -> String {
    match kind {
        ValueKind::None => String::new(),
        ValueKind::String | ValueKind::ExpandString | ValueKind::Link => decode_text(data),
        ValueKind::Binary | ValueKind::FullResourceDescriptor => to_hex(data),
        ValueKind::Dword => data
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(|b| format!("0x{:08x}", u32::from_le_bytes(b)))
            .unwrap_or_default(),
        ValueKind::DwordBigEndian => data
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(|b| format!("0x{:08x}", u32::from_be_bytes(b)))
            .unwrap_or_default(),
        ValueKind::Qword => data
            .get(..8)
            .and_then(|b| <[u8; 8]>::try_from(b).ok())
            .map(|b| format!("0x{:016x}", u64::from_le_bytes(b)))
            .unwrap_or_default(),
        ValueKind::MultiString => decode_multi_text(data).join(MULTI_STRING_SEPARATOR),
        ValueKind::ResourceList | ValueKind::ResourceRequirementsList => render_lossy(data),
    }
}

/// Best-effort text for a payload of unknown layout: lossy UTF-8 with NULs
/// stripped.
#[must_use]
pub fn render_lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).replace('\0', "")
}

/// Decode terminated UTF-16LE text, stopping at the first terminator.
#[must_use]
pub fn decode_text(data: &[u8]) -> String {
    let units: Vec<u16> = utf16_units(data).take_while(|&u| u != 0).collect();
    String::from_utf16_lossy(&units)
}

/// Decode a UTF-16LE multi-string into its non-empty parts.
#[must_use]
pub fn decode_multi_text(data: &[u8]) -> Vec<String> {
    let units: Vec<u16> = utf16_units(data).collect();
    units
        .split(|&u| u == 0)
        .filter(|part| !part.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// Encode text as terminated UTF-16LE, the layout a host string value uses.
#[must_use]
pub fn encode_text(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Encode parts as a UTF-16LE multi-string (each terminated, plus a final terminator).
#[must_use]
pub fn encode_multi_text<S: AsRef<str>>(parts: &[S]) -> Vec<u8> {
    let mut out: Vec<u8> = parts
        .iter()
        .flat_map(|p| encode_text(p.as_ref()))
        .collect();
    out.extend_from_slice(&[0, 0]);
    out
}

/// Lowercase hex, no separators.
#[must_use]
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse hex text (optionally with spaces) into bytes.
///
/// Returns `None` for an odd digit count or a non-hex character.
#[must_use]
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

fn utf16_units(data: &[u8]) -> impl Iterator<Item = u16> + '_ {
    data.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
}
