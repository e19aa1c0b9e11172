// src/services/pdf/text.rs

//! String encodings used when writing PDF objects.

use lopdf::{Object, StringFormat};

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Encode for a simple font with `/WinAnsiEncoding`.
///
/// Latin-1 characters map to themselves; anything else becomes `?`.
pub fn win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match u32::from(c) {
            code @ 0x20..=0x7E | code @ 0xA0..=0xFF => code as u8,
            _ if c.is_whitespace() => b' ',
            _ => b'?',
        })
        .collect()
}

/// Literal string operand in WinAnsi encoding.
pub fn win_ansi_literal(s: &str) -> Object {
    Object::String(win_ansi(s), StringFormat::Literal)
}

/// Shorten `s` to at most `max_chars`, marking the cut with "...".
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
