//! Double-quoted string escaping for the value column of the log.
//!
//! Quoted values never contain a raw tab, newline or unescaped `"`, so a
//! record always occupies exactly one line and the value is always the last
//! tab-separated field.

use std::fmt::Write;

/// Format characters (Cf) and reserved code points that `char::is_control`
/// and `char::is_whitespace` do not cover.
const INVISIBLE: &[(u32, u32)] = &[
    (0x00ad, 0x00ad),
    (0x0600, 0x0605),
    (0x061c, 0x061c),
    (0x06dd, 0x06dd),
    (0x070f, 0x070f),
    (0x0890, 0x0891),
    (0x08e2, 0x08e2),
    (0x180e, 0x180e),
    (0x200b, 0x200f),
    (0x202a, 0x202e),
    (0x2060, 0x2064),
    (0x2066, 0x206f),
    (0xe000, 0xf8ff),
    (0xfdd0, 0xfdef),
    (0xfeff, 0xfeff),
    (0xfff9, 0xfffb),
    (0x110bd, 0x110bd),
    (0x110cd, 0x110cd),
    (0x13430, 0x1343f),
    (0x1bca0, 0x1bca3),
    (0x1d173, 0x1d17a),
    (0xe0001, 0xe0001),
    (0xe0020, 0xe007f),
    (0xf0000, 0x10ffff),
];

/// True for characters written verbatim: visible glyphs and the ASCII space.
fn is_graphic(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    let cp = c as u32;
    // U+xFFFE and U+xFFFF are noncharacters in every plane.
    if cp & 0xfffe == 0xfffe {
        return false;
    }
    !INVISIBLE.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Quote `s` with backslash escapes.
///
/// Graphic characters and the ASCII space are copied through. Everything
/// else is escaped, including non-ASCII spaces and zero-width characters.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c if !is_graphic(c) => {
                let cp = c as u32;
                // Writing to a String cannot fail.
                let _ = if cp < 0x80 {
                    write!(out, "\\x{:02x}", cp)
                } else if cp < 0x10000 {
                    write!(out, "\\u{:04x}", cp)
                } else {
                    write!(out, "\\U{:08x}", cp)
                };
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Reverse of [`quote`]. `s` must be exactly one quoted string.
pub fn unquote(s: &str) -> Result<String, String> {
    let inner = s
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| format!("value is not a quoted string: {}", s))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Err("unescaped quote inside value".to_string()),
            '\n' => return Err("raw newline inside value".to_string()),
            '\\' => {
                let esc = chars.next().ok_or("dangling backslash at end of value")?;
                let decoded = match esc {
                    'a' => '\x07',
                    'b' => '\x08',
                    'f' => '\x0c',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'v' => '\x0b',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    'x' => ascii_from(read_radix(&mut chars, 2, 16)?)?,
                    'u' => scalar_from(read_radix(&mut chars, 4, 16)?)?,
                    'U' => scalar_from(read_radix(&mut chars, 8, 16)?)?,
                    d @ '0'..='7' => {
                        let rest = read_radix(&mut chars, 2, 8)?;
                        let high = d.to_digit(8).unwrap_or(0);
                        ascii_from(high * 64 + rest)?
                    }
                    other => return Err(format!("unknown escape sequence \\{}", other)),
                };
                out.push(decoded);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn read_radix(chars: &mut std::str::Chars<'_>, digits: usize, radix: u32) -> Result<u32, String> {
    let mut value = 0u32;
    for _ in 0..digits {
        let c = chars.next().ok_or("truncated escape sequence")?;
        let d = c
            .to_digit(radix)
            .ok_or_else(|| format!("invalid digit {:?} in escape sequence", c))?;
        value = value * radix + d;
    }
    Ok(value)
}

// Byte escapes above 0x7f would produce invalid UTF-8 on their own.
fn ascii_from(value: u32) -> Result<char, String> {
    if value < 0x80 {
        Ok(value as u8 as char)
    } else {
        Err(format!("byte escape 0x{:02x} is not valid UTF-8", value))
    }
}

fn scalar_from(value: u32) -> Result<char, String> {
    char::from_u32(value).ok_or_else(|| format!("escape 0x{:x} is not a unicode scalar", value))
}
