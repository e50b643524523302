//! Modified UTF-8, as stored in `CONSTANT_Utf8` entries.
//!
//! Only 1, 2 and 3 byte sequences are accepted. Four byte sequences are not part of the
//! format (supplementary characters are stored as surrogate pairs instead).

use std::cmp::Ordering;

use anyhow::{anyhow, Result};

/// Decode one code point from the front of `bytes`.
///
/// Returns the code point and the number of bytes it used, or `None` on malformed or
/// truncated input. A `None` is a hard failure, never an empty read.
pub fn next_char(bytes: &[u8]) -> Option<(u32, usize)> {
    let first = *bytes.first()?;

    if first & 0x80 == 0 {
        return Some((first as u32, 1));
    }

    let is_follow = |b: Option<&u8>| b.map(|b| b & 0xC0 == 0x80).unwrap_or(false);

    if first & 0xE0 == 0xC0 && is_follow(bytes.get(1)) {
        let value = ((first as u32 & 0x1F) << 6) | (bytes[1] as u32 & 0x3F);
        return Some((value, 2));
    }

    if first & 0xF0 == 0xE0 && is_follow(bytes.get(1)) && is_follow(bytes.get(2)) {
        let value = ((first as u32 & 0x0F) << 12)
            | ((bytes[1] as u32 & 0x3F) << 6)
            | (bytes[2] as u32 & 0x3F);
        return Some((value, 3));
    }

    None
}

/// Iterate the code points of `bytes`, yielding `Err` once at the first malformed sequence.
pub fn chars(bytes: &[u8]) -> impl Iterator<Item = Result<u32>> + '_ {
    let mut rest = bytes;
    let mut failed = false;

    std::iter::from_fn(move || {
        if rest.is_empty() || failed {
            return None;
        }

        match next_char(rest) {
            Some((ch, used)) => {
                rest = &rest[used..];
                Some(Ok(ch))
            }
            None => {
                failed = true;
                Some(Err(anyhow!("malformed modified utf-8 sequence")))
            }
        }
    })
}

/// A single byte is legal inside a `CONSTANT_Utf8` entry.
pub fn is_valid_byte(byte: u8) -> bool {
    byte != 0 && byte < 0xF0
}

/// Compare a modified UTF-8 string against plain ASCII, code point by code point.
///
/// Any non-ASCII code point (or malformed input) never compares equal. Ordering follows
/// the first differing position, then length.
pub fn compare_ascii(utf8: &[u8], ascii: &str) -> Option<Ordering> {
    let mut ascii = ascii.bytes();

    for ch in chars(utf8) {
        let ch = ch.ok()?;
        if ch > 127 {
            return None;
        }

        match ascii.next() {
            Some(expected) => match (ch as u8).cmp(&expected) {
                Ordering::Equal => continue,
                other => return Some(other),
            },
            None => return Some(Ordering::Greater),
        }
    }

    if ascii.next().is_some() {
        Some(Ordering::Less)
    } else {
        Some(Ordering::Equal)
    }
}

pub fn eq_ascii(utf8: &[u8], ascii: &str) -> bool {
    compare_ascii(utf8, ascii) == Some(Ordering::Equal)
}

/// Raw byte-for-byte equality, no decoding.
pub fn eq_bytes(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Best-effort transliteration for display. Non-ASCII code points become `?`, and at
/// most `capacity` characters are produced. Decoding stops at the first malformed sequence.
pub fn to_ascii(bytes: &[u8], capacity: usize) -> String {
    chars(bytes)
        .map_while(|ch| ch.ok())
        .take(capacity)
        .map(|ch| if ch > 127 { '?' } else { ch as u8 as char })
        .collect()
}

/// Number of code points, stopping at the first malformed sequence.
pub fn char_count(bytes: &[u8]) -> usize {
    chars(bytes).map_while(|ch| ch.ok()).count()
}

/// Decode into a Rust string. Lone surrogates (which modified UTF-8 can carry) are
/// replaced, paired surrogates are joined.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let units = chars(bytes)
        .map(|ch| ch.map(|c| c as u16))
        .collect::<Result<Vec<u16>>>()?;

    Ok(String::from_utf16_lossy(&units))
}

/// Encode a Rust string as modified UTF-8 (NUL becomes the two byte form).
pub fn encode(str: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(str.len());

    for unit in str.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_sequence_lengths() {
        assert_eq!(next_char(b"A"), Some((0x41, 1)));
        assert_eq!(next_char(&[0xC3, 0xA9]), Some((0xE9, 2)));
        assert_eq!(next_char(&[0xE2, 0x82, 0xAC]), Some((0x20AC, 3)));
    }

    #[test]
    fn it_rejects_malformed_sequences() {
        assert_eq!(next_char(&[]), None);
        // four byte lead
        assert_eq!(next_char(&[0xF0, 0x9F, 0x98, 0x80]), None);
        // truncated
        assert_eq!(next_char(&[0xE2, 0x82]), None);
        // bad follow byte
        assert_eq!(next_char(&[0xC3, 0x41]), None);
        assert!(!is_valid_byte(0));
        assert!(!is_valid_byte(0xF5));
        assert!(is_valid_byte(0xE2));
    }

    #[test]
    fn it_compares_against_ascii() {
        assert!(eq_ascii(b"<init>", "<init>"));
        assert!(!eq_ascii(b"<init>", "<clinit>"));
        assert!(!eq_ascii(&[0xC3, 0xA9], "e"));
        assert_eq!(compare_ascii(b"abc", "abd"), Some(Ordering::Less));
        assert_eq!(compare_ascii(b"abcd", "abc"), Some(Ordering::Greater));
        assert!(eq_bytes(&[0xC0, 0x80], &encode("\0")));
        assert!(!eq_bytes(b"ab", b"abc"));
    }

    #[test]
    fn it_transliterates_to_ascii() {
        let bytes = encode("caf\u{e9} bar");
        assert_eq!(to_ascii(&bytes, 48), "caf? bar");
        assert_eq!(to_ascii(&bytes, 3), "caf");
        assert_eq!(char_count(&bytes), 8);
    }

    #[test]
    fn it_encodes_nul_as_two_bytes() {
        assert_eq!(encode("\0"), vec![0xC0, 0x80]);
        assert_eq!(decode(&[0xC0, 0x80]).unwrap(), "\0");
    }
}
