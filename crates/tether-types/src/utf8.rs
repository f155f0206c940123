//! UTF-8 transcoder between host text (UTF-16) and guest bytes.
//!
//! Surrogate pairs are combined into one code point before encoding, so an
//! emoji costs four bytes, not six. An unpaired surrogate has no UTF-8 form
//! and is written as U+FFFD; [`utf8_len`] counts it the same way so the
//! length always matches what [`encode_into`] writes.

use crate::text::HostString;

fn chars(units: &[u16]) -> impl Iterator<Item = char> + '_ {
    char::decode_utf16(units.iter().copied()).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
}

/// Number of UTF-8 bytes needed to encode `text`.
pub fn utf8_len(text: &HostString) -> usize {
    chars(text.units()).map(char::len_utf8).sum()
}

/// Encode `text` into `out`, returning the number of bytes written.
///
/// `out` must be at least [`utf8_len`] bytes long; shorter buffers are
/// filled as far as whole characters fit.
pub fn encode_into(text: &HostString, out: &mut [u8]) -> usize {
    let mut written = 0;
    for c in chars(text.units()) {
        let n = c.len_utf8();
        if written + n > out.len() {
            break;
        }
        c.encode_utf8(&mut out[written..written + n]);
        written += n;
    }
    written
}

/// Encode `text` into a fresh byte vector.
pub fn encode(text: &HostString) -> Vec<u8> {
    let mut out = vec![0u8; utf8_len(text)];
    let written = encode_into(text, &mut out);
    out.truncate(written);
    out
}

/// Decode guest UTF-8 bytes into host text.
///
/// Invalid sequences decode to U+FFFD rather than failing; code points
/// above the BMP become surrogate pairs.
pub fn decode(bytes: &[u8]) -> HostString {
    HostString::from_units(String::from_utf8_lossy(bytes).encode_utf16().collect())
}
