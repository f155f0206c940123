//! Host-native text.
//!
//! The host environment stores text as UTF-16 code units, which may contain
//! unpaired surrogates. [`HostString`] keeps that representation so that the
//! transcoder in [`crate::utf8`] sees exactly what the host holds.

use std::fmt;

/// A host text value: a sequence of UTF-16 code units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostString {
    units: Vec<u16>,
}

impl HostString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw code units; unpaired surrogates are kept as-is.
    pub fn from_units(units: Vec<u16>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    /// Length in UTF-16 code units (not characters, not UTF-8 bytes).
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Lossy conversion; unpaired surrogates become U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }
}

impl From<&str> for HostString {
    fn from(s: &str) -> Self {
        Self {
            units: s.encode_utf16().collect(),
        }
    }
}

impl From<String> for HostString {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl PartialEq<str> for HostString {
    fn eq(&self, other: &str) -> bool {
        self.units.iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for HostString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Display for HostString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.units.iter().copied()) {
            fmt::Write::write_char(f, c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_is_two_code_units() {
        let s = HostString::from("🎉");
        assert_eq!(s.len(), 2);
        assert_eq!(s, "🎉");
    }

    #[test]
    fn lone_surrogate_displays_as_replacement() {
        let s = HostString::from_units(vec![0x61, 0xD800, 0x62]);
        assert_eq!(s.to_string(), "a\u{FFFD}b");
        assert_eq!(s.to_string_lossy(), "a\u{FFFD}b");
    }
}
