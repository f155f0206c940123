//! Wire-format error types.

use thiserror::Error;

/// Errors raised while reading tagged values out of guest memory.
///
/// Any of these means host and guest disagree about the wire format, or the
/// guest handed over a pointer it never allocated. None is recoverable
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The kind byte at `offset+12` is not one of the known discriminants.
    #[error("unrecognized value kind {0}")]
    UnknownKind(u8),

    /// A read or write would run past the end of linear memory.
    #[error("access of {len} bytes at {addr:#x} exceeds memory of {memory_len} bytes")]
    OutOfBounds { addr: u32, len: u32, memory_len: usize },

    /// A numeric access was not aligned to its width.
    #[error("misaligned {width}-byte access at {addr:#x}")]
    Misaligned { addr: u32, width: u32 },

    /// A length field multiplied out past the 32-bit address space.
    #[error("length {len} at {addr:#x} overflows the address space")]
    LengthOverflow { addr: u32, len: u32 },
}
