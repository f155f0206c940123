//! Tagged-value wire layout.
//!
//! Every value crossing the bridge occupies a fixed 16-byte slot in guest
//! linear memory. All integers are little-endian.
//!
//! ```text
//! offset+0  : 12 bytes payload (interpretation depends on kind)
//! offset+12 : u8       kind (see [`Kind`])
//! offset+13 : 3 bytes  unused
//! ```
//!
//! # Payload layouts
//!
//! | Kind                 | Bytes 0..4      | Bytes 4..8    | Bytes 8..12      |
//! |----------------------|-----------------|---------------|------------------|
//! | UNDEFINED/NULL       | -               | -             | -                |
//! | FALSE/TRUE           | -               | -             | -                |
//! | INT32                | i32             | -             | -                |
//! | FLOAT64              | f64 occupies bytes 0..8         | -                |
//! | STRING               | u32 data ptr    | u32 byte len  | -                |
//! | ARRAY                | u32 slots ptr   | u32 count     | -                |
//! | OBJECT               | u32 values ptr  | u32 count     | u32 keys ptr     |
//! | HOST_REF (3 kinds)   | u32 reference id| -             | -                |
//! | CLOSURE / ONE_SHOT   | u32 adapter idx | u32 data ptr  | u32 dealloc idx  |
//!
//! Object keys are consecutive 8-byte `{ptr: u32, len: u32}` descriptors;
//! array elements and object values are consecutive 16-byte slots.

use crate::error::DecodeError;

/// Size of one tagged slot (bytes).
pub const SLOT_SIZE: u32 = 16;
/// Byte offset of the kind discriminant inside a slot.
pub const KIND_OFFSET: u32 = 12;
/// Size of one object key descriptor (bytes).
pub const KEY_DESCRIPTOR_SIZE: u32 = 8;

// ── Kind discriminants ───────────────────────────────────────────────────────

pub const KIND_UNDEFINED: u8 = 0;
pub const KIND_NULL: u8 = 1;
pub const KIND_INT32: u8 = 2;
pub const KIND_FLOAT64: u8 = 3;
pub const KIND_STRING: u8 = 4;
pub const KIND_FALSE: u8 = 5;
pub const KIND_TRUE: u8 = 6;
pub const KIND_ARRAY: u8 = 7;
pub const KIND_OBJECT: u8 = 8;
pub const KIND_HOST_REF: u8 = 9;
pub const KIND_CLOSURE: u8 = 10;
pub const KIND_HOST_OBJECT_REF: u8 = 11;
pub const KIND_HOST_ARRAY_REF: u8 = 12;
pub const KIND_ONE_SHOT_CLOSURE: u8 = 13;

/// The kind byte stored at [`KIND_OFFSET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Undefined = KIND_UNDEFINED,
    Null = KIND_NULL,
    Int32 = KIND_INT32,
    Float64 = KIND_FLOAT64,
    String = KIND_STRING,
    False = KIND_FALSE,
    True = KIND_TRUE,
    Array = KIND_ARRAY,
    Object = KIND_OBJECT,
    HostRef = KIND_HOST_REF,
    Closure = KIND_CLOSURE,
    HostObjectRef = KIND_HOST_OBJECT_REF,
    HostArrayRef = KIND_HOST_ARRAY_REF,
    OneShotClosure = KIND_ONE_SHOT_CLOSURE,
}

impl TryFrom<u8> for Kind {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, DecodeError> {
        Ok(match byte {
            KIND_UNDEFINED => Kind::Undefined,
            KIND_NULL => Kind::Null,
            KIND_INT32 => Kind::Int32,
            KIND_FLOAT64 => Kind::Float64,
            KIND_STRING => Kind::String,
            KIND_FALSE => Kind::False,
            KIND_TRUE => Kind::True,
            KIND_ARRAY => Kind::Array,
            KIND_OBJECT => Kind::Object,
            KIND_HOST_REF => Kind::HostRef,
            KIND_CLOSURE => Kind::Closure,
            KIND_HOST_OBJECT_REF => Kind::HostObjectRef,
            KIND_HOST_ARRAY_REF => Kind::HostArrayRef,
            KIND_ONE_SHOT_CLOSURE => Kind::OneShotClosure,
            other => return Err(DecodeError::UnknownKind(other)),
        })
    }
}

/// Which flavour of host reference a slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefFlavor {
    /// Any reference-typed host value that is neither mapping- nor array-shaped.
    Plain,
    /// Mapping-shaped host object.
    Object,
    /// Array-shaped host object.
    Array,
}

/// Payload of a `Closure` / `OneShotClosure` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureSlot {
    /// Function-table index of the guest adapter, called as `(data_ptr, args_ptr)`.
    pub adapter: u32,
    /// Guest-side closure data pointer.
    pub data_ptr: u32,
    /// Function-table index of the deallocator, called as `(data_ptr)`.
    pub dealloc: u32,
}

/// An object key descriptor: `{ptr, len}` of UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub ptr: u32,
    pub len: u32,
}

impl KeyDescriptor {
    pub fn read(bytes: &[u8; KEY_DESCRIPTOR_SIZE as usize]) -> Self {
        Self {
            ptr: word(bytes, 0),
            len: word(bytes, 4),
        }
    }

    pub fn to_bytes(self) -> [u8; KEY_DESCRIPTOR_SIZE as usize] {
        let mut out = [0u8; KEY_DESCRIPTOR_SIZE as usize];
        put_word(&mut out, 0, self.ptr);
        put_word(&mut out, 4, self.len);
        out
    }
}

/// A decoded slot header: the kind plus its raw payload fields.
///
/// Nested data (string bytes, array elements, object entries) is *not*
/// followed here; that needs access to the rest of linear memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Undefined,
    Null,
    Int32(i32),
    Float64(f64),
    String { ptr: u32, len: u32 },
    False,
    True,
    Array { ptr: u32, len: u32 },
    Object { values_ptr: u32, len: u32, keys_ptr: u32 },
    Ref { flavor: RefFlavor, id: u32 },
    Closure(ClosureSlot),
    OneShotClosure(ClosureSlot),
}

impl Slot {
    /// The kind discriminant this slot is written with.
    pub fn kind(&self) -> Kind {
        match self {
            Slot::Undefined => Kind::Undefined,
            Slot::Null => Kind::Null,
            Slot::Int32(_) => Kind::Int32,
            Slot::Float64(_) => Kind::Float64,
            Slot::String { .. } => Kind::String,
            Slot::False => Kind::False,
            Slot::True => Kind::True,
            Slot::Array { .. } => Kind::Array,
            Slot::Object { .. } => Kind::Object,
            Slot::Ref {
                flavor: RefFlavor::Plain,
                ..
            } => Kind::HostRef,
            Slot::Ref {
                flavor: RefFlavor::Object,
                ..
            } => Kind::HostObjectRef,
            Slot::Ref {
                flavor: RefFlavor::Array,
                ..
            } => Kind::HostArrayRef,
            Slot::Closure(_) => Kind::Closure,
            Slot::OneShotClosure(_) => Kind::OneShotClosure,
        }
    }

    /// Boolean slot for `b`.
    pub fn bool(b: bool) -> Self {
        if b {
            Slot::True
        } else {
            Slot::False
        }
    }

    /// Parse the 16 bytes of a slot.
    pub fn read(bytes: &[u8; SLOT_SIZE as usize]) -> Result<Self, DecodeError> {
        let kind = Kind::try_from(bytes[KIND_OFFSET as usize])?;
        let closure = || ClosureSlot {
            adapter: word(bytes, 0),
            data_ptr: word(bytes, 4),
            dealloc: word(bytes, 8),
        };
        Ok(match kind {
            Kind::Undefined => Slot::Undefined,
            Kind::Null => Slot::Null,
            Kind::Int32 => Slot::Int32(word(bytes, 0) as i32),
            Kind::Float64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[0..8]);
                Slot::Float64(f64::from_le_bytes(raw))
            }
            Kind::String => Slot::String {
                ptr: word(bytes, 0),
                len: word(bytes, 4),
            },
            Kind::False => Slot::False,
            Kind::True => Slot::True,
            Kind::Array => Slot::Array {
                ptr: word(bytes, 0),
                len: word(bytes, 4),
            },
            Kind::Object => Slot::Object {
                values_ptr: word(bytes, 0),
                len: word(bytes, 4),
                keys_ptr: word(bytes, 8),
            },
            Kind::HostRef => Slot::Ref {
                flavor: RefFlavor::Plain,
                id: word(bytes, 0),
            },
            Kind::HostObjectRef => Slot::Ref {
                flavor: RefFlavor::Object,
                id: word(bytes, 0),
            },
            Kind::HostArrayRef => Slot::Ref {
                flavor: RefFlavor::Array,
                id: word(bytes, 0),
            },
            Kind::Closure => Slot::Closure(closure()),
            Kind::OneShotClosure => Slot::OneShotClosure(closure()),
        })
    }

    /// Serialize into a full 16-byte slot image; unused bytes are zero.
    pub fn to_bytes(&self) -> [u8; SLOT_SIZE as usize] {
        let mut out = [0u8; SLOT_SIZE as usize];
        match *self {
            Slot::Undefined | Slot::Null | Slot::False | Slot::True => {}
            Slot::Int32(v) => put_word(&mut out, 0, v as u32),
            Slot::Float64(v) => out[0..8].copy_from_slice(&v.to_le_bytes()),
            Slot::String { ptr, len } | Slot::Array { ptr, len } => {
                put_word(&mut out, 0, ptr);
                put_word(&mut out, 4, len);
            }
            Slot::Object {
                values_ptr,
                len,
                keys_ptr,
            } => {
                put_word(&mut out, 0, values_ptr);
                put_word(&mut out, 4, len);
                put_word(&mut out, 8, keys_ptr);
            }
            Slot::Ref { id, .. } => put_word(&mut out, 0, id),
            Slot::Closure(c) | Slot::OneShotClosure(c) => {
                put_word(&mut out, 0, c.adapter);
                put_word(&mut out, 4, c.data_ptr);
                put_word(&mut out, 8, c.dealloc);
            }
        }
        out[KIND_OFFSET as usize] = self.kind() as u8;
        out
    }
}

fn put_word(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn word(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}
