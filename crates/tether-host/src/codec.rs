//! Tagged value codec: host [`Value`]s to and from guest slots.
//!
//! Decoding only reads guest memory. Encoding may allocate through the
//! guest allocator, which may grow memory, so every write takes a fresh
//! view after the allocation that precedes it.
//!
//! Numbers with an integral value in `i32` range are written as Int32,
//! everything else as Float64; `-0.0` therefore arrives as Int32 `0`.
//! Host data is always a tree for `encode`: arrays and objects own their
//! elements, and shared objects cross as reference ids. Guest data is not
//! checked for cycles: a slot graph that points back into itself makes
//! `decode` recurse until the host stack overflows, which aborts the
//! process. Guests must send trees.

use tether_types::{
    utf8, HostString, KeyDescriptor, RefFlavor, Slot, KEY_DESCRIPTOR_SIZE, SLOT_SIZE,
};
use tracing::{debug, warn};
use wasmi::AsContextMut;

use crate::closure::{GuestClosure, GuestOnceClosure};
use crate::error::BridgeResult;
use crate::memory::{self, byte_size, element_addr, MemoryView};
use crate::refs::{RefId, RefTable, NO_REFERENCE};
use crate::state::BridgeState;
use crate::value::{Mapping, Value};

/// Decode the slot at `addr` into a host value.
///
/// Array and object slots are followed recursively. A guest slot graph
/// with a cycle never finishes decoding and overflows the stack.
pub fn decode<C>(ctx: &mut C, addr: u32) -> BridgeResult<Value>
where
    C: AsContextMut<Data = BridgeState>,
{
    let (view, state) = memory::view(ctx)?;
    decode_in(&view, &state.refs, addr)
}

/// Decode against an already-taken view.
pub fn decode_in(view: &MemoryView<'_>, refs: &RefTable, addr: u32) -> BridgeResult<Value> {
    Ok(match view.slot(addr)? {
        Slot::Undefined => Value::Undefined,
        Slot::Null => Value::Null,
        Slot::Int32(n) => Value::Number(f64::from(n)),
        Slot::Float64(n) => Value::Number(n),
        Slot::String { ptr, len } => Value::String(view.read_str(ptr, len)?),
        Slot::False => Value::Bool(false),
        Slot::True => Value::Bool(true),
        Slot::Array { ptr, len } => {
            // Bounds first so a corrupt length cannot force a huge allocation.
            view.bytes(ptr, byte_size(ptr, len, SLOT_SIZE)?)?;
            let mut items = Vec::with_capacity(len as usize);
            for index in 0..len {
                items.push(decode_in(view, refs, element_addr(ptr, index, SLOT_SIZE)?)?);
            }
            Value::Array(items)
        }
        Slot::Object {
            values_ptr,
            len,
            keys_ptr,
        } => {
            view.bytes(values_ptr, byte_size(values_ptr, len, SLOT_SIZE)?)?;
            view.bytes(keys_ptr, byte_size(keys_ptr, len, KEY_DESCRIPTOR_SIZE)?)?;
            let mut map = Mapping::with_capacity(len as usize);
            for index in 0..len {
                let key = view.key(element_addr(keys_ptr, index, KEY_DESCRIPTOR_SIZE)?)?;
                let key = view.read_str(key.ptr, key.len)?;
                let value = decode_in(view, refs, element_addr(values_ptr, index, SLOT_SIZE)?)?;
                map.insert(key, value);
            }
            Value::Object(map)
        }
        Slot::Ref { id, .. } => refs.lookup(id)?,
        Slot::Closure(slot) => Value::Closure(GuestClosure::new(slot)),
        Slot::OneShotClosure(slot) => Value::OnceClosure(GuestOnceClosure::new(slot)),
    })
}

/// Slot for a number: Int32 when exactly representable, else Float64.
pub fn number_slot(n: f64) -> Slot {
    if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Slot::Int32(n as i32)
    } else {
        Slot::Float64(n)
    }
}

/// Encode `value` into the slot at `addr`.
///
/// Reference-typed values are registered in the reference table; each
/// encode is one acquire the guest must later balance with a decrement.
/// If the encode fails partway, every acquire it made is rolled back.
pub fn encode<C>(ctx: &mut C, addr: u32, value: &Value) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    journaled(ctx, |ctx, acquired| encode_value(ctx, addr, value, acquired))
}

/// Encode `items` as an Array slot at `addr` with freshly allocated
/// element storage.
pub fn encode_array<C>(ctx: &mut C, addr: u32, items: &[Value]) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    journaled(ctx, |ctx, acquired| encode_items(ctx, addr, items, acquired))
}

/// Encode `map` as an Object slot at `addr`: a key-descriptor array and a
/// value-slot array, both in insertion order.
pub fn encode_object<C>(ctx: &mut C, addr: u32, map: &Mapping) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    journaled(ctx, |ctx, acquired| encode_entries(ctx, addr, map, acquired))
}

/// Run `encode` and release whatever it acquired if it fails, so that no
/// registration outlives a slot the guest never received.
fn journaled<C, F>(ctx: &mut C, encode: F) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
    F: FnOnce(&mut C, &mut Vec<RefId>) -> BridgeResult<()>,
{
    let mut acquired = Vec::new();
    let result = encode(ctx, &mut acquired);
    if result.is_err() && !acquired.is_empty() {
        debug!(count = acquired.len(), "rolling back references of a failed encode");
        for id in acquired.into_iter().rev() {
            if let Err(err) = ctx.as_context_mut().data_mut().refs.decrement(id) {
                warn!(id, %err, "rollback of a failed encode");
            }
        }
    }
    result
}

fn encode_value<C>(
    ctx: &mut C,
    addr: u32,
    value: &Value,
    acquired: &mut Vec<RefId>,
) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let slot = match value {
        Value::Undefined => Slot::Undefined,
        Value::Null => Slot::Null,
        Value::Bool(b) => Slot::bool(*b),
        Value::Number(n) => number_slot(*n),
        Value::String(text) => {
            let (ptr, len) = write_str(ctx, text)?;
            Slot::String { ptr, len }
        }
        Value::Array(items) => return encode_items(ctx, addr, items, acquired),
        Value::Object(map) => return encode_entries(ctx, addr, map, acquired),
        Value::Reference(obj) => Slot::Ref {
            flavor: obj.ref_flavor(),
            id: acquire(ctx, value, acquired)?,
        },
        Value::Symbol(_) | Value::Closure(_) | Value::OnceClosure(_) => Slot::Ref {
            flavor: RefFlavor::Plain,
            id: acquire(ctx, value, acquired)?,
        },
    };
    write_slot(ctx, addr, &slot)
}

fn encode_items<C>(
    ctx: &mut C,
    addr: u32,
    items: &[Value],
    acquired: &mut Vec<RefId>,
) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let len = count(addr, items.len())?;
    let ptr = memory::alloc(ctx, byte_size(addr, len, SLOT_SIZE)?)?;
    write_slot(ctx, addr, &Slot::Array { ptr, len })?;
    for (index, item) in (0..len).zip(items) {
        encode_value(ctx, element_addr(ptr, index, SLOT_SIZE)?, item, acquired)?;
    }
    Ok(())
}

fn encode_entries<C>(
    ctx: &mut C,
    addr: u32,
    map: &Mapping,
    acquired: &mut Vec<RefId>,
) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let len = count(addr, map.len())?;
    let keys_ptr = memory::alloc(ctx, byte_size(addr, len, KEY_DESCRIPTOR_SIZE)?)?;
    let values_ptr = memory::alloc(ctx, byte_size(addr, len, SLOT_SIZE)?)?;
    write_slot(
        ctx,
        addr,
        &Slot::Object {
            values_ptr,
            len,
            keys_ptr,
        },
    )?;
    for (index, (key, value)) in (0..len).zip(map.iter()) {
        let (ptr, key_len) = write_str(ctx, key)?;
        let (mut view, _) = memory::view_mut(ctx)?;
        view.write_key(
            element_addr(keys_ptr, index, KEY_DESCRIPTOR_SIZE)?,
            KeyDescriptor { ptr, len: key_len },
        )?;
        encode_value(ctx, element_addr(values_ptr, index, SLOT_SIZE)?, value, acquired)?;
    }
    Ok(())
}

/// Copy `text` into guest memory as UTF-8. Empty text is `(0, 0)` and
/// allocates nothing.
pub fn write_str<C>(ctx: &mut C, text: &HostString) -> BridgeResult<(u32, u32)>
where
    C: AsContextMut<Data = BridgeState>,
{
    let size = utf8::utf8_len(text);
    if size == 0 {
        return Ok((0, 0));
    }
    let len = count(0, size)?;
    let ptr = memory::alloc(ctx, len)?;
    let (mut view, _) = memory::view_mut(ctx)?;
    let written = view.write_str(ptr, text, len)?;
    Ok((ptr, written))
}

/// Decode `len` UTF-8 bytes at `ptr`.
pub fn read_str<C>(ctx: &mut C, ptr: u32, len: u32) -> BridgeResult<HostString>
where
    C: AsContextMut<Data = BridgeState>,
{
    let (view, _) = memory::view(ctx)?;
    Ok(view.read_str(ptr, len)?)
}

/// Write a raw slot header at `addr`.
pub fn write_slot<C>(ctx: &mut C, addr: u32, slot: &Slot) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let (mut view, _) = memory::view_mut(ctx)?;
    view.write_slot(addr, slot)?;
    Ok(())
}

fn acquire<C>(ctx: &mut C, value: &Value, acquired: &mut Vec<RefId>) -> BridgeResult<RefId>
where
    C: AsContextMut<Data = BridgeState>,
{
    let id = ctx.as_context_mut().data_mut().refs.acquire(value)?;
    if id != NO_REFERENCE {
        acquired.push(id);
    }
    Ok(id)
}

fn count(addr: u32, len: usize) -> BridgeResult<u32> {
    Ok(u32::try_from(len).map_err(|_| tether_types::DecodeError::LengthOverflow {
        addr,
        len: u32::MAX,
    })?)
}
