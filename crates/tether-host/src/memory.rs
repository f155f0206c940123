//! Typed views over guest linear memory.
//!
//! A view borrows the memory bytes out of the store, so it cannot outlive a
//! call into the guest: anything that might grow memory needs the store
//! mutably, and the borrow checker refuses while a view is alive. The
//! [`MemoryViews`] record in the bridge state tracks the byte length the
//! current views were built for and a generation counter bumped on every
//! rebuild.

use tether_types::{DecodeError, HostString, KeyDescriptor, Slot, KEY_DESCRIPTOR_SIZE, SLOT_SIZE};
use tracing::{debug, warn};
use wasmi::AsContextMut;

use crate::error::{BridgeError, BridgeResult};
use crate::state::BridgeState;

/// Bookkeeping for the current set of views.
#[derive(Debug, Default)]
pub struct MemoryViews {
    generation: u64,
    byte_len: usize,
}

impl MemoryViews {
    /// Number of rebuilds so far; `0` until a guest is attached.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Memory size the current views were built for.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub(crate) fn rebuild(&mut self, byte_len: usize) {
        self.generation += 1;
        self.byte_len = byte_len;
        debug!(generation = self.generation, byte_len, "memory views rebuilt");
    }

    /// Rebuild if memory changed size without an on-grow notification.
    fn sync(&mut self, byte_len: usize) {
        if byte_len != self.byte_len {
            warn!(
                expected = self.byte_len,
                actual = byte_len,
                "linear memory resized without a growth notification"
            );
            self.rebuild(byte_len);
        }
    }
}

fn check(memory_len: usize, addr: u32, len: u32) -> Result<usize, DecodeError> {
    let start = addr as usize;
    let end = start + len as usize;
    if end > memory_len {
        return Err(DecodeError::OutOfBounds {
            addr,
            len,
            memory_len,
        });
    }
    Ok(start)
}

fn check_aligned(addr: u32, width: u32) -> Result<(), DecodeError> {
    if addr % width != 0 {
        return Err(DecodeError::Misaligned { addr, width });
    }
    Ok(())
}

/// `base + index * stride` with overflow reported against `base`.
pub(crate) fn element_addr(base: u32, index: u32, stride: u32) -> Result<u32, DecodeError> {
    index
        .checked_mul(stride)
        .and_then(|offset| base.checked_add(offset))
        .ok_or(DecodeError::LengthOverflow { addr: base, len: index })
}

/// `count * stride` bytes, or a length overflow.
pub(crate) fn byte_size(addr: u32, count: u32, stride: u32) -> Result<u32, DecodeError> {
    count
        .checked_mul(stride)
        .ok_or(DecodeError::LengthOverflow { addr, len: count })
}

macro_rules! read_fn {
    ($name:ident, $ty:ty, $width:expr) => {
        pub fn $name(&self, addr: u32) -> Result<$ty, DecodeError> {
            check_aligned(addr, $width)?;
            let start = check(self.bytes.len(), addr, $width)?;
            let mut raw = [0u8; $width];
            raw.copy_from_slice(&self.bytes[start..start + $width]);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

macro_rules! write_fn {
    ($name:ident, $ty:ty, $width:expr) => {
        pub fn $name(&mut self, addr: u32, value: $ty) -> Result<(), DecodeError> {
            check_aligned(addr, $width)?;
            let start = check(self.bytes.len(), addr, $width)?;
            self.bytes[start..start + $width].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
    };
}

/// Read-only typed view.
#[derive(Debug)]
pub struct MemoryView<'a> {
    bytes: &'a [u8],
    generation: u64,
}

impl<'a> MemoryView<'a> {
    pub fn new(bytes: &'a [u8], generation: u64) -> Self {
        Self { bytes, generation }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn u8(&self, addr: u32) -> Result<u8, DecodeError> {
        let start = check(self.bytes.len(), addr, 1)?;
        Ok(self.bytes[start])
    }

    pub fn i8(&self, addr: u32) -> Result<i8, DecodeError> {
        Ok(self.u8(addr)? as i8)
    }

    read_fn!(u16, u16, 2);
    read_fn!(i16, i16, 2);
    read_fn!(u32, u32, 4);
    read_fn!(i32, i32, 4);
    read_fn!(f32, f32, 4);
    read_fn!(f64, f64, 8);

    /// `len` raw bytes at `addr`.
    pub fn bytes(&self, addr: u32, len: u32) -> Result<&'a [u8], DecodeError> {
        let start = check(self.bytes.len(), addr, len)?;
        Ok(&self.bytes[start..start + len as usize])
    }

    /// The slot header at `addr`. Slots are word-aligned; Float64 slots are
    /// additionally 8-aligned.
    pub fn slot(&self, addr: u32) -> Result<Slot, DecodeError> {
        check_aligned(addr, 4)?;
        let start = check(self.bytes.len(), addr, SLOT_SIZE)?;
        let mut raw = [0u8; SLOT_SIZE as usize];
        raw.copy_from_slice(&self.bytes[start..start + SLOT_SIZE as usize]);
        let slot = Slot::read(&raw)?;
        if let Slot::Float64(_) = slot {
            check_aligned(addr, 8)?;
        }
        Ok(slot)
    }

    /// The object key descriptor at `addr`.
    pub fn key(&self, addr: u32) -> Result<KeyDescriptor, DecodeError> {
        check_aligned(addr, 4)?;
        let start = check(self.bytes.len(), addr, KEY_DESCRIPTOR_SIZE)?;
        let mut raw = [0u8; KEY_DESCRIPTOR_SIZE as usize];
        raw.copy_from_slice(&self.bytes[start..start + KEY_DESCRIPTOR_SIZE as usize]);
        Ok(KeyDescriptor::read(&raw))
    }

    /// UTF-8 text at `addr`, decoded into host text.
    pub fn read_str(&self, addr: u32, len: u32) -> Result<HostString, DecodeError> {
        if len == 0 {
            return Ok(HostString::new());
        }
        Ok(tether_types::utf8::decode(self.bytes(addr, len)?))
    }
}

/// Mutable typed view.
#[derive(Debug)]
pub struct MemoryViewMut<'a> {
    bytes: &'a mut [u8],
    generation: u64,
}

impl<'a> MemoryViewMut<'a> {
    pub fn new(bytes: &'a mut [u8], generation: u64) -> Self {
        Self { bytes, generation }
    }

    /// Read-only reborrow.
    pub fn as_view(&self) -> MemoryView<'_> {
        MemoryView::new(&self.bytes[..], self.generation)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_u8(&mut self, addr: u32, value: u8) -> Result<(), DecodeError> {
        let start = check(self.bytes.len(), addr, 1)?;
        self.bytes[start] = value;
        Ok(())
    }

    pub fn set_i8(&mut self, addr: u32, value: i8) -> Result<(), DecodeError> {
        self.set_u8(addr, value as u8)
    }

    write_fn!(set_u16, u16, 2);
    write_fn!(set_i16, i16, 2);
    write_fn!(set_u32, u32, 4);
    write_fn!(set_i32, i32, 4);
    write_fn!(set_f32, f32, 4);
    write_fn!(set_f64, f64, 8);

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), DecodeError> {
        let len = u32::try_from(data.len())
            .map_err(|_| DecodeError::LengthOverflow { addr, len: u32::MAX })?;
        let start = check(self.bytes.len(), addr, len)?;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Write the full 16-byte image of `slot` at `addr`.
    pub fn write_slot(&mut self, addr: u32, slot: &Slot) -> Result<(), DecodeError> {
        check_aligned(addr, 4)?;
        if let Slot::Float64(_) = slot {
            check_aligned(addr, 8)?;
        }
        self.write_bytes(addr, &slot.to_bytes())
    }

    pub fn write_key(&mut self, addr: u32, key: KeyDescriptor) -> Result<(), DecodeError> {
        check_aligned(addr, 4)?;
        self.write_bytes(addr, &key.to_bytes())
    }

    /// Transcode `text` to UTF-8 at `addr`, writing at most `capacity`
    /// bytes. Returns the bytes written.
    pub fn write_str(
        &mut self,
        addr: u32,
        text: &HostString,
        capacity: u32,
    ) -> Result<u32, DecodeError> {
        let start = check(self.bytes.len(), addr, capacity)?;
        let out = &mut self.bytes[start..start + capacity as usize];
        let written = tether_types::utf8::encode_into(text, out);
        Ok(written as u32)
    }
}

/// A read view plus the rest of the bridge state.
pub fn view<C>(ctx: &mut C) -> BridgeResult<(MemoryView<'_>, &mut BridgeState)>
where
    C: AsContextMut<Data = BridgeState>,
{
    let memory = ctx.as_context().data().guest()?.memory;
    let (bytes, state) = memory.data_and_store_mut(ctx);
    state.views.sync(bytes.len());
    let generation = state.views.generation();
    Ok((MemoryView::new(bytes, generation), state))
}

/// A write view plus the rest of the bridge state.
pub fn view_mut<C>(ctx: &mut C) -> BridgeResult<(MemoryViewMut<'_>, &mut BridgeState)>
where
    C: AsContextMut<Data = BridgeState>,
{
    let memory = ctx.as_context().data().guest()?.memory;
    let (bytes, state) = memory.data_and_store_mut(ctx);
    state.views.sync(bytes.len());
    let generation = state.views.generation();
    Ok((MemoryViewMut::new(bytes, generation), state))
}

/// Rebuild the views for the current memory size. Called once at attach
/// and on every growth notification.
pub fn rebuild<C>(ctx: &mut C) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let memory = ctx.as_context().data().guest()?.memory;
    let (bytes, state) = memory.data_and_store_mut(ctx);
    state.views.rebuild(bytes.len());
    Ok(())
}

/// Allocate `size` bytes through the guest allocator.
///
/// The guest may grow its memory while doing so; views taken before this
/// call cannot survive it.
pub fn alloc<C>(ctx: &mut C, size: u32) -> BridgeResult<u32>
where
    C: AsContextMut<Data = BridgeState>,
{
    let malloc = ctx.as_context().data().guest()?.malloc.clone();
    let ptr = malloc.call(&mut *ctx, size)?;
    if ptr == 0 && size > 0 {
        return Err(BridgeError::AllocationFailed(size));
    }
    Ok(ptr)
}

/// Return `ptr` to the guest allocator.
pub fn free<C>(ctx: &mut C, ptr: u32) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let free = ctx.as_context().data().guest()?.free.clone();
    free.call(&mut *ctx, ptr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_little_endian_and_bounds_checked() {
        let mut bytes = vec![0u8; 32];
        bytes[4..8].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        let view = MemoryView::new(&bytes, 1);
        assert_eq!(view.u32(4).unwrap(), 0xdead_beef);
        assert_eq!(view.u8(4).unwrap(), 0xef);
        assert_eq!(
            view.u32(32),
            Err(DecodeError::OutOfBounds {
                addr: 32,
                len: 4,
                memory_len: 32
            })
        );
        assert!(view.bytes(30, 2).is_ok());
        assert!(view.bytes(31, 2).is_err());
    }

    #[test]
    fn misaligned_access_is_rejected() {
        let bytes = vec![0u8; 32];
        let view = MemoryView::new(&bytes, 1);
        assert_eq!(view.u32(2), Err(DecodeError::Misaligned { addr: 2, width: 4 }));
        assert_eq!(view.f64(4), Err(DecodeError::Misaligned { addr: 4, width: 8 }));
        assert!(view.u16(2).is_ok());
    }

    #[test]
    fn float_slots_need_eight_byte_alignment() {
        let mut bytes = vec![0u8; 64];
        let mut view = MemoryViewMut::new(&mut bytes, 1);
        assert!(view.write_slot(8, &Slot::Float64(1.5)).is_ok());
        assert_eq!(
            view.write_slot(4, &Slot::Float64(1.5)),
            Err(DecodeError::Misaligned { addr: 4, width: 8 })
        );
        assert!(view.write_slot(4, &Slot::Int32(7)).is_ok());
        assert_eq!(view.as_view().slot(8).unwrap(), Slot::Float64(1.5));
    }

    #[test]
    fn slot_write_covers_all_sixteen_bytes() {
        let mut bytes = vec![0xffu8; 32];
        let mut view = MemoryViewMut::new(&mut bytes, 1);
        view.write_slot(0, &Slot::Null).unwrap();
        assert!(bytes[..12].iter().all(|b| *b == 0));
        assert_eq!(bytes[12], tether_types::wire::KIND_NULL);
        assert!(bytes[13..16].iter().all(|b| *b == 0));
        assert_eq!(bytes[16], 0xff);
    }

    #[test]
    fn string_round_trip_through_view() {
        let mut bytes = vec![0u8; 16];
        let text = HostString::from("héllo");
        let mut view = MemoryViewMut::new(&mut bytes, 1);
        let written = view.write_str(0, &text, 6).unwrap();
        assert_eq!(written, 6);
        assert_eq!(view.as_view().read_str(0, written).unwrap(), text);
    }

    #[test]
    fn signed_accessors_reinterpret() {
        let mut bytes = vec![0u8; 8];
        let mut view = MemoryViewMut::new(&mut bytes, 1);
        view.set_i16(0, -2).unwrap();
        view.set_i8(4, -1).unwrap();
        let view = view.as_view();
        assert_eq!(view.i16(0).unwrap(), -2);
        assert_eq!(view.u16(0).unwrap(), 0xfffe);
        assert_eq!(view.i8(4).unwrap(), -1);
    }

    #[test]
    fn unnotified_resize_triggers_rebuild() {
        let mut views = MemoryViews::default();
        views.rebuild(65536);
        views.sync(65536);
        assert_eq!(views.generation(), 1);
        views.sync(131072);
        assert_eq!(views.generation(), 2);
        assert_eq!(views.byte_len(), 131072);
    }

    #[test]
    fn element_addresses_detect_overflow() {
        assert_eq!(element_addr(64, 2, SLOT_SIZE), Ok(96));
        assert!(element_addr(u32::MAX - 8, 1, SLOT_SIZE).is_err());
        assert!(byte_size(0, u32::MAX, SLOT_SIZE).is_err());
    }
}
