//! Host handles to guest closures.
//!
//! A closure slot carries an adapter index, a data pointer and a
//! deallocator index. Calling goes through the adapter; releasing calls the
//! deallocator. Rust `Drop` never calls into the guest: it has no store to
//! call with, so release is explicit.

use std::cell::Cell;
use std::rc::Rc;

use tether_types::ClosureSlot;
use tracing::debug;
use wasmi::AsContextMut;

use crate::error::{BridgeError, BridgeResult};
use crate::state::BridgeState;
use crate::trampoline;
use crate::value::Value;

#[derive(Debug)]
struct ClosureInner {
    slot: ClosureSlot,
    released: Cell<bool>,
}

/// Repeatable guest closure. Clones share the release state.
#[derive(Debug, Clone)]
pub struct GuestClosure(Rc<ClosureInner>);

impl GuestClosure {
    pub(crate) fn new(slot: ClosureSlot) -> Self {
        Self(Rc::new(ClosureInner {
            slot,
            released: Cell::new(false),
        }))
    }

    pub fn slot(&self) -> ClosureSlot {
        self.0.slot
    }

    pub fn is_released(&self) -> bool {
        self.0.released.get()
    }

    /// Call the closure with `args`.
    pub fn call<C>(&self, ctx: &mut C, args: &[Value]) -> BridgeResult<Value>
    where
        C: AsContextMut<Data = BridgeState>,
    {
        if self.is_released() {
            return Err(BridgeError::Released);
        }
        let slot = self.0.slot;
        trampoline::call_with_args(ctx, slot.adapter, slot.data_ptr, args)
    }

    /// Run the guest deallocator. Only the first release does anything.
    pub fn release<C>(&self, ctx: &mut C) -> BridgeResult<()>
    where
        C: AsContextMut<Data = BridgeState>,
    {
        if self.0.released.replace(true) {
            return Ok(());
        }
        let slot = self.0.slot;
        debug!(data_ptr = slot.data_ptr, "releasing guest closure");
        trampoline::invoke_dealloc(ctx, slot.dealloc, slot.data_ptr)
    }

    pub fn ptr_eq(&self, other: &GuestClosure) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

#[derive(Debug)]
struct OnceInner {
    adapter: u32,
    dealloc: u32,
    /// Taken by the first call or release.
    data_ptr: Cell<Option<u32>>,
}

/// Guest closure callable at most once.
///
/// The first call consumes it: the guest adapter owns the data from then
/// on and frees it itself. Calling again is [`BridgeError::UseAfterConsume`];
/// releasing after a call does nothing.
#[derive(Debug, Clone)]
pub struct GuestOnceClosure(Rc<OnceInner>);

impl GuestOnceClosure {
    pub(crate) fn new(slot: ClosureSlot) -> Self {
        Self(Rc::new(OnceInner {
            adapter: slot.adapter,
            dealloc: slot.dealloc,
            data_ptr: Cell::new(Some(slot.data_ptr)),
        }))
    }

    pub fn is_consumed(&self) -> bool {
        self.0.data_ptr.get().is_none()
    }

    pub fn call<C>(&self, ctx: &mut C, args: &[Value]) -> BridgeResult<Value>
    where
        C: AsContextMut<Data = BridgeState>,
    {
        let data_ptr = self.0.data_ptr.take().ok_or(BridgeError::UseAfterConsume)?;
        trampoline::call_with_args(ctx, self.0.adapter, data_ptr, args)
    }

    /// Run the guest deallocator if the closure was never called.
    pub fn release<C>(&self, ctx: &mut C) -> BridgeResult<()>
    where
        C: AsContextMut<Data = BridgeState>,
    {
        let Some(data_ptr) = self.0.data_ptr.take() else {
            return Ok(());
        };
        debug!(data_ptr, "releasing uncalled one-shot closure");
        trampoline::invoke_dealloc(ctx, self.0.dealloc, data_ptr)
    }

    pub fn ptr_eq(&self, other: &GuestOnceClosure) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}
