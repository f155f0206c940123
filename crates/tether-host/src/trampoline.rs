//! Call trampoline: host-initiated calls into guest function-table entries.
//!
//! Guest functions do not return values through the wasm return channel.
//! An adapter hands one slot address to the install import before it
//! returns; the import decodes it into the [`ScratchSlot`], and the
//! trampoline takes it from there as soon as the call completes. Nested
//! calls are safe because every value is taken immediately after its own
//! call returns, before the outer call resumes.

use tether_types::SLOT_SIZE;
use tracing::{trace, warn};
use wasmi::{AsContext, AsContextMut, Func, Val};

use crate::codec;
use crate::error::{BridgeError, BridgeResult};
use crate::memory;
use crate::state::BridgeState;
use crate::value::Value;

/// Single pending return value.
#[derive(Debug, Default)]
pub struct ScratchSlot {
    pending: Option<Value>,
}

impl ScratchSlot {
    /// Store a value installed by the guest. A value nobody took is
    /// overwritten.
    pub fn install(&mut self, value: Value) {
        if let Some(stale) = self.pending.replace(value) {
            warn!(kind = stale.type_name(), "overwriting an uncollected return value");
        }
    }

    /// Take the pending value, leaving the slot empty. Empty reads as
    /// undefined.
    pub fn take(&mut self) -> Value {
        self.pending.take().unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Resolve a table index to a function.
fn table_entry<C>(ctx: &C, index: u32) -> BridgeResult<Func>
where
    C: AsContext<Data = BridgeState>,
{
    let table = ctx.as_context().data().guest()?.table;
    match table.get(ctx, u64::from(index)) {
        Some(Val::FuncRef(func)) => func.func().copied().ok_or(BridgeError::EmptyTableSlot(index)),
        _ => Err(BridgeError::EmptyTableSlot(index)),
    }
}

/// Call `table[table_index](data_ptr, args_ptr)` and return what the guest
/// installed (undefined if it installed nothing). The scratch slot is
/// cleared whether or not the call traps.
pub fn invoke<C>(ctx: &mut C, table_index: u32, data_ptr: u32, args_ptr: u32) -> BridgeResult<Value>
where
    C: AsContextMut<Data = BridgeState>,
{
    let func = table_entry(ctx, table_index)?;
    let adapter = func.typed::<(u32, u32), ()>(&*ctx)?;
    trace!(table_index, data_ptr, args_ptr, "invoking guest adapter");
    let outcome = adapter.call(&mut *ctx, (data_ptr, args_ptr));
    // a trapped call may still have installed a value
    let value = ctx.as_context_mut().data_mut().scratch.take();
    outcome?;
    Ok(value)
}

/// Call the deallocator `table[table_index](data_ptr)`.
pub fn invoke_dealloc<C>(ctx: &mut C, table_index: u32, data_ptr: u32) -> BridgeResult<()>
where
    C: AsContextMut<Data = BridgeState>,
{
    let func = table_entry(ctx, table_index)?;
    let dealloc = func.typed::<u32, ()>(&*ctx)?;
    trace!(table_index, data_ptr, "invoking guest deallocator");
    dealloc.call(&mut *ctx, data_ptr)?;
    Ok(())
}

/// Encode `args` as one array slot in fresh guest memory, then invoke the
/// adapter with it.
pub fn call_with_args<C>(
    ctx: &mut C,
    table_index: u32,
    data_ptr: u32,
    args: &[Value],
) -> BridgeResult<Value>
where
    C: AsContextMut<Data = BridgeState>,
{
    let args_ptr = memory::alloc(ctx, SLOT_SIZE)?;
    codec::encode_array(ctx, args_ptr, args)?;
    invoke(ctx, table_index, data_ptr, args_ptr)
}
