//! Host functions the guest imports.
//!
//! Each import is a thin shim: convert engine arguments, run the bridge
//! operation, and turn a bridge error into a trap of the guest call that
//! made it.

use tracing::trace;
use wasmi::core::ValType;
use wasmi::{Caller, FuncType, Linker, Val};

use crate::codec;
use crate::config::BridgeConfig;
use crate::diagnostics::Diagnostic;
use crate::error::{BridgeError, BridgeResult};
use crate::memory;
use crate::state::{BridgeState, HostFunction};

fn link_error(err: impl std::fmt::Display) -> BridgeError {
    BridgeError::Link(err.to_string())
}

/// Define the bridge imports and every host function in `linker`.
pub(crate) fn define(
    linker: &mut Linker<BridgeState>,
    config: &BridgeConfig,
    host_functions: &[HostFunction],
) -> BridgeResult<()> {
    let module = config.import_module.as_str();
    let names = &config.imports;

    linker
        .func_wrap(
            module,
            &names.increment_refcount,
            |mut caller: Caller<'_, BridgeState>, id: u32| -> Result<(), wasmi::Error> {
                caller.data_mut().refs.increment(id).map_err(BridgeError::into_trap)
            },
        )
        .map_err(link_error)?;

    linker
        .func_wrap(
            module,
            &names.decrement_refcount,
            |mut caller: Caller<'_, BridgeState>, id: u32| -> Result<(), wasmi::Error> {
                caller.data_mut().refs.decrement(id).map_err(BridgeError::into_trap)
            },
        )
        .map_err(link_error)?;

    linker
        .func_wrap(
            module,
            &names.install_value,
            |mut caller: Caller<'_, BridgeState>, addr: u32| -> Result<(), wasmi::Error> {
                let value = codec::decode(&mut caller, addr).map_err(BridgeError::into_trap)?;
                trace!(addr, kind = value.type_name(), "guest installed return value");
                caller.data_mut().scratch.install(value);
                Ok(())
            },
        )
        .map_err(link_error)?;

    linker
        .func_wrap(
            module,
            &names.on_grow,
            |mut caller: Caller<'_, BridgeState>| -> Result<(), wasmi::Error> {
                memory::rebuild(&mut caller).map_err(BridgeError::into_trap)
            },
        )
        .map_err(link_error)?;

    linker
        .func_wrap(module, &names.panic, |mut caller: Caller<'_, BridgeState>| {
            caller.data_mut().diagnostics.record(Diagnostic::Panic);
        })
        .map_err(link_error)?;

    linker
        .func_wrap(
            module,
            &names.panic_message,
            |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| -> Result<(), wasmi::Error> {
                let message = codec::read_str(&mut caller, ptr, len)
                    .map_err(BridgeError::into_trap)?
                    .to_string_lossy();
                caller
                    .data_mut()
                    .diagnostics
                    .record(Diagnostic::Message(message));
                Ok(())
            },
        )
        .map_err(link_error)?;

    linker
        .func_wrap(
            module,
            &names.panic_location,
            |mut caller: Caller<'_, BridgeState>,
             ptr: u32,
             len: u32,
             line: u32|
             -> Result<(), wasmi::Error> {
                let file = codec::read_str(&mut caller, ptr, len)
                    .map_err(BridgeError::into_trap)?
                    .to_string_lossy();
                caller
                    .data_mut()
                    .diagnostics
                    .record(Diagnostic::Location { file, line });
                Ok(())
            },
        )
        .map_err(link_error)?;

    for (index, function) in host_functions.iter().enumerate() {
        // (return_slot, arg slots...) -> ()
        let params = vec![ValType::I32; function.arity as usize + 1];
        let ty = FuncType::new(params, []);
        linker
            .func_new(
                module,
                &function.name,
                ty,
                move |mut caller: Caller<'_, BridgeState>,
                      params: &[Val],
                      _results: &mut [Val]|
                      -> Result<(), wasmi::Error> {
                    call_host_function(&mut caller, index, params).map_err(BridgeError::into_trap)
                },
            )
            .map_err(link_error)?;
    }

    Ok(())
}

/// Decode the argument slots, run the callback, encode its result into the
/// return slot.
fn call_host_function(
    caller: &mut Caller<'_, BridgeState>,
    index: usize,
    params: &[Val],
) -> BridgeResult<()> {
    let function = caller
        .data()
        .host_functions
        .get(index)
        .cloned()
        .ok_or_else(|| BridgeError::MalformedCall(format!("#{index}")))?;

    let mut addrs = Vec::with_capacity(params.len());
    for param in params {
        match param {
            Val::I32(addr) => addrs.push(*addr as u32),
            _ => return Err(BridgeError::MalformedCall(function.name.clone())),
        }
    }
    let Some((&return_slot, arg_slots)) = addrs.split_first() else {
        return Err(BridgeError::MalformedCall(function.name.clone()));
    };

    let mut args = Vec::with_capacity(arg_slots.len());
    for &addr in arg_slots {
        args.push(codec::decode(caller, addr)?);
    }
    trace!(name = %function.name, argc = args.len(), "host function called");
    let result = (function.callback)(caller, args)?;
    codec::encode(caller, return_slot, &result)
}
