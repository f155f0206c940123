//! Shared fixtures for the host integration tests.
//!
//! Guests are generated with `tether-guest`, so every test states exactly
//! which adapters and host functions its guest has.

#![allow(dead_code)]

use tether_guest::{Adapter, GuestBuilder};
use tether_host::{Bridge, BridgeBuilder, Slot, Value};
use tether_types::ClosureSlot;

/// A closure placed in guest static memory, ready to be decoded.
#[derive(Debug, Clone, Copy)]
pub struct StaticClosure {
    pub addr: u32,
    pub slot: ClosureSlot,
}

/// Add `adapter` plus its own deallocator and a prebuilt closure slot.
pub fn closure(builder: &mut GuestBuilder, adapter: Adapter, data_ptr: u32) -> StaticClosure {
    let slot = ClosureSlot {
        adapter: builder.adapter(adapter),
        data_ptr,
        dealloc: builder.deallocator(),
    };
    StaticClosure {
        addr: builder.static_slot(Slot::Closure(slot)),
        slot,
    }
}

/// Same as [`closure`], but the slot is a one-shot closure.
pub fn once_closure(builder: &mut GuestBuilder, adapter: Adapter, data_ptr: u32) -> StaticClosure {
    let slot = ClosureSlot {
        adapter: builder.adapter(adapter),
        data_ptr,
        dealloc: builder.deallocator(),
    };
    StaticClosure {
        addr: builder.static_slot(Slot::OneShotClosure(slot)),
        slot,
    }
}

pub fn load(builder: &GuestBuilder) -> Bridge {
    let wasm = builder.build().expect("guest build failed");
    Bridge::load(&wasm).expect("bridge instantiation failed")
}

pub fn load_with(bridge: BridgeBuilder, builder: &GuestBuilder) -> Bridge {
    let wasm = builder.build().expect("guest build failed");
    bridge.instantiate(&wasm).expect("bridge instantiation failed")
}

/// A guest with one echo closure, the most common fixture.
pub fn echo_bridge() -> (Bridge, Value) {
    let mut builder = GuestBuilder::new();
    let echo = closure(&mut builder, Adapter::Echo, 0x100);
    let mut bridge = load(&builder);
    let value = bridge.decode(echo.addr).expect("decode echo closure");
    (bridge, value)
}

pub fn drop_calls(bridge: &Bridge) -> i32 {
    bridge.global_i32("drop_calls").expect("drop_calls global")
}
