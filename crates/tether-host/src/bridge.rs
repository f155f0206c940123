//! Bootstrap and the owning [`Bridge`] handle.

use std::fmt;
use std::rc::Rc;

use sha2::{Digest, Sha256};
use tether_types::{Slot, SLOT_SIZE};
use tracing::{debug, info};
use wasmi::{Caller, Engine, Instance, Linker, Module, Store, Val};

use crate::codec;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::imports;
use crate::memory::{self, MemoryView};
use crate::refs::RefId;
use crate::state::{BridgeState, GuestExports, HostFunction};
use crate::value::Value;

/// Hex SHA-256 of a module binary.
pub fn fingerprint(wasm: &[u8]) -> String {
    let digest = Sha256::digest(wasm);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Collects configuration and host functions, then instantiates a guest.
#[derive(Debug, Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    host_functions: Vec<HostFunction>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            host_functions: Vec::new(),
        }
    }

    /// Register a host function the guest imports as `name`, taking a
    /// return-slot address followed by `arity` argument-slot addresses.
    pub fn host_function<F>(mut self, name: &str, arity: u32, callback: F) -> Self
    where
        F: Fn(&mut Caller<'_, BridgeState>, Vec<Value>) -> BridgeResult<Value> + 'static,
    {
        self.host_functions.push(HostFunction {
            name: name.to_string(),
            arity,
            callback: Rc::new(callback),
        });
        self
    }

    /// Compile, link and start `wasm`, attach its exports, build the first
    /// memory views and run its entry point once.
    pub fn instantiate(self, wasm: &[u8]) -> BridgeResult<Bridge> {
        let fingerprint = fingerprint(wasm);
        info!(%fingerprint, bytes = wasm.len(), "loading guest module");

        let engine = Engine::default();
        let module = Module::new(&engine, wasm)?;
        let mut linker = Linker::<BridgeState>::new(&engine);
        imports::define(&mut linker, &self.config, &self.host_functions)?;

        let mut store = Store::new(&engine, BridgeState::new(self.config, self.host_functions));
        let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;

        let exports = GuestExports::resolve(&store, &instance, &store.data().config().exports)?;
        store.data_mut().attach(exports);
        memory::rebuild(&mut store)?;
        debug!(
            generation = store.data().views().generation(),
            byte_len = store.data().views().byte_len(),
            "guest attached"
        );

        let main = store.data().guest()?.main.clone();
        main.call(&mut store, ())?;
        info!(%fingerprint, "guest entry point returned");

        Ok(Bridge {
            store,
            instance,
            fingerprint,
        })
    }
}

/// A running guest together with its bridge state.
pub struct Bridge {
    store: Store<BridgeState>,
    instance: Instance,
    fingerprint: String,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("fingerprint", &self.fingerprint)
            .field("state", self.store.data())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Instantiate with the default configuration and no host functions.
    pub fn load(wasm: &[u8]) -> BridgeResult<Self> {
        Self::builder().instantiate(wasm)
    }

    /// Hex SHA-256 of the guest binary.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn state(&self) -> &BridgeState {
        self.store.data()
    }

    pub fn state_mut(&mut self) -> &mut BridgeState {
        self.store.data_mut()
    }

    pub fn store(&self) -> &Store<BridgeState> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<BridgeState> {
        &mut self.store
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Value of an exported `i32` global.
    pub fn global_i32(&self, name: &str) -> Option<i32> {
        match self.instance.get_global(&self.store, name)?.get(&self.store) {
            Val::I32(value) => Some(value),
            _ => None,
        }
    }

    /// Allocate a slot in guest memory and encode `value` into it.
    pub fn encode(&mut self, value: &Value) -> BridgeResult<u32> {
        let addr = memory::alloc(&mut self.store, SLOT_SIZE)?;
        codec::encode(&mut self.store, addr, value)?;
        Ok(addr)
    }

    pub fn encode_at(&mut self, addr: u32, value: &Value) -> BridgeResult<()> {
        codec::encode(&mut self.store, addr, value)
    }

    pub fn decode(&mut self, addr: u32) -> BridgeResult<Value> {
        codec::decode(&mut self.store, addr)
    }

    /// Write a raw slot header, as guest code would.
    pub fn write_slot(&mut self, addr: u32, slot: &Slot) -> BridgeResult<()> {
        codec::write_slot(&mut self.store, addr, slot)
    }

    /// Read view of guest memory. It borrows the bridge, so no guest call
    /// can happen while it is alive.
    pub fn view(&mut self) -> BridgeResult<MemoryView<'_>> {
        let (view, _) = memory::view(&mut self.store)?;
        Ok(view)
    }

    pub fn alloc(&mut self, size: u32) -> BridgeResult<u32> {
        memory::alloc(&mut self.store, size)
    }

    pub fn free(&mut self, ptr: u32) -> BridgeResult<()> {
        memory::free(&mut self.store, ptr)
    }

    /// Call a guest closure value with `args`.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> BridgeResult<Value> {
        match callee {
            Value::Closure(closure) => closure.call(&mut self.store, args),
            Value::OnceClosure(closure) => closure.call(&mut self.store, args),
            other => Err(BridgeError::NotCallable(other.type_name())),
        }
    }

    /// Release a guest closure value. Anything else is ignored.
    pub fn release(&mut self, value: &Value) -> BridgeResult<()> {
        match value {
            Value::Closure(closure) => closure.release(&mut self.store),
            Value::OnceClosure(closure) => closure.release(&mut self.store),
            _ => Ok(()),
        }
    }

    /// Register `value` as the guest would see it and return its id.
    pub fn acquire_reference(&mut self, value: &Value) -> BridgeResult<RefId> {
        self.state_mut().refs.acquire(value)
    }

    pub fn release_reference(&mut self, id: RefId) -> BridgeResult<()> {
        self.state_mut().refs.decrement(id)
    }

    pub fn lookup_reference(&self, id: RefId) -> BridgeResult<Value> {
        self.state().refs.lookup(id)
    }

    /// Call function-table entry `table_index` as an adapter with
    /// `data_ptr` and `args`.
    pub fn table_call(
        &mut self,
        table_index: u32,
        data_ptr: u32,
        args: &[Value],
    ) -> BridgeResult<Value> {
        crate::trampoline::call_with_args(&mut self.store, table_index, data_ptr, args)
    }
}
