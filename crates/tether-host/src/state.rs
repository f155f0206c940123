//! Per-instance bridge state, carried as the engine store's data.

use std::fmt;
use std::rc::Rc;

use tether_types::ExportNames;
use wasmi::{AsContext, Caller, Instance, Memory, Table, TypedFunc};

use crate::config::BridgeConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::MemoryViews;
use crate::refs::RefTable;
use crate::trampoline::ScratchSlot;
use crate::value::Value;

/// Host function body: receives the calling context and decoded arguments,
/// returns the value encoded into the guest's return slot.
///
/// The context lets the callback call back into the guest (nested calls).
pub type HostCallback = Rc<dyn Fn(&mut Caller<'_, BridgeState>, Vec<Value>) -> BridgeResult<Value>>;

/// A registered host function.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub arity: u32,
    pub(crate) callback: HostCallback,
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Guest exports the bridge calls into.
#[derive(Debug, Clone)]
pub struct GuestExports {
    pub memory: Memory,
    pub malloc: TypedFunc<u32, u32>,
    pub free: TypedFunc<u32, ()>,
    pub table: Table,
    pub main: TypedFunc<(), ()>,
}

impl GuestExports {
    /// Look every export up by name and check its signature.
    pub fn resolve(
        store: impl AsContext,
        instance: &Instance,
        names: &ExportNames,
    ) -> BridgeResult<Self> {
        let missing = |name: &str| BridgeError::MissingExport(name.to_string());
        let store = store.as_context();
        Ok(Self {
            memory: instance
                .get_memory(&store, &names.memory)
                .ok_or_else(|| missing(&names.memory))?,
            malloc: instance
                .get_typed_func::<u32, u32>(&store, &names.malloc)
                .map_err(|_| missing(&names.malloc))?,
            free: instance
                .get_typed_func::<u32, ()>(&store, &names.free)
                .map_err(|_| missing(&names.free))?,
            table: instance
                .get_table(&store, &names.table)
                .ok_or_else(|| missing(&names.table))?,
            main: instance
                .get_typed_func::<(), ()>(&store, &names.main)
                .map_err(|_| missing(&names.main))?,
        })
    }
}

/// Everything one bridge instance owns.
#[derive(Debug)]
pub struct BridgeState {
    config: BridgeConfig,
    guest: Option<GuestExports>,
    pub(crate) views: MemoryViews,
    pub(crate) refs: RefTable,
    pub(crate) scratch: ScratchSlot,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) host_functions: Vec<HostFunction>,
}

impl BridgeState {
    pub fn new(config: BridgeConfig, host_functions: Vec<HostFunction>) -> Self {
        let diagnostics = Diagnostics::new(config.max_diagnostics);
        Self {
            config,
            guest: None,
            views: MemoryViews::default(),
            refs: RefTable::new(),
            scratch: ScratchSlot::default(),
            diagnostics,
            host_functions,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The attached guest, or [`BridgeError::Detached`].
    pub fn guest(&self) -> BridgeResult<&GuestExports> {
        self.guest.as_ref().ok_or(BridgeError::Detached)
    }

    pub fn is_attached(&self) -> bool {
        self.guest.is_some()
    }

    pub(crate) fn attach(&mut self, exports: GuestExports) {
        self.guest = Some(exports);
    }

    pub fn refs(&self) -> &RefTable {
        &self.refs
    }

    pub fn refs_mut(&mut self) -> &mut RefTable {
        &mut self.refs
    }

    pub fn views(&self) -> &MemoryViews {
        &self.views
    }

    pub fn scratch(&self) -> &ScratchSlot {
        &self.scratch
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn host_functions(&self) -> &[HostFunction] {
        &self.host_functions
    }
}
