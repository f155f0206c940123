//! Guest module assembler.
//!
//! [`GuestBuilder`] collects host-function declarations, table entries,
//! static data and entry-point calls, then assembles a module that imports
//! the bridge functions and exports memory, allocator, deallocator, table
//! and entry point under the configured names.

use std::borrow::Cow;

use tether_types::{utf8, ExportNames, HostString, ImportNames, Slot, DEFAULT_IMPORT_MODULE, SLOT_SIZE};
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    MemorySection, MemoryType, Module, RefType, TableSection, TableType, TypeSection, ValType,
};

use crate::body::{self, MainCall, PanicReport};
use crate::error::{GuestError, GuestResult};
use crate::layout::*;

/// Behaviour of one adapter table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adapter {
    /// Returns argument 0 unchanged (`undefined` with no arguments).
    Echo,
    /// Installs argument 0 like [`Adapter::Echo`], then traps.
    EchoThenTrap,
    /// Returns the number of arguments.
    ArgCount,
    /// Returns the closure's data pointer.
    DataPointer,
    /// Passes argument 0 to a declared host function of arity 1 and returns
    /// what it produced.
    Forward { function: String },
    /// Reports a panic through the diagnostic imports and returns `undefined`.
    Panic {
        message: String,
        file: String,
        line: u32,
    },
    /// Grows memory by `pages`, then returns argument 0.
    Grow { pages: u32 },
    /// Increments the refcount of the reference in argument 0.
    Retain,
    /// Decrements the refcount of the reference in argument 0.
    Release,
}

/// An adapter with its static data placed, ready to emit.
#[derive(Debug, Clone)]
enum Emitted {
    Echo,
    EchoThenTrap,
    ArgCount,
    DataPointer,
    Forward { function: String },
    Panic(PanicReport),
    Grow { pages: u32 },
    Retain,
    Release,
}

#[derive(Debug, Clone)]
enum TableEntry {
    Adapter(Emitted),
    Dealloc,
}

#[derive(Debug, Clone)]
struct PendingCall {
    function: String,
    args: Vec<u32>,
}

/// Builder for a guest module speaking the bridge ABI.
#[derive(Debug, Clone)]
pub struct GuestBuilder {
    module: String,
    imports: ImportNames,
    exports: ExportNames,
    host_functions: Vec<(String, u32)>,
    entries: Vec<TableEntry>,
    statics: Vec<u8>,
    main_calls: Vec<PendingCall>,
    initial_pages: u64,
    max_pages: u64,
}

impl Default for GuestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestBuilder {
    pub fn new() -> Self {
        Self {
            module: DEFAULT_IMPORT_MODULE.to_string(),
            imports: ImportNames::default(),
            exports: ExportNames::default(),
            host_functions: Vec::new(),
            entries: Vec::new(),
            statics: Vec::new(),
            main_calls: Vec::new(),
            initial_pages: 1,
            max_pages: 256,
        }
    }

    /// Use non-default ABI names.
    pub fn with_names(mut self, module: &str, imports: ImportNames, exports: ExportNames) -> Self {
        self.module = module.to_string();
        self.imports = imports;
        self.exports = exports;
        self
    }

    /// Set initial and maximum memory size in pages.
    pub fn pages(mut self, initial: u64, max: u64) -> Self {
        self.initial_pages = initial;
        self.max_pages = max;
        self
    }

    /// Declare a host function import taking `arity` argument slots (plus
    /// the leading return slot).
    pub fn host_function(&mut self, name: &str, arity: u32) -> &mut Self {
        self.host_functions.push((name.to_string(), arity));
        self
    }

    /// Add an adapter entry; returns its function-table index.
    pub fn adapter(&mut self, adapter: Adapter) -> u32 {
        let emitted = match adapter {
            Adapter::Echo => Emitted::Echo,
            Adapter::EchoThenTrap => Emitted::EchoThenTrap,
            Adapter::ArgCount => Emitted::ArgCount,
            Adapter::DataPointer => Emitted::DataPointer,
            Adapter::Forward { function } => Emitted::Forward { function },
            Adapter::Panic {
                message,
                file,
                line,
            } => Emitted::Panic(PanicReport {
                message: self.static_str(&message),
                file: self.static_str(&file),
                line,
            }),
            Adapter::Grow { pages } => Emitted::Grow { pages },
            Adapter::Retain => Emitted::Retain,
            Adapter::Release => Emitted::Release,
        };
        self.entries.push(TableEntry::Adapter(emitted));
        self.entries.len() as u32
    }

    /// Add a counting deallocator entry; returns its function-table index.
    pub fn deallocator(&mut self) -> u32 {
        self.entries.push(TableEntry::Dealloc);
        self.entries.len() as u32
    }

    /// Place raw bytes in static memory, 8-byte aligned; returns the address.
    pub fn static_bytes(&mut self, bytes: &[u8]) -> u32 {
        self.align_statics(8);
        let addr = STATIC_START + self.statics.len() as u32;
        self.statics.extend_from_slice(bytes);
        addr
    }

    /// Place UTF-8 text in static memory; returns `(ptr, len)`.
    pub fn static_str(&mut self, text: &str) -> (u32, u32) {
        let bytes = utf8::encode(&HostString::from(text));
        let ptr = self.static_bytes(&bytes);
        (ptr, bytes.len() as u32)
    }

    /// Place a prebuilt 16-byte slot in static memory; returns the address.
    pub fn static_slot(&mut self, slot: Slot) -> u32 {
        self.align_statics(SLOT_SIZE as usize);
        self.static_bytes(&slot.to_bytes())
    }

    /// Make the entry point call `function` with the given argument slots.
    pub fn main_call(&mut self, function: &str, args: &[u32]) -> &mut Self {
        self.main_calls.push(PendingCall {
            function: function.to_string(),
            args: args.to_vec(),
        });
        self
    }

    fn align_statics(&mut self, align: usize) {
        let absolute = STATIC_START as usize + self.statics.len();
        let padding = (align - absolute % align) % align;
        self.statics.resize(self.statics.len() + padding, 0);
    }

    fn host_function_index(&self, name: &str, args: u32) -> GuestResult<u32> {
        let (position, (_, arity)) = self
            .host_functions
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == name)
            .ok_or_else(|| GuestError::UnknownHostFunction(name.to_string()))?;
        if *arity != args {
            return Err(GuestError::ArityMismatch {
                name: name.to_string(),
                expected: *arity,
                got: args,
            });
        }
        Ok(BRIDGE_IMPORT_COUNT + position as u32)
    }

    /// Assemble and validate the module.
    pub fn build(&self) -> GuestResult<Vec<u8>> {
        if self.initial_pages == 0
            || self.initial_pages > self.max_pages
            || self.max_pages > MAX_PAGES_LIMIT
        {
            return Err(GuestError::InvalidMemory(format!(
                "initial {} / max {} pages (limit {MAX_PAGES_LIMIT})",
                self.initial_pages, self.max_pages
            )));
        }

        let mut bodies = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let (ty, func) = match entry {
                TableEntry::Dealloc => (void_type(1), body::emit_counting_dealloc()),
                TableEntry::Adapter(adapter) => (void_type(2), self.emit_adapter(adapter)?),
            };
            bodies.push((ty, func));
        }

        let capacity = HEAP_START - STATIC_START;
        let needed = self.statics.len() as u32;
        if needed > capacity {
            return Err(GuestError::StaticOverflow { needed, capacity });
        }

        let mut main_calls = Vec::with_capacity(self.main_calls.len());
        for call in &self.main_calls {
            main_calls.push(MainCall {
                function: self.host_function_index(&call.function, call.args.len() as u32)?,
                args: call.args.clone(),
            });
        }

        let mut module = Module::new();
        module.section(&self.emit_types());
        module.section(&self.emit_imports());

        // malloc, free, main, then table entries
        let defined_base = BRIDGE_IMPORT_COUNT + self.host_functions.len() as u32;
        let mut functions = FunctionSection::new();
        let mut code = CodeSection::new();
        functions.function(TYPE_MALLOC);
        code.function(&body::emit_malloc());
        functions.function(void_type(1));
        code.function(&body::emit_free());
        functions.function(void_type(0));
        code.function(&body::emit_main(&main_calls));
        for (ty, func) in &bodies {
            functions.function(*ty);
            code.function(func);
        }
        module.section(&functions);

        // Slot 0 stays empty so a zero index never resolves.
        let table_size = self.entries.len() as u64 + 1;
        let mut tables = TableSection::new();
        tables.table(TableType {
            element_type: RefType::FUNCREF,
            table64: false,
            minimum: table_size,
            maximum: Some(table_size),
            shared: false,
        });
        module.section(&tables);

        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: self.initial_pages,
            maximum: Some(self.max_pages),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        module.section(&memory);

        module.section(&self.emit_globals());

        let mut exports = ExportSection::new();
        exports.export(&self.exports.memory, ExportKind::Memory, 0);
        exports.export(&self.exports.malloc, ExportKind::Func, defined_base);
        exports.export(&self.exports.free, ExportKind::Func, defined_base + 1);
        exports.export(&self.exports.main, ExportKind::Func, defined_base + 2);
        exports.export(&self.exports.table, ExportKind::Table, 0);
        for (index, name) in GLOBAL_EXPORTS.iter().enumerate() {
            exports.export(name, ExportKind::Global, index as u32);
        }
        module.section(&exports);

        if !bodies.is_empty() {
            let entry_funcs: Vec<u32> = (0..bodies.len() as u32).map(|i| defined_base + 3 + i).collect();
            let mut elements = ElementSection::new();
            elements.active(
                Some(0),
                &ConstExpr::i32_const(1),
                Elements::Functions(Cow::Borrowed(&entry_funcs)),
            );
            module.section(&elements);
        }

        module.section(&code);

        if !self.statics.is_empty() {
            let mut data = DataSection::new();
            data.active(
                0,
                &ConstExpr::i32_const(STATIC_START as i32),
                self.statics.iter().copied(),
            );
            module.section(&data);
        }

        let wasm_bytes = module.finish();
        wasmparser::validate(&wasm_bytes)
            .map_err(|e| GuestError::ValidationFailed(format!("{e}")))?;
        Ok(wasm_bytes)
    }

    fn emit_adapter(&self, adapter: &Emitted) -> GuestResult<Function> {
        Ok(match adapter {
            Emitted::Echo => body::emit_echo(),
            Emitted::EchoThenTrap => body::emit_echo_then_trap(),
            Emitted::ArgCount => body::emit_arg_count(),
            Emitted::DataPointer => body::emit_data_pointer(),
            Emitted::Forward { function } => {
                body::emit_forward(self.host_function_index(function, 1)?)
            }
            Emitted::Panic(report) => body::emit_panic(*report),
            Emitted::Grow { pages } => body::emit_grow(*pages),
            Emitted::Retain => body::emit_refcount(IMPORT_INCREMENT_REFCOUNT),
            Emitted::Release => body::emit_refcount(IMPORT_DECREMENT_REFCOUNT),
        })
    }

    fn max_params(&self) -> u32 {
        let widest_host = self
            .host_functions
            .iter()
            .map(|(_, arity)| arity + 1)
            .max()
            .unwrap_or(0);
        widest_host.max(3)
    }

    fn emit_types(&self) -> TypeSection {
        let mut types = TypeSection::new();
        // TYPE_MALLOC
        types.ty().function(vec![ValType::I32], vec![ValType::I32]);
        // void_type(n) for n in 0..=max_params
        for params in 0..=self.max_params() {
            types
                .ty()
                .function(vec![ValType::I32; params as usize], vec![]);
        }
        types
    }

    fn emit_imports(&self) -> ImportSection {
        let mut imports = ImportSection::new();
        let module = self.module.as_str();
        let names = &self.imports;

        // order must match IMPORT_* in layout.rs
        imports.import(module, &names.increment_refcount, EntityType::Function(void_type(1)));
        imports.import(module, &names.decrement_refcount, EntityType::Function(void_type(1)));
        imports.import(module, &names.install_value, EntityType::Function(void_type(1)));
        imports.import(module, &names.on_grow, EntityType::Function(void_type(0)));
        imports.import(module, &names.panic, EntityType::Function(void_type(0)));
        imports.import(module, &names.panic_message, EntityType::Function(void_type(2)));
        imports.import(module, &names.panic_location, EntityType::Function(void_type(3)));

        for (name, arity) in &self.host_functions {
            imports.import(module, name, EntityType::Function(void_type(arity + 1)));
        }
        imports
    }

    fn emit_globals(&self) -> GlobalSection {
        let mut globals = GlobalSection::new();
        let counter = || GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        };
        // GLOBAL_HEAP_PTR
        globals.global(counter(), &ConstExpr::i32_const(HEAP_START as i32));
        // GLOBAL_MAIN_CALLS, GLOBAL_FREE_CALLS, GLOBAL_DROP_CALLS
        for _ in 0..3 {
            globals.global(counter(), &ConstExpr::i32_const(0));
        }
        globals
    }
}
